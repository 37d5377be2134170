//! Writers for the reconstructed line sets.
//!
//! Three plain-text formats are supported: ASCII STL (one degenerate facet
//! per 3D segment), Wavefront OBJ line sets, and a tabular TXT format
//! carrying the 3D intervals together with their 2D residuals.

use std::io::{self, BufRead, Write};

use nalgebra::Point3;

use line_mvg::{Segment2d, Segment3d};

use crate::clustering::FinalLine3d;
use crate::SegmentId;

/// ASCII STL: every 3D interval becomes one degenerate facet `(P1, P2, P1)`
/// with a constant normal.
pub fn write_stl<W: Write>(mut out: W, lines: &[FinalLine3d]) -> io::Result<()> {
    writeln!(out, "solid lineModel")?;
    for line in lines {
        for seg in &line.intervals {
            writeln!(out, "facet normal 1.0 0.0 0.0")?;
            writeln!(out, "  outer loop")?;
            write_stl_vertex(&mut out, &seg.p1)?;
            write_stl_vertex(&mut out, &seg.p2)?;
            write_stl_vertex(&mut out, &seg.p1)?;
            writeln!(out, "  endloop")?;
            writeln!(out, "endfacet")?;
        }
    }
    writeln!(out, "endsolid lineModel")?;
    Ok(())
}

fn write_stl_vertex<W: Write>(out: &mut W, p: &Point3<f64>) -> io::Result<()> {
    writeln!(out, "    vertex {} {} {}", p.x, p.y, p.z)
}

/// Wavefront OBJ: one `v` record per interval endpoint in traversal order,
/// then `l i j` records with 1-based indices.
pub fn write_obj<W: Write>(mut out: W, lines: &[FinalLine3d]) -> io::Result<()> {
    let mut count = 0usize;
    for line in lines {
        for seg in &line.intervals {
            writeln!(out, "v {} {} {}", seg.p1.x, seg.p1.y, seg.p1.z)?;
            writeln!(out, "v {} {} {}", seg.p2.x, seg.p2.y, seg.p2.z)?;
            count += 2;
        }
    }
    let mut i = 1;
    while i < count {
        writeln!(out, "l {} {}", i, i + 1)?;
        i += 2;
    }
    Ok(())
}

/// Read a line-set OBJ back into 3D segments.
pub fn read_obj<R: BufRead>(reader: R) -> io::Result<Vec<Segment3d<f64>>> {
    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut segments = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let coords: Vec<f64> = fields.take(3).filter_map(|f| f.parse().ok()).collect();
                if coords.len() == 3 {
                    vertices.push(Point3::new(coords[0], coords[1], coords[2]));
                }
            }
            Some("l") => {
                let idx: Vec<usize> = fields.take(2).filter_map(|f| f.parse().ok()).collect();
                if let [i, j] = idx[..] {
                    if i >= 1 && j >= 1 && i <= vertices.len() && j <= vertices.len() {
                        segments.push(Segment3d::new(vertices[i - 1], vertices[j - 1]));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(segments)
}

/// Tabular TXT: per final line, the interval count, six scalars per
/// interval, the residual count, and one `cam seg x1 y1 x2 y2` record per
/// contributing 2D segment.
pub fn write_txt<W: Write>(
    mut out: W,
    lines: &[FinalLine3d],
    lookup_2d: impl Fn(SegmentId) -> Option<Segment2d<f64>>,
) -> io::Result<()> {
    for line in lines {
        write!(out, "{}", line.intervals.len())?;
        for seg in &line.intervals {
            write!(
                out,
                " {} {} {} {} {} {}",
                seg.p1.x, seg.p1.y, seg.p1.z, seg.p2.x, seg.p2.y, seg.p2.z
            )?;
        }
        let residuals: Vec<(SegmentId, Segment2d<f64>)> = line
            .cluster
            .members
            .iter()
            .filter_map(|&m| lookup_2d(m).map(|seg| (m, seg)))
            .collect();
        write!(out, " {}", residuals.len())?;
        for (id, seg) in residuals {
            write!(
                out,
                " {} {} {} {} {} {}",
                id.cam, id.seg, seg.p1.x, seg.p1.y, seg.p2.x, seg.p2.y
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
