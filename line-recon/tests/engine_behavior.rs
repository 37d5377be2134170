//! Registration edge cases, parameter conventions and output naming.

mod common;

use common::*;
use line_recon::{
    CamId, EngineConfig, Error, LineEngine, MatchParams, ReconstructParams,
};
use nalgebra::Point3;

fn add_dummy_view(engine: &LineEngine, cam: u32) -> line_recon::Result<()> {
    let eye = Point3::new(5.0, 0.0, 1.0);
    let (r, t) = look_at(eye, Point3::origin());
    engine.add_image(
        CamId(cam),
        500,
        500,
        intrinsics(),
        r,
        t,
        eye.coords.norm(),
        &[1, 2, 3],
        Some(vec![[100.0, 100.0, 200.0, 200.0]]),
    )
}

#[test]
fn test_duplicate_camera_is_rejected_without_state_change() {
    let engine = LineEngine::new(EngineConfig::default());
    add_dummy_view(&engine, 7).unwrap();
    assert_eq!(engine.num_views(), 1);

    let second = add_dummy_view(&engine, 7);
    assert!(matches!(second, Err(Error::DuplicateCamera(CamId(7)))));
    assert_eq!(engine.num_views(), 1);
}

#[test]
fn test_empty_context_rejects_the_view() {
    let engine = LineEngine::new(EngineConfig::default());
    let eye = Point3::new(5.0, 0.0, 1.0);
    let (r, t) = look_at(eye, Point3::origin());
    let result = engine.add_image(
        CamId(0),
        500,
        500,
        intrinsics(),
        r,
        t,
        5.0,
        &[],
        Some(vec![]),
    );
    assert!(matches!(result, Err(Error::EmptyContext(CamId(0)))));
    assert_eq!(engine.num_views(), 0);
}

#[test]
fn test_missing_segment_source_rejects_the_view() {
    let engine = LineEngine::new(EngineConfig::default());
    let eye = Point3::new(5.0, 0.0, 1.0);
    let (r, t) = look_at(eye, Point3::origin());
    let result = engine.add_image(CamId(0), 500, 500, intrinsics(), r, t, 5.0, &[1], None);
    assert!(matches!(result, Err(Error::NoSegmentSource(CamId(0)))));
    assert_eq!(engine.num_views(), 0);
    // the id is free again afterwards
    add_dummy_view(&engine, 0).unwrap();
}

struct FixedSource(Vec<[f64; 4]>);

impl line_recon::SegmentSource for FixedSource {
    fn segments(&self, _cam: CamId, _w: u32, _h: u32) -> line_recon::Result<Vec<[f64; 4]>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_segment_source_supplies_detections() {
    let engine = LineEngine::new(EngineConfig::default())
        .with_segment_source(Box::new(FixedSource(vec![[0.0, 0.0, 100.0, 0.0]])));
    let eye = Point3::new(5.0, 0.0, 1.0);
    let (r, t) = look_at(eye, Point3::origin());
    engine
        .add_image(CamId(0), 500, 500, intrinsics(), r, t, 5.0, &[1], None)
        .unwrap();
    assert_eq!(engine.num_views(), 1);
}

#[test]
fn test_fixed_world_space_regularizer() {
    let mut engine = cube_engine();
    let params = MatchParams {
        sigma_p: -0.01,
        sigma_a: 5.0,
        num_neighbors: 5,
        epipolar_overlap: 0.5,
        min_baseline: 0.1,
        knn: 0,
    };
    engine.match_images(&params).unwrap();
    engine
        .reconstruct(&ReconstructParams::default(), None)
        .unwrap();
    assert_eq!(engine.get_lines().len(), 12);

    let stem = engine.output_stem();
    assert!(stem.contains("__FXD_SIGMA_P"), "stem: {stem}");
    assert!(stem.contains("sigmaP_-0.01"), "stem: {stem}");
}

#[test]
fn test_output_stem_template() {
    let mut engine = cube_engine();
    engine
        .match_images(&MatchParams {
            sigma_p: 1.0,
            sigma_a: 5.0,
            num_neighbors: 5,
            epipolar_overlap: 0.5,
            min_baseline: 0.1,
            knn: 2,
        })
        .unwrap();
    engine
        .reconstruct(
            &ReconstructParams {
                visibility_t: 4,
                perform_diffusion: true,
                collinearity: 2.0,
            },
            None,
        )
        .unwrap();
    let stem = engine.output_stem();
    assert!(stem.starts_with(
        "Line3D++__W_-1__N_5__sigmaP_1__sigmaA_5__epiOverlap_0.5__minBaseline_0.1__kNN_2__COLLIN_2__DIFFUSION__vis_4"
    ), "stem: {stem}");
}

#[test]
fn test_collinear_segments_merge_into_one_line() {
    // two overlapping halves of one 3D line; in every view they are exactly
    // collinear, so the collinearity extension must fuse the two clusters
    let half_a = (Point3::new(-0.5, 0.0, 0.1), Point3::new(0.05, 0.0, 0.1));
    let half_b = (Point3::new(-0.05, 0.0, 0.1), Point3::new(0.5, 0.0, 0.1));
    let mut engine = ring_engine(&[half_a, half_b]);
    engine
        .match_images(&MatchParams {
            sigma_p: 1.0,
            sigma_a: 5.0,
            num_neighbors: 5,
            epipolar_overlap: 0.5,
            min_baseline: 0.1,
            knn: 0,
        })
        .unwrap();

    engine
        .reconstruct(
            &ReconstructParams {
                collinearity: 2.0,
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let lines = engine.get_lines();
    assert_eq!(lines.len(), 1, "collinear halves should form one cluster");
    assert_eq!(lines[0].intervals.len(), 1);
    let interval = &lines[0].intervals[0];
    assert!(
        endpoints_close(
            interval,
            &Point3::new(-0.5, 0.0, 0.1),
            &Point3::new(0.5, 0.0, 0.1),
            1e-3
        ),
        "interval {:?} should span both halves",
        interval
    );

    let stem = engine.output_stem();
    assert!(stem.contains("__COLLIN_2"), "stem: {stem}");
}

#[test]
fn test_writers_emit_consistent_output() {
    let mut engine = cube_engine();
    engine
        .match_images(&MatchParams {
            sigma_p: 1.0,
            sigma_a: 5.0,
            num_neighbors: 5,
            epipolar_overlap: 0.5,
            min_baseline: 0.1,
            knn: 0,
        })
        .unwrap();
    engine
        .reconstruct(&ReconstructParams::default(), None)
        .unwrap();
    let n_intervals: usize = engine.get_lines().iter().map(|l| l.intervals.len()).sum();

    let mut stl = Vec::new();
    engine.save_stl(&mut stl).unwrap();
    let stl = String::from_utf8(stl).unwrap();
    assert_eq!(stl.matches("facet normal 1.0 0.0 0.0").count(), n_intervals);

    let mut obj = Vec::new();
    engine.save_obj(&mut obj).unwrap();
    let segments = line_recon::output::read_obj(std::io::Cursor::new(&obj)).unwrap();
    assert_eq!(segments.len(), n_intervals);

    let mut txt = Vec::new();
    engine.save_txt(&mut txt).unwrap();
    let txt = String::from_utf8(txt).unwrap();
    assert_eq!(txt.lines().count(), engine.get_lines().len());

    // writers also work against real files
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{}.obj", engine.output_stem()));
    engine
        .save_obj(std::fs::File::create(&path).unwrap())
        .unwrap();
    let file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let reread = line_recon::output::read_obj(file).unwrap();
    assert_eq!(reread.len(), n_intervals);
}
