use std::collections::{BTreeMap, BTreeSet};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::view::View;
use crate::{CamId, Error, Result};

/// Dense view table with a camera-id index.
#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    pub views: Vec<View>,
    pub by_cam: BTreeMap<CamId, usize>,
}

/// Owner of all registered views.
///
/// Registration is safe to call concurrently: an id is first reserved under
/// its own lock, the view is built without any lock held, and publication
/// into the dense table is a single write-lock critical section. Duplicate
/// ids are rejected at reservation time with no state mutated.
#[derive(Debug, Default)]
pub(crate) struct ViewRegistry {
    reserved: Mutex<BTreeSet<CamId>>,
    inner: RwLock<RegistryInner>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one of registration: claim the camera id.
    pub fn reserve(&self, cam_id: CamId) -> Result<()> {
        let mut reserved = self.reserved.lock();
        if reserved.contains(&cam_id) || self.inner.read().by_cam.contains_key(&cam_id) {
            return Err(Error::DuplicateCamera(cam_id));
        }
        reserved.insert(cam_id);
        Ok(())
    }

    /// Abandon a reservation after a failed build.
    pub fn cancel(&self, cam_id: CamId) {
        self.reserved.lock().remove(&cam_id);
    }

    /// Phase two of registration: publish the built view atomically.
    pub fn publish(&self, view: View) {
        let cam_id = view.cam_id;
        {
            let mut inner = self.inner.write();
            let idx = inner.views.len();
            inner.views.push(view);
            inner.by_cam.insert(cam_id, idx);
        }
        self.reserved.lock().remove(&cam_id);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write()
    }

    pub fn len(&self) -> usize {
        self.inner.read().views.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewContext;
    use line_mvg::PinholeCamera;
    use nalgebra::{Matrix3, Vector3};

    fn dummy_view(cam_id: CamId) -> View {
        let k = Matrix3::new(500.0, 0.0, 250.0, 0.0, 500.0, 250.0, 0.0, 0.0, 1.0);
        let camera = PinholeCamera::new(k, Matrix3::identity(), Vector3::zeros()).unwrap();
        View::new(
            cam_id,
            camera,
            500,
            500,
            vec![],
            ViewContext::TiePoints(vec![1]),
            1.0,
        )
    }

    #[test]
    fn test_duplicate_reservation_rejected() {
        let reg = ViewRegistry::new();
        reg.reserve(CamId(7)).unwrap();
        assert!(matches!(
            reg.reserve(CamId(7)),
            Err(Error::DuplicateCamera(CamId(7)))
        ));
        reg.publish(dummy_view(CamId(7)));
        // still a duplicate once published
        assert!(reg.reserve(CamId(7)).is_err());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_cancel_frees_the_id() {
        let reg = ViewRegistry::new();
        reg.reserve(CamId(3)).unwrap();
        reg.cancel(CamId(3));
        reg.reserve(CamId(3)).unwrap();
    }

    #[test]
    fn test_dense_index_follows_registration_order() {
        let reg = ViewRegistry::new();
        for id in [5u32, 2, 9] {
            reg.reserve(CamId(id)).unwrap();
            reg.publish(dummy_view(CamId(id)));
        }
        let inner = reg.read();
        assert_eq!(inner.by_cam[&CamId(5)], 0);
        assert_eq!(inner.by_cam[&CamId(2)], 1);
        assert_eq!(inner.by_cam[&CamId(9)], 2);
    }
}
