//! Null driver (no GPU, no native calls)

use std::collections::HashMap;

use crate::driver::{Backend, Capabilities, Driver};
use crate::error::{Error, Result};
use crate::surface::{SurfaceConfig, SurfaceId, SurfaceInfo};

/// Headless driver that records surfaces instead of creating GPU resources.
#[derive(Default)]
pub struct NullDriver {
    pub(crate) init_count: u32,
    fail_init: Option<String>,
    surfaces: HashMap<SurfaceId, SurfaceInfo>,
}

impl NullDriver {
    pub fn new() -> Self {
        Self {
            init_count: 0,
            fail_init: None,
            surfaces: HashMap::new(),
        }
    }

    /// A driver whose `init_driver` always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_init: Some(reason.into()),
            ..Self::new()
        }
    }

    /// Make subsequent `init_driver` calls fail (or succeed again with `None`)
    pub fn set_failure(&mut self, reason: Option<String>) {
        self.fail_init = reason;
    }

    /// How many times `init_driver` succeeded
    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    /// Surfaces currently alive in this driver
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}

impl Driver for NullDriver {
    fn backend(&self) -> Backend {
        Backend::Null
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED | Capabilities::SURFACES
    }

    fn init_driver(&mut self) -> Result<()> {
        if let Some(reason) = &self.fail_init {
            return Err(Error::backend(Backend::Null, "init_driver", None, reason.clone()));
        }
        self.init_count += 1;
        Ok(())
    }

    fn create_surface(&mut self, id: SurfaceId, config: &SurfaceConfig) -> Result<()> {
        if config.target.is_window() {
            return Err(Error::unsupported(Backend::Null, Capabilities::CREATE_SURFACE));
        }
        if self.surfaces.contains_key(&id) {
            return Err(Error::invalid_state(format!("{} already exists", id)));
        }

        self.surfaces.insert(
            id,
            SurfaceInfo {
                backend: Backend::Null,
                extent: config.extent,
                format: config.format,
                present_mode: None,
                image_count: config.image_count,
                presentable: false,
            },
        );
        Ok(())
    }

    fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        self.surfaces
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::invalid_state(format!("{} is unknown to the null driver", id)))
    }

    fn surface_info(&self, id: SurfaceId) -> Result<SurfaceInfo> {
        self.surfaces
            .get(&id)
            .copied()
            .ok_or_else(|| Error::invalid_state(format!("{} is unknown to the null driver", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Extent, SurfaceFormat, SurfaceTarget};
    use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};

    #[test]
    fn surfaces_round_through_the_registry() {
        let mut driver = NullDriver::new();
        driver.init_driver().unwrap();
        let id = SurfaceId::next();
        let config = SurfaceConfig {
            extent: Extent::new(320, 240),
            format: SurfaceFormat::Rgba8Unorm,
            image_count: 3,
            ..SurfaceConfig::default()
        };

        driver.create_surface(id, &config).unwrap();
        let info = driver.surface_info(id).unwrap();
        assert_eq!(info.extent, Extent::new(320, 240));
        assert_eq!(info.format, SurfaceFormat::Rgba8Unorm);
        assert_eq!(info.image_count, 3);
        assert!(!info.presentable);

        driver.destroy_surface(id).unwrap();
        assert_eq!(driver.surface_count(), 0);
        assert!(driver.destroy_surface(id).is_err());
    }

    #[test]
    fn failing_driver_reports_backend_failure() {
        let mut driver = NullDriver::failing("no device");
        let err = driver.init_driver().unwrap_err();
        assert!(matches!(err, Error::BackendFailure { backend: Backend::Null, .. }));
        assert_eq!(driver.init_count(), 0);

        driver.set_failure(None);
        driver.init_driver().unwrap();
        assert_eq!(driver.init_count(), 1);
    }

    #[test]
    fn window_targets_are_unsupported() {
        let mut driver = NullDriver::new();
        let config = SurfaceConfig {
            // The null driver never touches the handles
            target: unsafe {
                SurfaceTarget::window(
                    RawDisplayHandle::Xlib(XlibDisplayHandle::empty()),
                    RawWindowHandle::Xlib(XlibWindowHandle::empty()),
                )
            },
            ..SurfaceConfig::default()
        };
        let err = driver.create_surface(SurfaceId::next(), &config).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }
}
