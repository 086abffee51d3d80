// Context - the application-facing handle
//
// Lifecycle (each step checked, nothing scheduled):
//   init_context -> set_driver -> activate -> create/destroy surfaces
//
// The context borrows its driver for `'d`; the application keeps ownership
// and the borrow checker stops it from dropping a bound driver.

use crate::driver::{Backend, Capabilities, Driver};
use crate::error::{Error, Result};
use crate::surface::{SurfaceConfig, SurfaceHandle, SurfaceId, SurfaceInfo};
use std::collections::BTreeSet;

#[derive(Default)]
pub struct Context<'d> {
    created: bool,
    initialized: bool,
    driver: Option<&'d mut dyn Driver>,
    /// Surfaces created through this context and not destroyed yet
    surfaces: BTreeSet<SurfaceId>,
}

impl<'d> Context<'d> {
    /// A context that has not been through `init_context` yet.
    pub fn uninit() -> Self {
        Self::default()
    }

    /// A zero-initialized context, ready for `set_driver`.
    pub fn new() -> Self {
        let mut ctx = Self::uninit();
        ctx.reset();
        ctx
    }

    /// Reset to the freshly initialized state.
    ///
    /// A bound driver is forgotten, not released: the application still owns
    /// it and is responsible for tearing it down.
    pub fn init_context(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.as_deref() {
            log::warn!(
                "init_context discards bound {} ({} live surfaces)",
                driver.name(),
                self.surfaces.len()
            );
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.created = true;
        self.initialized = false;
        self.driver = None;
        self.surfaces.clear();
    }

    /// Bind `driver` into the context without initializing it.
    ///
    /// Fails with `InvalidArgument`, leaving the context untouched, if the
    /// context was never initialized or the driver lacks a required slot.
    pub fn set_driver(&mut self, driver: &'d mut dyn Driver) -> Result<()> {
        if !self.created {
            return Err(Error::invalid_argument(
                "set_driver called before init_context",
            ));
        }

        let missing = driver.capabilities().missing_required();
        if !missing.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{} does not populate required capabilities {:?}",
                driver.name(),
                missing
            )));
        }

        if let Some(previous) = self.driver.as_deref() {
            log::warn!(
                "Replacing bound {} with {} ({} live surfaces dropped from the registry)",
                previous.name(),
                driver.name(),
                self.surfaces.len()
            );
        }

        log::info!("Bound {} ({:?})", driver.name(), driver.capabilities());
        self.driver = Some(driver);
        self.initialized = false;
        self.surfaces.clear();
        Ok(())
    }

    /// Give the driver borrow back to the application.
    ///
    /// Refused while surfaces created through this context are still live.
    pub fn unbind_driver(&mut self) -> Result<Option<&'d mut dyn Driver>> {
        if !self.surfaces.is_empty() {
            return Err(Error::invalid_state(format!(
                "cannot unbind driver with {} live surfaces",
                self.surfaces.len()
            )));
        }
        self.initialized = false;
        Ok(self.driver.take())
    }

    /// Run the bound driver's `init_driver`.
    ///
    /// On failure the driver stays bound and `initialized` is false, so the
    /// call can be retried after remediation.
    pub fn activate(&mut self) -> Result<()> {
        if !self.created {
            return Err(Error::invalid_state("activate called before init_context"));
        }

        let driver = self
            .driver
            .as_deref_mut()
            .ok_or_else(|| Error::invalid_state("activate called without a bound driver"))?;

        log::info!("Activating {}", driver.name());
        let result = driver.init_driver();
        self.initialized = result.is_ok();

        match &result {
            Ok(()) => log::info!("Context active"),
            Err(e) => log::error!("Activation failed: {}", e),
        }
        result
    }

    /// Create a surface through the bound driver.
    ///
    /// A driver that can create surfaces but not destroy them is refused
    /// with `Unsupported(DESTROY_SURFACE)`, so every live handle stays
    /// releasable.
    pub fn create_surface(&mut self, config: &SurfaceConfig) -> Result<SurfaceHandle> {
        let driver = self.active_driver_mut()?;
        let backend = driver.backend();
        let capabilities = driver.capabilities();

        if !capabilities.contains(Capabilities::CREATE_SURFACE) {
            return Err(Error::unsupported(backend, Capabilities::CREATE_SURFACE));
        }
        if !capabilities.contains(Capabilities::DESTROY_SURFACE) {
            return Err(Error::unsupported(backend, Capabilities::DESTROY_SURFACE));
        }
        if config.extent.is_empty() {
            return Err(Error::invalid_argument(format!(
                "surface extent must be non-zero, got {}",
                config.extent
            )));
        }
        if config.image_count == 0 {
            return Err(Error::invalid_argument("surface image count must be at least 1"));
        }

        let id = SurfaceId::next();
        driver.create_surface(id, config)?;
        log::debug!("Created {} on {} ({})", id, backend, config.extent);

        self.surfaces.insert(id);
        Ok(SurfaceHandle::new(id, backend))
    }

    /// Release a surface. Destroying a handle twice is `InvalidState`.
    pub fn destroy_surface(&mut self, handle: SurfaceHandle) -> Result<()> {
        let id = handle.id();
        if !self.surfaces.contains(&id) {
            return Err(Error::invalid_state(format!(
                "{} is not live in this context (already destroyed?)",
                id
            )));
        }

        let driver = self
            .driver
            .as_deref_mut()
            .ok_or_else(|| Error::invalid_state("no driver bound"))?;

        if !driver.capabilities().contains(Capabilities::DESTROY_SURFACE) {
            return Err(Error::unsupported(driver.backend(), Capabilities::DESTROY_SURFACE));
        }

        driver.destroy_surface(id)?;
        self.surfaces.remove(&id);
        log::debug!("Destroyed {}", id);
        Ok(())
    }

    /// Backend-populated description of a live surface.
    pub fn surface_info(&self, handle: SurfaceHandle) -> Result<SurfaceInfo> {
        let id = handle.id();
        if !self.surfaces.contains(&id) {
            return Err(Error::invalid_state(format!("{} is not live in this context", id)));
        }

        let driver = self
            .driver
            .as_deref()
            .ok_or_else(|| Error::invalid_state("no driver bound"))?;

        if !driver.capabilities().contains(Capabilities::SURFACE_INFO) {
            return Err(Error::unsupported(driver.backend(), Capabilities::SURFACE_INFO));
        }
        driver.surface_info(id)
    }

    fn active_driver_mut(&mut self) -> Result<&mut (dyn Driver + 'd)> {
        if !self.initialized {
            return Err(Error::not_initialized("surface requested before activate"));
        }
        self.driver
            .as_deref_mut()
            .ok_or_else(|| Error::invalid_state("context active without a bound driver"))
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_bound(&self) -> bool {
        self.driver.is_some()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.driver.as_deref().map(|d| d.backend())
    }

    pub fn driver(&self) -> Option<&(dyn Driver + 'd)> {
        self.driver.as_deref()
    }

    pub fn driver_mut(&mut self) -> Option<&mut (dyn Driver + 'd)> {
        self.driver.as_deref_mut()
    }

    /// Number of surfaces created through this context and still live
    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullDriver;
    use crate::surface::Extent;

    struct Unbindable;

    impl Driver for Unbindable {
        fn backend(&self) -> Backend {
            Backend::Null
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::SURFACES
        }

        fn init_driver(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn new_context_is_created_but_not_initialized() {
        let ctx = Context::new();
        assert!(ctx.is_created());
        assert!(!ctx.is_initialized());
        assert!(!ctx.is_bound());
        assert_eq!(ctx.backend(), None);
    }

    #[test]
    fn set_driver_before_init_context_is_rejected() {
        let mut driver = NullDriver::new();
        let mut ctx = Context::uninit();
        let err = ctx.set_driver(&mut driver).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!ctx.is_created());
        assert!(!ctx.is_bound());
    }

    #[test]
    fn driver_missing_required_slot_keeps_previous_binding() {
        let mut good = NullDriver::new();
        let mut bad = Unbindable;
        let mut ctx = Context::new();
        ctx.set_driver(&mut good).unwrap();
        ctx.activate().unwrap();

        let err = ctx.set_driver(&mut bad).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(ctx.backend(), Some(Backend::Null));
        assert!(ctx.is_initialized());
        assert_eq!(ctx.driver().map(|d| d.name()), Some("null driver"));
    }

    #[test]
    fn activate_without_driver_is_invalid_state() {
        let mut ctx = Context::new();
        assert!(matches!(ctx.activate(), Err(Error::InvalidState(_))));
        let mut uninit = Context::uninit();
        assert!(matches!(uninit.activate(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn create_surface_rejects_zero_extent_and_image_count() {
        let mut driver = NullDriver::new();
        let mut ctx = Context::new();
        ctx.set_driver(&mut driver).unwrap();
        ctx.activate().unwrap();

        let zero_extent = SurfaceConfig {
            extent: Extent::new(0, 480),
            ..SurfaceConfig::default()
        };
        assert!(matches!(ctx.create_surface(&zero_extent), Err(Error::InvalidArgument(_))));

        let zero_images = SurfaceConfig {
            image_count: 0,
            ..SurfaceConfig::default()
        };
        assert!(matches!(ctx.create_surface(&zero_images), Err(Error::InvalidArgument(_))));
        assert_eq!(ctx.live_surfaces(), 0);
    }

    #[test]
    fn unbind_refused_while_surfaces_live() {
        let mut driver = NullDriver::new();
        let mut ctx = Context::new();
        ctx.set_driver(&mut driver).unwrap();
        ctx.activate().unwrap();
        let surface = ctx.create_surface(&SurfaceConfig::default()).unwrap();

        assert!(matches!(ctx.unbind_driver(), Err(Error::InvalidState(_))));
        ctx.destroy_surface(surface).unwrap();

        let unbound = ctx.unbind_driver().unwrap();
        assert!(unbound.is_some());
        assert!(!ctx.is_initialized());
        assert!(!ctx.is_bound());
    }

    #[test]
    fn init_context_forgets_binding() {
        let mut driver = NullDriver::new();
        let mut ctx = Context::new();
        ctx.set_driver(&mut driver).unwrap();
        ctx.activate().unwrap();
        let surface = ctx.create_surface(&SurfaceConfig::default()).unwrap();

        ctx.init_context().unwrap();
        assert!(!ctx.is_bound());
        assert!(!ctx.is_initialized());
        assert!(matches!(ctx.destroy_surface(surface), Err(Error::InvalidState(_))));
    }
}
