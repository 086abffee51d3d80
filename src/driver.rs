// Driver contract - the capability table every backend satisfies
//
// A backend is a type implementing `Driver`. Capability slots are reported
// through `Capabilities`; the context refuses to bind a driver whose report
// lacks a required slot. Optional slots default to `Unsupported`, so adding
// a new slot never breaks an existing backend.

use crate::error::{Error, Result};
use crate::surface::{SurfaceConfig, SurfaceId, SurfaceInfo};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Capability slots a driver populates
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const INIT_DRIVER = 1 << 0;
        const CREATE_SURFACE = 1 << 1;
        const DESTROY_SURFACE = 1 << 2;
        const SURFACE_INFO = 1 << 3;
    }
}

impl Capabilities {
    /// Slots a driver must populate before it can be bound
    pub const REQUIRED: Self = Self::INIT_DRIVER;

    /// Everything surface handling needs
    pub const SURFACES: Self = Self::CREATE_SURFACE
        .union(Self::DESTROY_SURFACE)
        .union(Self::SURFACE_INFO);

    /// Required slots missing from `self`
    pub fn missing_required(self) -> Self {
        Self::REQUIRED.difference(self)
    }
}

/// Backend tag carried by drivers, surface handles and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Null,
    Vulkan,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Null => f.write_str("null"),
            Backend::Vulkan => f.write_str("vulkan"),
        }
    }
}

/// A concrete graphics backend.
///
/// Implementations own all of their native state. The context only ever
/// borrows a driver, so releasing native resources is the driver's `Drop`.
pub trait Driver: Send {
    /// Which backend this driver implements
    fn backend(&self) -> Backend;

    /// Human readable name, used in logs
    fn name(&self) -> &str {
        match self.backend() {
            Backend::Null => "null driver",
            Backend::Vulkan => "vulkan driver",
        }
    }

    /// Capability slots this driver populates
    fn capabilities(&self) -> Capabilities;

    /// Backend bring-up. Must release anything it created before returning
    /// an error.
    fn init_driver(&mut self) -> Result<()>;

    /// Create backend resources for a surface identified by `id`.
    fn create_surface(&mut self, id: SurfaceId, config: &SurfaceConfig) -> Result<()> {
        let _ = (id, config);
        Err(Error::unsupported(self.backend(), Capabilities::CREATE_SURFACE))
    }

    /// Release the backend resources of surface `id`.
    fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        let _ = id;
        Err(Error::unsupported(self.backend(), Capabilities::DESTROY_SURFACE))
    }

    /// Backend-populated description of surface `id`.
    fn surface_info(&self, id: SurfaceId) -> Result<SurfaceInfo> {
        let _ = id;
        Err(Error::unsupported(self.backend(), Capabilities::SURFACE_INFO))
    }
}
