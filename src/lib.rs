//! glimmer - a pluggable GPU driver abstraction
//!
//! An application creates a [`Context`], binds a backend implementing
//! [`Driver`], activates it and asks for surfaces:
//!
//! ```no_run
//! use glimmer::backend::{VulkanDriver, VulkanDriverConfig};
//! use glimmer::{Context, SurfaceConfig};
//!
//! let mut driver = VulkanDriver::new(VulkanDriverConfig::default());
//! let mut ctx = Context::new();
//! ctx.set_driver(&mut driver)?;
//! ctx.activate()?;
//! let surface = ctx.create_surface(&SurfaceConfig::default())?;
//! println!("{:?}", ctx.surface_info(surface)?);
//! ctx.destroy_surface(surface)?;
//! # Ok::<(), glimmer::Error>(())
//! ```
//!
//! The context never owns the driver. It borrows it for as long as it is
//! bound, and the driver releases its native resources when the application
//! drops it.

pub mod backend;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod surface;

pub use context::Context;
pub use driver::{Backend, Capabilities, Driver};
pub use error::{Error, Result};
pub use surface::{
    Extent, PresentMode, SurfaceConfig, SurfaceFormat, SurfaceHandle, SurfaceId, SurfaceInfo,
    SurfaceTarget, WindowTarget,
};
