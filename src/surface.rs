// Surface - opaque drawable targets
//
// Applications hold a `SurfaceHandle` and nothing else. Backend data stays
// inside the driver and comes out only as a `SurfaceInfo`.

use crate::driver::Backend;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide surface identifier, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Handle returned by `Context::create_surface`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    id: SurfaceId,
    backend: Backend,
}

impl SurfaceHandle {
    pub(crate) fn new(id: SurfaceId, backend: Backend) -> Self {
        Self { id, backend }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color formats a surface can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceFormat {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
    Rgba16Float,
}

impl SurfaceFormat {
    /// Parse a config name such as "bgra8_srgb"
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "bgra8_srgb" => Some(Self::Bgra8Srgb),
            "bgra8_unorm" => Some(Self::Bgra8Unorm),
            "rgba8_srgb" => Some(Self::Rgba8Srgb),
            "rgba8_unorm" => Some(Self::Rgba8Unorm),
            "rgba16_float" => Some(Self::Rgba16Float),
            _ => None,
        }
    }
}

/// Presentation modes, only meaningful for window targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

impl PresentMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "mailbox" => Some(Self::Mailbox),
            "fifo" => Some(Self::Fifo),
            "fifo_relaxed" => Some(Self::FifoRelaxed),
            _ => None,
        }
    }
}

/// Where a surface draws to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceTarget {
    /// Backend-owned images with no presentation engine behind them
    #[default]
    Offscreen,
    /// A native window, built through `SurfaceTarget::window`
    Window(WindowTarget),
}

impl SurfaceTarget {
    /// Target a native window.
    ///
    /// # Safety
    ///
    /// `display` and `window` must be valid handles from the windowing
    /// layer, and the window must stay alive until every surface created
    /// from this target has been destroyed.
    pub unsafe fn window(display: RawDisplayHandle, window: RawWindowHandle) -> Self {
        SurfaceTarget::Window(WindowTarget { display, window })
    }

    pub fn is_window(&self) -> bool {
        matches!(self, SurfaceTarget::Window(_))
    }
}

/// Raw window-system handles, only constructible through the unsafe
/// `SurfaceTarget::window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTarget {
    display: RawDisplayHandle,
    window: RawWindowHandle,
}

impl WindowTarget {
    pub fn display(&self) -> RawDisplayHandle {
        self.display
    }

    pub fn window(&self) -> RawWindowHandle {
        self.window
    }
}

/// Parameters for `Context::create_surface`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub extent: Extent,
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    /// Number of images backing the surface (swap-buffer count)
    pub image_count: u32,
    pub target: SurfaceTarget,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            extent: Extent::new(1280, 720),
            format: SurfaceFormat::default(),
            present_mode: PresentMode::default(),
            image_count: 2,
            target: SurfaceTarget::Offscreen,
        }
    }
}

/// What the driver actually built for a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub backend: Backend,
    pub extent: Extent,
    pub format: SurfaceFormat,
    /// `None` for offscreen surfaces
    pub present_mode: Option<PresentMode>,
    pub image_count: u32,
    pub presentable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_ids_are_unique_and_increasing() {
        let a = SurfaceId::next();
        let b = SurfaceId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn format_and_present_mode_names() {
        assert_eq!(SurfaceFormat::from_name("RGBA16_FLOAT"), Some(SurfaceFormat::Rgba16Float));
        assert_eq!(SurfaceFormat::from_name("yuv"), None);
        assert_eq!(PresentMode::from_name("Mailbox"), Some(PresentMode::Mailbox));
        assert_eq!(PresentMode::from_name("vsync"), None);
    }

    #[test]
    fn default_config_is_offscreen_double_buffered() {
        let config = SurfaceConfig::default();
        assert_eq!(config.image_count, 2);
        assert!(!config.target.is_window());
        assert!(!config.extent.is_empty());
        assert!(Extent::new(0, 10).is_empty());
    }

    #[test]
    fn window_target_keeps_its_handles() {
        use raw_window_handle::{XlibDisplayHandle, XlibWindowHandle};

        let display = RawDisplayHandle::Xlib(XlibDisplayHandle::empty());
        let window = RawWindowHandle::Xlib(XlibWindowHandle::empty());
        // Never handed to a backend, so the handles are not dereferenced
        let target = unsafe { SurfaceTarget::window(display, window) };

        assert!(target.is_window());
        match target {
            SurfaceTarget::Window(handles) => {
                assert_eq!(handles.display(), display);
                assert_eq!(handles.window(), window);
            }
            SurfaceTarget::Offscreen => panic!("expected a window target"),
        }
    }
}
