// =============================================================================
// GLIMMER PROBE - exercise a backend end to end
// =============================================================================
//
// Runs the whole driver lifecycle against the backend named in glimmer.toml
// and logs what the driver built:
//
// ┌─────────────────────────────────────────────────────────────────┐
// │  Context::new                                                   │
// │    └── set_driver (Vulkan or null, chosen by config)            │
// │          └── activate (backend bring-up)                        │
// │                └── create_surface (offscreen or window)         │
// │                      └── surface_info / destroy_surface         │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use anyhow::{Context as _, Result};
use glimmer::backend::{NullDriver, VulkanDriver};
use glimmer::config::{BackendChoice, Config};
use glimmer::{Context, Driver, SurfaceConfig, SurfaceTarget};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::fs::OpenOptions;
use std::io::Write;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config)?;
    log::info!("Starting glimmer probe");
    log::info!(
        "Backend: {:?}, surface: {}x{} ({})",
        config.driver.backend,
        config.surface.width,
        config.surface.height,
        if config.surface.windowed { "windowed" } else { "offscreen" }
    );

    if config.surface.windowed {
        let event_loop = EventLoop::new()?;
        let mut probe = WindowProbe::new(config);
        event_loop.run_app(&mut probe)?;
        return probe
            .outcome
            .unwrap_or_else(|| Err(anyhow::anyhow!("event loop exited before a window was created")));
    }

    let surface_config = config.surface_config();
    match config.driver.backend {
        BackendChoice::Vulkan => {
            let mut driver = VulkanDriver::new(config.vulkan_driver_config());
            run_lifecycle(&mut driver, &surface_config)
        }
        BackendChoice::Null => run_lifecycle(&mut NullDriver::new(), &surface_config),
    }
}

/// Initialize logging, optionally writing to the configured log file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {}", config.debug.log_file))?;
        writeln!(file, "=== glimmer probe log ===")?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Bind, activate, create a surface, report it, tear everything down.
fn run_lifecycle(driver: &mut dyn Driver, surface_config: &SurfaceConfig) -> Result<()> {
    let mut ctx = Context::new();
    ctx.set_driver(driver).context("Failed to bind driver")?;
    ctx.activate().context("Failed to activate driver")?;

    let surface = ctx
        .create_surface(surface_config)
        .context("Failed to create surface")?;
    let info = ctx.surface_info(surface)?;
    log::info!(
        "Surface {}: {} {:?}, {} images, present mode {:?}, presentable: {}",
        surface.id(),
        info.extent,
        info.format,
        info.image_count,
        info.present_mode,
        info.presentable
    );

    ctx.destroy_surface(surface)?;
    ctx.unbind_driver()?;
    log::info!("Probe finished");
    Ok(())
}

// =============================================================================
// WINDOWED PROBE
// =============================================================================

/// Opens one window, runs the lifecycle against it and exits.
struct WindowProbe {
    config: Config,
    outcome: Option<Result<()>>,
}

impl WindowProbe {
    fn new(config: Config) -> Self {
        Self {
            config,
            outcome: None,
        }
    }

    fn probe_window(&self, window: &Window) -> Result<()> {
        let display = window.raw_display_handle();
        // SAFETY: the handles come from a live winit window, and the driver
        // owning the surface is dropped before this function returns
        let target = unsafe { SurfaceTarget::window(display, window.raw_window_handle()) };
        let surface_config = SurfaceConfig {
            target,
            ..self.config.surface_config()
        };

        match self.config.driver.backend {
            BackendChoice::Vulkan => {
                let driver_config = self
                    .config
                    .vulkan_driver_config()
                    .with_display(display)
                    .context("Failed to query window-system extensions")?;
                let mut driver = VulkanDriver::new(driver_config);
                run_lifecycle(&mut driver, &surface_config)
            }
            BackendChoice::Null => run_lifecycle(&mut NullDriver::new(), &surface_config),
        }
    }
}

impl ApplicationHandler for WindowProbe {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.outcome.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(&self.config.application.name)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.surface.width,
                self.config.surface.height,
            ));

        let outcome = event_loop
            .create_window(attributes)
            .context("Failed to create window")
            .and_then(|window| self.probe_window(&window));

        if let Err(e) = &outcome {
            log::error!("Windowed probe failed: {:?}", e);
        }
        self.outcome = Some(outcome);
        event_loop.exit();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            event_loop.exit();
        }
    }
}
