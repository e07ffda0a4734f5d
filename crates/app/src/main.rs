//! Lumen demo application.
//!
//! Opens a window and drives a spinning cube through the frame driver.

mod spin;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use lumen_platform::Window;
use lumen_renderer::{FrameDriver, RendererConfig};

use spin::SpinPayload;

struct App {
    config: RendererConfig,
    window: Option<Window>,
    driver: Option<FrameDriver<SpinPayload>>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            driver: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match Window::new(
                event_loop,
                self.config.width,
                self.config.height,
                &self.config.title,
            ) {
                Ok(window) => window,
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                    return;
                }
            };

            match FrameDriver::new(&window, &self.config, SpinPayload::new()) {
                Ok(driver) => {
                    info!("Initialization complete, entering main loop");
                    self.driver = Some(driver);
                    self.window = Some(window);
                }
                Err(e) => {
                    error!("Failed to create frame driver: {:?}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut window) = self.window {
                    window.set_resized();
                }
            }
            WindowEvent::RedrawRequested => {
                if let (Some(driver), Some(window)) = (&mut self.driver, &mut self.window) {
                    if let Err(e) = driver.draw_frame(window) {
                        error!("Render error: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    lumen_core::init_logging();
    info!("Starting Lumen");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(RendererConfig::default());
    event_loop.run_app(&mut app)?;

    Ok(())
}
