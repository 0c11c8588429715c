use std::sync::Arc;

use crate::{config::LifeConfig, gpu::GpuLifeRenderer};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;
use winit::{
    event::{ElementState, WindowEvent},
    event_loop::{EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::WindowAttributes,
};

#[cfg(target_arch = "wasm32")]
use winit::platform::web::WindowAttributesExtWebSys;

pub mod config;
pub mod gpu;
pub mod rendering;
pub mod sim;
pub mod util;

/// Message type for GPU renderer events
pub enum GpuMessage {
    Initialized(GpuLifeRenderer),
    Error(String),
}

/// What a key press asks the event loop to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyOutcome {
    Nothing,
    Exit,
    /// The animation loop was restarted and needs a first redraw.
    Redraw,
}

/// Pause and stop state driven by the keyboard. Paused keeps redrawing the
/// same generation; stopped stops requesting redraws entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RunState {
    paused: bool,
    stopped: bool,
}

impl RunState {
    fn press(&mut self, key: &Key) -> KeyOutcome {
        match key {
            Key::Named(NamedKey::Escape) => KeyOutcome::Exit,
            Key::Named(NamedKey::Space) => {
                self.paused = !self.paused;
                log::info!(
                    "Simulation {}",
                    if self.paused { "paused" } else { "resumed" }
                );
                KeyOutcome::Nothing
            }
            Key::Character(c) if c.eq_ignore_ascii_case("s") => {
                self.stopped = true;
                self.paused = false;
                log::info!("Simulation stopped");
                KeyOutcome::Nothing
            }
            Key::Character(c) if c.eq_ignore_ascii_case("r") && self.stopped => {
                self.stopped = false;
                log::info!("Simulation resumed from stop");
                KeyOutcome::Redraw
            }
            _ => KeyOutcome::Nothing,
        }
    }

    fn running(&self) -> bool {
        !self.paused && !self.stopped
    }
}

struct Application {
    proxy: Option<EventLoopProxy<GpuMessage>>,
    gpu_renderer: Option<GpuLifeRenderer>,
    config: LifeConfig,
    run_state: RunState,
    /// Set when setup failed; the loop exits and the error is reported once.
    failure: Option<String>,
}

impl Application {
    fn new(event_loop: &EventLoop<GpuMessage>, config: LifeConfig) -> Self {
        Self {
            proxy: Some(event_loop.create_proxy()),
            gpu_renderer: None,
            config,
            run_state: RunState::default(),
            failure: None,
        }
    }

    fn handle_key(&mut self, event_loop: &winit::event_loop::ActiveEventLoop, key: &Key) {
        match self.run_state.press(key) {
            KeyOutcome::Exit => event_loop.exit(),
            // Restart the animation loop
            KeyOutcome::Redraw => {
                if let Some(ref renderer) = self.gpu_renderer {
                    renderer.request_redraw();
                }
            }
            KeyOutcome::Nothing => {}
        }
    }
}

impl winit::application::ApplicationHandler<GpuMessage> for Application {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.gpu_renderer.is_some() {
            return;
        }

        #[cfg(target_arch = "wasm32")]
        {
            let dom_window = web_sys::window().expect("could not get window");
            let canvas: HtmlCanvasElement = dom_window
                .document()
                .expect("could not get document")
                .get_element_by_id("life-surface")
                .expect("could not get element with id `life-surface` as required")
                .dyn_into()
                .expect("`life-surface` is not a canvas");
            let window_attrs = WindowAttributes::default().with_canvas(Some(canvas));
            match event_loop.create_window(window_attrs) {
                Ok(window) => {
                    if let Some(proxy) = self.proxy.take() {
                        let window = Arc::new(window);
                        let config = self.config.clone();

                        wasm_bindgen_futures::spawn_local(async move {
                            match GpuLifeRenderer::new(window, &config).await {
                                Ok(renderer) => {
                                    let _ = proxy.send_event(GpuMessage::Initialized(renderer));
                                }
                                Err(e) => {
                                    // Error will be logged in user_event handler
                                    let _ = proxy.send_event(GpuMessage::Error(format!("{e:#}")));
                                }
                            }
                        });
                    }
                }
                Err(e) => log::error!("failed to create window: {e}"),
            };
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let attrs = WindowAttributes::default().with_title("lifesim");
            match event_loop.create_window(attrs) {
                Ok(window) => {
                    if let Some(proxy) = self.proxy.take() {
                        let window = Arc::new(window);

                        // On native, use pollster to block on the future
                        let message =
                            match pollster::block_on(GpuLifeRenderer::new(window, &self.config)) {
                                Ok(renderer) => GpuMessage::Initialized(renderer),
                                Err(e) => GpuMessage::Error(format!("{e:#}")),
                            };
                        let _ = proxy.send_event(message);
                    }
                }
                Err(e) => {
                    self.failure = Some(format!("failed to create window: {e}"));
                    event_loop.exit();
                }
            };
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: winit::event::WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.gpu_renderer = None;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                self.handle_key(event_loop, &event.logical_key);
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut renderer) = self.gpu_renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.gpu_renderer {
                    let stopped = self.run_state.stopped;
                    let result = if stopped {
                        // Stopped: just render current state, don't request more redraws
                        renderer.render()
                    } else {
                        let r = renderer.frame(self.run_state.running());
                        if r.is_ok() {
                            renderer.request_redraw();
                        }
                        r
                    };

                    match result {
                        Ok(()) => {}
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            renderer.reconfigure();
                            if !stopped {
                                renderer.request_redraw();
                            }
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            log::error!("Out of memory!");
                            event_loop.exit();
                        }
                        Err(e) => {
                            log::warn!("Surface error: {e:?}");
                            if !stopped {
                                renderer.request_redraw();
                            }
                        }
                    }
                }
            }
            _ => (),
        };
    }

    fn user_event(&mut self, event_loop: &winit::event_loop::ActiveEventLoop, event: GpuMessage) {
        match event {
            GpuMessage::Initialized(renderer) => {
                let (w, h) = renderer.dimensions();
                log::info!("GPU renderer initialized successfully ({w}x{h} grid)");
                // Request first redraw to kick off the animation loop
                renderer.request_redraw();
                self.gpu_renderer = Some(renderer);
            }
            GpuMessage::Error(e) => {
                log::error!("GPU initialization error: {e}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(renderer) = &self.gpu_renderer {
            log::info!("Exiting after {} generations", renderer.steps());
        }
    }
}

/// Route `log` records to stderr with RFC 3339 timestamps.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(level: log::LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .level_for("naga", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .level_for("wgpu_core", log::LevelFilter::Warn)
        .level_for("wgpu_hal", log::LevelFilter::Warn)
        .chain(fern::Output::call(console_log::log))
        .apply();
}

/// Open a window and run the GPU simulation until it is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_windowed(config: LifeConfig) -> anyhow::Result<()> {
    config.validate()?;
    log::info!("Starting Game of Life with GPU rendering");

    let event_loop = EventLoop::<GpuMessage>::with_user_event().build()?;
    let mut app = Application::new(&event_loop, config);
    event_loop.run_app(&mut app)?;

    match app.failure {
        Some(e) => Err(anyhow::anyhow!(e)),
        None => Ok(()),
    }
}

/// Start the simulation on the `life-surface` canvas with default settings.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start() {
    use winit::platform::web::EventLoopExtWebSys;

    log::info!("Starting Game of Life with GPU rendering");

    let event_loop = EventLoop::<GpuMessage>::with_user_event()
        .build()
        .expect("Failed to create event loop");
    let app = Application::new(&event_loop, LifeConfig::default());
    event_loop.spawn_app(app);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(c: &str) -> Key {
        Key::Character(c.into())
    }

    #[test]
    fn space_toggles_pause() {
        let mut state = RunState::default();
        assert!(state.running());
        assert_eq!(state.press(&Key::Named(NamedKey::Space)), KeyOutcome::Nothing);
        assert!(state.paused && !state.running());
        state.press(&Key::Named(NamedKey::Space));
        assert!(state.running());
    }

    #[test]
    fn stop_and_resume_restart_the_loop() {
        let mut state = RunState::default();
        state.press(&Key::Named(NamedKey::Space));
        assert_eq!(state.press(&character("S")), KeyOutcome::Nothing);
        assert_eq!(
            state,
            RunState {
                paused: false,
                stopped: true
            }
        );
        assert!(!state.running());

        assert_eq!(state.press(&character("r")), KeyOutcome::Redraw);
        assert!(state.running());
        // resume only means something while stopped
        assert_eq!(state.press(&character("r")), KeyOutcome::Nothing);
    }

    #[test]
    fn escape_exits() {
        let mut state = RunState::default();
        assert_eq!(state.press(&Key::Named(NamedKey::Escape)), KeyOutcome::Exit);
        assert_eq!(state.press(&character("x")), KeyOutcome::Nothing);
    }
}
