//! winit window + glutin context hosting the player grid.
//!
//! One GL context is shared by every player through a single [`GlowBackend`].
//! Input is translated into bus events and intents; nothing here touches
//! player internals directly.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext, Version,
};
use glutin::display::{Display, GetGlDisplay};
use glutin::error::ErrorKind;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use player::{hex_to_rgb_normalized, AppContext, BusEvent, Intent, PlayerSetManager};
use raw_window_handle::HasRawWindowHandle;
use renderer::{Gl, GlowBackend, Size};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::controls::{self, Action, BACKGROUND_COLORS, CURSOR_COLORS};
use crate::status::StatusLine;

pub struct HostSetup {
    pub size: (u32, u32),
    pub context: AppContext,
    pub status: StatusLine,
}

pub fn run_window(setup: HostSetup) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = setup.size;
    let window_builder = WindowBuilder::new()
        .with_title("cursorshade")
        .with_inner_size(PhysicalSize::new(width, height));

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_depth_size(0);
    let (window, gl_config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder))
        .build(&event_loop, template, |configs| {
            // An empty match set fails in find_configs before the picker runs.
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("glutin offers at least one matching config")
        })
        .map_err(|err| anyhow!("failed to build GL display: {err}"))?;
    let window = window.ok_or_else(|| anyhow!("display builder did not create a window"))?;

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        window.raw_window_handle(),
        non_zero(size.width),
        non_zero(size.height),
    );
    let gl_surface = unsafe {
        gl_config
            .display()
            .create_window_surface(&gl_config, &attrs)
            .context("failed to create window surface")?
    };
    let gl_context = create_context(&gl_config, &window)?
        .make_current(&gl_surface)
        .context("failed to make GL context current")?;
    if let Err(err) =
        gl_surface.set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::MIN))
    {
        tracing::debug!(error = %err, "vsync unavailable");
    }

    let gl = Rc::new(load_backend(&gl_config.display()));
    let viewport = Size::new(size.width, size.height);
    let manager = PlayerSetManager::new(
        Rc::clone(&gl),
        setup.context,
        viewport,
        seed(),
        Instant::now(),
    )
    .context("failed to start players")?;

    let mut host = Host {
        window,
        gl_config,
        gl_surface,
        gl_context,
        gl,
        manager,
        status: setup.status,
        pointer: None,
        shaders: None,
        title: String::new(),
    };
    host.refresh_title();
    tracing::info!(width = size.width, height = size.height, "window ready");

    let fatal: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
    let fatal_slot = Rc::clone(&fatal);
    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        host.manager.shutdown();
                        target.exit();
                    }
                    WindowEvent::Resized(size) => host.resize(size),
                    WindowEvent::CursorMoved { position, .. } => host.pointer = Some(position),
                    WindowEvent::CursorLeft { .. } => host.pointer = None,
                    WindowEvent::MouseInput {
                        state: ElementState::Pressed,
                        button: MouseButton::Left,
                        ..
                    } => host.click(),
                    WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                        if let Some(action) = controls::action_for(&event.logical_key) {
                            host.perform(action);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = host.redraw() {
                            tracing::error!(error = %err, "rendering stopped");
                            *fatal_slot.borrow_mut() = Some(err);
                            host.manager.shutdown();
                            target.exit();
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => host.window.request_redraw(),
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    let result = match fatal.borrow_mut().take() {
        Some(err) => Err(err),
        None => Ok(()),
    };
    result
}

struct Host {
    window: Window,
    gl_config: Config,
    gl_surface: Surface<WindowSurface>,
    gl_context: PossiblyCurrentContext,
    gl: Rc<GlowBackend>,
    manager: PlayerSetManager<GlowBackend>,
    status: StatusLine,
    pointer: Option<PhysicalPosition<f64>>,
    shaders: Option<Vec<String>>,
    title: String,
}

impl Host {
    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        self.manager.pump_fetches();
        self.manager.tick(now);

        let background = {
            let config = self.manager.context().config.borrow();
            hex_to_rgb_normalized(&config.background_color)
        };
        self.gl.bind_target(None);
        self.gl.viewport(self.manager.viewport());
        self.gl.clear(background);
        self.manager.render(now);

        match self.gl_surface.swap_buffers(&self.gl_context) {
            Ok(()) => {}
            Err(err) if err.error_kind() == ErrorKind::ContextLost => self.recover_context()?,
            Err(err) => return Err(anyhow!("failed to swap buffers: {err}")),
        }
        self.refresh_title();
        Ok(())
    }

    fn recover_context(&mut self) -> Result<()> {
        self.manager.context_lost();
        let context = create_context(&self.gl_config, &self.window)?
            .make_current(&self.gl_surface)
            .context("failed to make replacement GL context current")?;
        self.gl_context = context;
        self.gl = Rc::new(load_backend(&self.gl_config.display()));
        self.manager.context_restored(Rc::clone(&self.gl));
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.gl_surface
            .resize(&self.gl_context, non_zero(size.width), non_zero(size.height));
        self.manager.resize(Size::new(size.width, size.height));
    }

    /// Pointer position with the origin moved to the bottom-left.
    fn pointer_gl(&self) -> Option<(f32, f32)> {
        let position = self.pointer?;
        let height = self.manager.viewport().height as f64;
        Some((position.x as f32, (height - position.y) as f32))
    }

    fn hovered(&self) -> Option<String> {
        let (x, y) = self.pointer_gl()?;
        self.manager.hit_test(x, y).map(|(id, _, _)| id)
    }

    fn click(&mut self) {
        let Some((x, y)) = self.pointer_gl() else {
            return;
        };
        if let Some((id, local_x, local_y)) = self.manager.hit_test(x, y) {
            tracing::debug!(player = %id, x = local_x, y = local_y, "click");
            self.emit(BusEvent::Click {
                x: local_x,
                y: local_y,
            });
        }
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Move(direction) => self.emit(BusEvent::Keyboard(direction)),
            Action::AddPlayer => self.apply(Intent::AddPlayer { shader: None }),
            Action::RemoveHovered => {
                if let Some(id) = self.hovered() {
                    self.apply(Intent::RemovePlayer(id));
                }
            }
            Action::CycleMode => {
                let mode = self.manager.context().config.borrow().cursor_mode.next();
                self.emit(BusEvent::ChangeMode(mode));
            }
            Action::NextShader => self.next_shader(),
            Action::ToggleTexture => {
                let Some(id) = self.hovered() else {
                    return;
                };
                let show = match self.manager.player(&id) {
                    Some(player) => !player.show_texture(),
                    None => return,
                };
                self.apply(Intent::ToggleTexture { id, show });
            }
            Action::CycleCursorColor => {
                let current = self.manager.context().config.borrow().cursor_color.clone();
                if let Some(next) = controls::next_after(&CURSOR_COLORS, &current) {
                    self.emit(BusEvent::CursorColor(next.to_string()));
                }
            }
            Action::CycleBackground => {
                let current = self.manager.context().config.borrow().background_color.clone();
                if let Some(next) = controls::next_after(&BACKGROUND_COLORS, &current) {
                    self.emit(BusEvent::BackgroundColor(next.to_string()));
                }
            }
            Action::FasterTicks | Action::SlowerTicks => {
                let interval = controls::scaled_tick(
                    self.manager.tick_interval(),
                    action == Action::FasterTicks,
                );
                self.apply(Intent::SetTickInterval(interval));
            }
        }
        self.refresh_title();
    }

    fn next_shader(&mut self) {
        let Some(id) = self.hovered() else {
            return;
        };
        if self.shaders.is_none() {
            match self.manager.context().loader.shader_list() {
                Ok(list) => self.shaders = Some(list),
                Err(err) => {
                    tracing::warn!(error = %err, "could not list shaders");
                    return;
                }
            }
        }
        let current = match self.manager.player(&id) {
            Some(player) => player.shader().to_string(),
            None => return,
        };
        let next = self
            .shaders
            .as_deref()
            .and_then(|list| controls::next_after(list, &current))
            .map(str::to_string);
        if let Some(shader) = next {
            self.apply(Intent::ChangeShader { id, shader });
        }
    }

    fn emit(&self, event: BusEvent) {
        if let Err(err) = self.manager.emit(event) {
            tracing::warn!(error = %err, "event rejected");
        }
    }

    fn apply(&mut self, intent: Intent) {
        if let Err(err) = self.manager.apply(intent, Instant::now()) {
            tracing::warn!(error = %err, "request rejected");
        }
    }

    fn refresh_title(&mut self) {
        let mode = self.manager.context().config.borrow().cursor_mode;
        let title = self.status.title(mode.as_str(), self.manager.len());
        if title != self.title {
            self.window.set_title(&title);
            self.title = title;
        }
    }
}

/// Requests GLES 3.0 and falls back to desktop GL 3.3.
fn create_context(gl_config: &Config, window: &Window) -> Result<NotCurrentContext> {
    let raw_window_handle = Some(window.raw_window_handle());
    let display = gl_config.display();
    let gles = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(3, 0))))
        .build(raw_window_handle);
    let desktop = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(raw_window_handle);
    unsafe {
        display.create_context(gl_config, &gles).or_else(|err| {
            tracing::debug!(error = %err, "GLES 3.0 unavailable; trying desktop GL 3.3");
            display.create_context(gl_config, &desktop)
        })
    }
    .context("failed to create a GL context")
}

fn load_backend(display: &Display) -> GlowBackend {
    unsafe {
        let gl = glow::Context::from_loader_function_cstr(|symbol| display.get_proc_address(symbol));
        GlowBackend::new(gl)
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}
