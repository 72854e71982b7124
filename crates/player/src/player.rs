//! One shader slot: program, render loop, cursor and background canvas.
//!
//! A player is `Idle` until its first program links, `Loaded` afterwards and
//! `Disposed` once torn down. Bus events turn into uniform writes; shader
//! changes arrive as [`FetchCompletion`]s tagged with a generation so only
//! the most recent selection is ever applied.

use std::rc::Rc;
use std::time::Instant;

use playconfig::{CursorMode, PlayerDescriptor};
use renderer::{
    BackgroundCanvas, FrameOutcome, Gl, Primitive, ProgramError, ProgramLifecycle, ProgramState,
    Rect, RenderLoop, RenderReport, ReportKind, Reporter, RgbaImage, Size, TIME_UNIFORM,
    VERTEX_SHADER,
};
use scheduler::{Area, Ticker};
use tracing::{debug, info};

use crate::bus::BusEvent;
use crate::cursor::{
    hex_to_rgb_normalized, CursorModel, CURRENT_CURSOR_UNIFORM, CURSOR_CHANGE_TIME_UNIFORM,
    CURSOR_COLOR_UNIFORM, PREVIOUS_CURSOR_UNIFORM,
};
use crate::loader::{FetchCompletion, FetchTicket};

/// Sampler carrying the background canvas.
pub const CHANNEL_UNIFORM: &str = "iChannel0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loaded,
    Disposed,
}

/// What happened to a fetch completion handed to [`Player::apply_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The player was disposed before the fetch finished.
    Dropped,
    /// A newer selection superseded this one.
    Stale,
    FetchFailed,
    /// Source arrived and the selection was recorded, but the program did not link.
    CompileFailed,
    Loaded,
}

impl FetchOutcome {
    /// True when the selected shader name should be persisted.
    pub fn selection_changed(self) -> bool {
        matches!(self, FetchOutcome::CompileFailed | FetchOutcome::Loaded)
    }
}

/// Everything a player needs besides the GL handle.
#[derive(Debug, Clone)]
pub struct PlayerInit {
    pub descriptor: PlayerDescriptor,
    pub size: Size,
    pub cursor_color: [f32; 4],
    pub background_color: [f32; 4],
    pub mode: CursorMode,
    pub seed: u64,
    pub decoration: Option<RgbaImage>,
}

pub struct Player<G: Gl> {
    id: String,
    shader: String,
    state: PlayerState,
    lifecycle: ProgramLifecycle<G>,
    render_loop: RenderLoop,
    cursor: CursorModel,
    previous: [f32; 4],
    ticker: Ticker,
    canvas: BackgroundCanvas,
    generation: u64,
    pending: Option<String>,
    last_fragment: Option<String>,
    reporter: Reporter,
}

impl<G: Gl> Player<G> {
    pub fn new(gl: Rc<G>, init: PlayerInit, reporter: &Reporter) -> Result<Self, ProgramError> {
        let PlayerInit {
            descriptor,
            size,
            cursor_color,
            background_color,
            mode,
            seed,
            decoration,
        } = init;
        let reporter = reporter.scoped(format!("player {}", descriptor.id));
        let lifecycle = ProgramLifecycle::new(gl, size, reporter.clone())?;

        let mut canvas = BackgroundCanvas::new(lifecycle.size());
        canvas.set_color(background_color);
        canvas.set_decoration(decoration);
        canvas.set_show_decoration(descriptor.show_texture);

        let mut cursor = CursorModel::new();
        cursor.set_rgba(cursor_color);
        let previous = cursor.uniform_data();

        let mut player = Self {
            id: descriptor.id,
            shader: descriptor.shader,
            state: PlayerState::Idle,
            lifecycle,
            render_loop: RenderLoop::new(),
            cursor,
            previous,
            ticker: Ticker::new(mode, seed),
            canvas,
            generation: 0,
            pending: None,
            last_fragment: None,
            reporter,
        };
        player.apply_cursor_color();
        player.redraw_background();
        Ok(player)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shader name of the current selection.
    pub fn shader(&self) -> &str {
        &self.shader
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> &CursorModel {
        &self.cursor
    }

    pub fn previous_cursor(&self) -> [f32; 4] {
        self.previous
    }

    pub fn mode(&self) -> CursorMode {
        self.ticker.mode()
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn lifecycle(&self) -> &ProgramLifecycle<G> {
        &self.lifecycle
    }

    pub fn program_state(&self) -> ProgramState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn size(&self) -> Size {
        self.lifecycle.size()
    }

    pub fn show_texture(&self) -> bool {
        self.canvas.show_decoration()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shader name of the fetch currently in flight, if any.
    pub fn pending_shader(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Starts a new selection. Earlier in-flight fetches become stale.
    pub fn begin_load(&mut self, shader: &str) -> FetchTicket {
        self.generation += 1;
        self.pending = Some(shader.to_string());
        FetchTicket {
            player_id: self.id.clone(),
            generation: self.generation,
            shader: shader.to_string(),
        }
    }

    pub fn apply_fetch(&mut self, completion: FetchCompletion) -> FetchOutcome {
        let FetchCompletion { ticket, result } = completion;
        if self.state == PlayerState::Disposed {
            debug!(player = %self.id, shader = %ticket.shader, "fetch finished after dispose");
            return FetchOutcome::Dropped;
        }
        if ticket.generation != self.generation {
            debug!(
                player = %self.id,
                shader = %ticket.shader,
                generation = ticket.generation,
                current = self.generation,
                "discarding stale fetch"
            );
            return FetchOutcome::Stale;
        }
        self.pending = None;
        let fragment = match result {
            Ok(fragment) => fragment,
            Err(err) => {
                self.reporter.report(RenderReport::new(
                    ReportKind::Fetch,
                    format!("failed to fetch `{}`: {err}", ticket.shader),
                ));
                return FetchOutcome::FetchFailed;
            }
        };
        self.shader = ticket.shader;
        match self.play(&fragment) {
            Ok(()) => FetchOutcome::Loaded,
            Err(_) => FetchOutcome::CompileFailed,
        }
    }

    /// Stops, loads `fragment`, restarts and re-applies cursor and texture state.
    ///
    /// On failure the previously linked program (if any) keeps rendering.
    pub fn play(&mut self, fragment: &str) -> Result<(), ProgramError> {
        if self.state == PlayerState::Disposed {
            return Err(ProgramError::Disposed);
        }
        self.render_loop.stop();
        let result = self.lifecycle.load_shader(VERTEX_SHADER, fragment);
        if result.is_ok() {
            info!(player = %self.id, shader = %self.shader, "playing shader");
            self.last_fragment = Some(fragment.to_string());
            self.state = PlayerState::Loaded;
            self.render_loop.reset();
            if self.lifecycle.uniform(TIME_UNIFORM).is_some() {
                self.lifecycle.set_uniform(TIME_UNIFORM, 0.0_f32);
            }
            self.reapply_uniforms();
        }
        self.render_loop.start();
        result
    }

    fn reapply_uniforms(&mut self) {
        self.apply_cursor_color();
        self.lifecycle
            .set_uniform(PREVIOUS_CURSOR_UNIFORM, self.previous);
        self.lifecycle
            .set_uniform(CURRENT_CURSOR_UNIFORM, self.cursor.uniform_data());
        if self.lifecycle.uniform(CHANNEL_UNIFORM).is_none() {
            self.redraw_background();
        }
    }

    fn apply_cursor_color(&mut self) {
        self.lifecycle
            .set_uniform(CURSOR_COLOR_UNIFORM, self.cursor.color());
    }

    pub fn handle_event(&mut self, event: &BusEvent) {
        if self.state == PlayerState::Disposed {
            return;
        }
        match event {
            BusEvent::CursorColor(hex) => {
                self.cursor.set_color(hex);
                self.apply_cursor_color();
            }
            BusEvent::BackgroundColor(hex) => {
                self.canvas.set_color(hex_to_rgb_normalized(hex));
                self.redraw_background();
            }
            BusEvent::Keyboard(direction) => {
                let direction = *direction;
                self.update_cursor(|cursor| cursor.step(direction));
            }
            BusEvent::ChangeCursor { width, height } => {
                let (width, height) = (*width, *height);
                self.update_cursor(|cursor| cursor.set_size(width, height));
            }
            BusEvent::Click { x, y } => {
                if self.ticker.has_tick() {
                    self.tick();
                } else {
                    let (x, y) = (*x, *y);
                    self.update_cursor(|cursor| cursor.set_position(Some(x), Some(y)));
                }
            }
            BusEvent::ChangeMode(mode) => {
                debug!(player = %self.id, mode = %mode, "cursor mode changed");
                self.ticker.set_mode(*mode);
            }
            BusEvent::TickInterval(_) => {}
        }
    }

    /// Runs one simulation step. Returns the number of cursor updates.
    pub fn tick(&mut self) -> usize {
        if self.state == PlayerState::Disposed || !self.ticker.has_tick() {
            return 0;
        }
        let size = self.size();
        let area = Area::new(size.width as f32, size.height as f32);
        let placements = self.ticker.tick(area);
        for &(x, y) in &placements {
            self.update_cursor(|cursor| cursor.set_position(Some(x), Some(y)));
        }
        placements.len()
    }

    /// Uploads the old cursor, then the new one, then the change timestamp.
    fn update_cursor(&mut self, change: impl FnOnce(&mut CursorModel)) {
        let previous = self.cursor.uniform_data();
        change(&mut self.cursor);
        self.previous = previous;
        self.lifecycle.set_uniform(PREVIOUS_CURSOR_UNIFORM, previous);
        self.lifecycle
            .set_uniform(CURRENT_CURSOR_UNIFORM, self.cursor.uniform_data());
        if let Some(Primitive::Float(time)) = self.lifecycle.uniform(TIME_UNIFORM).cloned() {
            self.lifecycle.set_uniform(CURSOR_CHANGE_TIME_UNIFORM, time);
        }
    }

    pub fn set_show_texture(&mut self, show: bool) {
        if self.state == PlayerState::Disposed || self.canvas.show_decoration() == show {
            return;
        }
        self.canvas.set_show_decoration(show);
        self.redraw_background();
    }

    /// Repaints the background and re-registers it as `iChannel0`.
    fn redraw_background(&mut self) {
        if self.lifecycle.is_context_lost() {
            return;
        }
        let size = self.canvas.size();
        let pixels = self.canvas.texture_pixels();
        if let Err(err) = self.lifecycle.upload_texture(CHANNEL_UNIFORM, size, &pixels) {
            debug!(player = %self.id, error = %err, "background texture not uploaded");
        }
    }

    pub fn resize(&mut self, size: Size) -> Result<(), ProgramError> {
        let size = size.at_least_one();
        if self.state == PlayerState::Disposed || size == self.size() {
            return Ok(());
        }
        self.lifecycle.resize(size)?;
        self.canvas.resize(size);
        self.redraw_background();
        Ok(())
    }

    pub fn frame(&mut self, now: Instant) -> FrameOutcome {
        self.render_loop.frame(&mut self.lifecycle, now)
    }

    pub fn present(&self, dest: Rect) {
        self.lifecycle.present(dest);
    }

    /// The GL context went away; keep CPU-side state for the restore.
    pub fn context_lost(&mut self) {
        if self.state == PlayerState::Disposed {
            return;
        }
        self.render_loop.stop();
        self.lifecycle.context_lost();
        self.state = PlayerState::Idle;
    }

    /// Rebuilds GL resources on `gl` and replays the last linked fragment.
    pub fn context_restored(&mut self, gl: Rc<G>) -> Result<(), ProgramError> {
        if self.state == PlayerState::Disposed {
            return Err(ProgramError::Disposed);
        }
        self.lifecycle.context_restored(gl)?;
        self.redraw_background();
        self.apply_cursor_color();
        match self.last_fragment.clone() {
            Some(fragment) => self.play(&fragment),
            None => Ok(()),
        }
    }

    /// Stops rendering and releases every GL object. Safe to repeat.
    pub fn dispose(&mut self) {
        if self.state == PlayerState::Disposed {
            return;
        }
        self.render_loop.stop();
        self.lifecycle.dispose();
        self.generation += 1;
        self.pending = None;
        self.state = PlayerState::Disposed;
        debug!(player = %self.id, "player disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Direction;
    use crate::loader::fake::WRAPPER;
    use crate::loader::FetchError;
    use renderer::testing::RecordingGl;
    use renderer::wrap_fragment;
    use shaderlib::SourceError;
    use std::time::Duration;

    const BODY: &str = "void mainImage(out vec4 c, in vec2 p) { c = iCurrentCursorColor; }";

    fn fragment(body: &str) -> String {
        wrap_fragment(WRAPPER, body).unwrap()
    }

    fn init(id: &str) -> PlayerInit {
        PlayerInit {
            descriptor: PlayerDescriptor::with_id(id, "debug_cursor_static.glsl"),
            size: Size::new(200, 100),
            cursor_color: [1.0, 0.0, 0.0, 1.0],
            background_color: [0.0, 0.0, 0.0, 1.0],
            mode: CursorMode::Auto,
            seed: 7,
            decoration: None,
        }
    }

    fn player(gl: &Rc<RecordingGl>) -> Player<RecordingGl> {
        Player::new(Rc::clone(gl), init("p1"), &Reporter::new()).unwrap()
    }

    fn loaded(gl: &Rc<RecordingGl>) -> Player<RecordingGl> {
        let mut player = player(gl);
        player.play(&fragment(BODY)).unwrap();
        player
    }

    fn completion(ticket: FetchTicket, body: &str) -> FetchCompletion {
        FetchCompletion {
            ticket,
            result: Ok(fragment(body)),
        }
    }

    #[test]
    fn starts_idle_with_background_texture() {
        let gl = Rc::new(RecordingGl::new());
        let player = player(&gl);
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.lifecycle().texture_count(), 1);
        assert!(!player.is_running());
    }

    #[test]
    fn play_links_and_reapplies_cursor_state() {
        let gl = Rc::new(RecordingGl::new());
        let player = loaded(&gl);
        assert_eq!(player.state(), PlayerState::Loaded);
        assert!(player.is_running());
        assert_eq!(gl.upload_count(CURSOR_COLOR_UNIFORM), 1);
        assert_eq!(gl.upload_count(CURRENT_CURSOR_UNIFORM), 1);
        assert_eq!(gl.upload_count(PREVIOUS_CURSOR_UNIFORM), 1);
    }

    #[test]
    fn keyboard_uploads_previous_then_current() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        player.handle_event(&BusEvent::Keyboard(Direction::Up));
        gl.clear_uploads();
        player.handle_event(&BusEvent::Keyboard(Direction::Up));
        let names: Vec<String> = gl.uploads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, [PREVIOUS_CURSOR_UNIFORM, CURRENT_CURSOR_UNIFORM]);
        assert_eq!(player.cursor().position(), (0.0, 40.0));
        assert_eq!(player.previous_cursor(), [0.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn change_time_follows_rendered_time() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let start = Instant::now();
        player.frame(start);
        player.handle_event(&BusEvent::Keyboard(Direction::Right));
        player.frame(start + Duration::from_millis(500));
        gl.clear_uploads();
        player.handle_event(&BusEvent::Keyboard(Direction::Right));
        let names: Vec<String> = gl.uploads().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            [
                PREVIOUS_CURSOR_UNIFORM,
                CURRENT_CURSOR_UNIFORM,
                CURSOR_CHANGE_TIME_UNIFORM
            ]
        );
    }

    #[test]
    fn reload_restarts_change_time_from_zero() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let start = Instant::now();
        player.frame(start);
        player.frame(start + Duration::from_secs(2));

        player.play(&fragment(BODY)).unwrap();
        player.handle_event(&BusEvent::Keyboard(Direction::Right));

        match player.lifecycle().uniform(CURSOR_CHANGE_TIME_UNIFORM) {
            Some(Primitive::Float(time)) => assert_eq!(*time, 0.0),
            other => panic!("unexpected change time {other:?}"),
        }
    }

    #[test]
    fn step_six_updates_cursor_twice() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let mut counts = Vec::new();
        for _ in 0..7 {
            let before = gl.upload_count(CURRENT_CURSOR_UNIFORM);
            player.tick();
            counts.push(gl.upload_count(CURRENT_CURSOR_UNIFORM) - before);
        }
        assert_eq!(counts, [1, 1, 1, 1, 1, 2, 1]);
    }

    #[test]
    fn click_steps_in_auto_and_places_in_click_mode() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        player.handle_event(&BusEvent::Click { x: 3.0, y: 4.0 });
        assert_eq!(player.cursor().position(), (180.0, 10.0));

        player.handle_event(&BusEvent::ChangeMode(CursorMode::Click));
        assert_eq!(player.tick(), 0);
        player.handle_event(&BusEvent::Click { x: 3.0, y: 4.0 });
        assert_eq!(player.cursor().position(), (3.0, 4.0));
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let result = player.play(&fragment("FAIL_COMPILE"));
        assert!(result.is_err());
        assert!(player.lifecycle().is_active());
        assert!(player.is_running());
        assert_eq!(player.state(), PlayerState::Loaded);
        assert!(matches!(
            player.frame(Instant::now()),
            FrameOutcome::Drawn { .. }
        ));
    }

    #[test]
    fn only_latest_selection_is_applied() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let first = player.begin_load("a.glsl");
        let second = player.begin_load("b.glsl");
        assert_eq!(
            player.apply_fetch(completion(second, BODY)),
            FetchOutcome::Loaded
        );
        assert_eq!(
            player.apply_fetch(completion(first, BODY)),
            FetchOutcome::Stale
        );
        assert_eq!(player.shader(), "b.glsl");
        assert_eq!(player.pending_shader(), None);
    }

    #[test]
    fn fetch_failure_keeps_selection_and_program() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let ticket = player.begin_load("gone.glsl");
        let outcome = player.apply_fetch(FetchCompletion {
            ticket,
            result: Err(FetchError::Source(SourceError::NotFound("gone.glsl".into()))),
        });
        assert_eq!(outcome, FetchOutcome::FetchFailed);
        assert!(!outcome.selection_changed());
        assert_eq!(player.shader(), "debug_cursor_static.glsl");
        assert!(player.lifecycle().is_active());
    }

    #[test]
    fn late_fetch_after_dispose_is_dropped() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        let ticket = player.begin_load("b.glsl");
        player.dispose();
        player.dispose();
        assert_eq!(
            player.apply_fetch(completion(ticket, BODY)),
            FetchOutcome::Dropped
        );
        assert_eq!(gl.live_objects(), 0);
        assert_eq!(gl.double_frees(), 0);
    }

    #[test]
    fn background_redraw_replaces_texture() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        player.handle_event(&BusEvent::BackgroundColor("#336699".into()));
        player.set_show_texture(true);
        assert_eq!(gl.live_textures(), 1);
        assert!(player.show_texture());
    }

    #[test]
    fn context_restore_replays_last_fragment() {
        let gl = Rc::new(RecordingGl::new());
        let mut player = loaded(&gl);
        player.context_lost();
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.is_running());

        let fresh = Rc::new(RecordingGl::new());
        player.context_restored(Rc::clone(&fresh)).unwrap();
        assert_eq!(player.state(), PlayerState::Loaded);
        assert!(player.lifecycle().is_active());
        assert_eq!(fresh.live_programs(), 1);
        assert_eq!(fresh.live_textures(), 1);
        assert_eq!(fresh.upload_count(CURSOR_COLOR_UNIFORM), 1);
    }
}
