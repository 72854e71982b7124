//! The live set of players, their grid layout and the shared tick clock.
//!
//! Hosts talk to the manager in two ways: [`BusEvent`]s go through
//! [`PlayerSetManager::emit`] and fan out to every player, while structural
//! changes are [`Intent`]s handled by [`PlayerSetManager::apply`]. Players
//! never hold a reference back to the manager.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use playconfig::{is_hex_color, ConfigError, PlayerDescriptor, DEFAULT_SHADER};
use renderer::{FrameOutcome, Gl, ProgramError, Rect, Size};
use scheduler::{SchedulerError, TickClock};
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, Subscription};
use crate::context::{self, AppContext};
use crate::cursor::hex_to_rgb_normalized;
use crate::player::{Player, PlayerInit};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no player with id '{0}'")]
    UnknownPlayer(String),
    #[error("'{0}' is not a #rrggbb color")]
    InvalidColor(String),
    #[error("cursor size must be positive, got {width}x{height}")]
    InvalidCursorSize { width: f32, height: f32 },
    #[error("shader name must not be empty")]
    EmptyShaderName,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Structural requests from the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Adds a player; `None` picks the default shader.
    AddPlayer { shader: Option<String> },
    RemovePlayer(String),
    ChangeShader { id: String, shader: String },
    ToggleTexture { id: String, show: bool },
    SetTickInterval(Duration),
}

/// Grid cells for `count` players inside `viewport`, row-major from the top.
///
/// `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`. Rects use a bottom-left origin.
pub fn grid_layout(count: usize, viewport: Size) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let cols = (count as f64).sqrt().ceil() as u32;
    let rows = (count as u32).div_ceil(cols);
    let width = (viewport.width / cols).max(1);
    let height = (viewport.height / rows).max(1);
    (0..count as u32)
        .map(|index| {
            let col = index % cols;
            let row = index / cols;
            let y = viewport.height as i32 - ((row + 1) * height) as i32;
            Rect::new((col * width) as i32, y, width, height)
        })
        .collect()
}

struct PlayerSlot<G: Gl> {
    player: Rc<RefCell<Player<G>>>,
    subscription: Subscription,
    cell: Rect,
}

pub struct PlayerSetManager<G: Gl + 'static> {
    gl: Rc<G>,
    context: AppContext,
    slots: Vec<PlayerSlot<G>>,
    settings: Subscription,
    clock: TickClock,
    viewport: Size,
    next_seed: u64,
}

impl<G: Gl + 'static> PlayerSetManager<G> {
    /// Builds one player per configured descriptor and starts their fetches.
    pub fn new(
        gl: Rc<G>,
        context: AppContext,
        viewport: Size,
        seed: u64,
        now: Instant,
    ) -> Result<Self, ManagerError> {
        let (interval, descriptors) = {
            let config = context.config.borrow();
            (config.tick_interval, config.players.clone())
        };
        let clock = TickClock::new(interval, now)?;
        let settings = subscribe_settings(&context);
        let mut manager = Self {
            gl,
            context,
            slots: Vec::new(),
            settings,
            clock,
            viewport: viewport.at_least_one(),
            next_seed: seed,
        };
        for descriptor in descriptors {
            manager.spawn(descriptor)?;
        }
        manager.relayout();
        let tickets: Vec<_> = manager
            .slots
            .iter()
            .map(|slot| {
                let mut player = slot.player.borrow_mut();
                let shader = player.shader().to_string();
                player.begin_load(&shader)
            })
            .collect();
        for ticket in tickets {
            manager.context.loader.request(ticket);
        }
        info!(players = manager.slots.len(), "player set ready");
        Ok(manager)
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.player.borrow().id().to_string())
            .collect()
    }

    pub fn player(&self, id: &str) -> Option<Ref<'_, Player<G>>> {
        self.index_of(id).map(|index| self.slots[index].player.borrow())
    }

    pub fn cell(&self, id: &str) -> Option<Rect> {
        self.index_of(id).map(|index| self.slots[index].cell)
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn tick_interval(&self) -> Duration {
        self.clock.interval()
    }

    /// Validates and broadcasts `event` to the settings listener and every player.
    pub fn emit(&self, event: BusEvent) -> Result<(), ManagerError> {
        match &event {
            BusEvent::CursorColor(hex) | BusEvent::BackgroundColor(hex) if !is_hex_color(hex) => {
                return Err(ManagerError::InvalidColor(hex.clone()));
            }
            BusEvent::ChangeCursor { width, height } if *width <= 0.0 || *height <= 0.0 => {
                return Err(ManagerError::InvalidCursorSize {
                    width: *width,
                    height: *height,
                });
            }
            BusEvent::TickInterval(interval) if interval.is_zero() => {
                return Err(SchedulerError::ZeroInterval.into());
            }
            _ => {}
        }
        debug!(event = event.name(), "emitting");
        self.context.bus.emit(event);
        Ok(())
    }

    pub fn apply(&mut self, intent: Intent, now: Instant) -> Result<(), ManagerError> {
        match intent {
            Intent::AddPlayer { shader } => {
                let shader = shader.unwrap_or_else(|| DEFAULT_SHADER.to_string());
                if shader.trim().is_empty() {
                    return Err(ManagerError::EmptyShaderName);
                }
                let descriptor = PlayerDescriptor::new(shader.clone());
                let id = descriptor.id.clone();
                self.spawn(descriptor.clone())?;
                self.context.config.borrow_mut().add_player(descriptor);
                self.relayout();
                self.persist();
                self.request_shader(&id, &shader)?;
                info!(player = %id, shader = %shader, "player added");
            }
            Intent::RemovePlayer(id) => {
                self.remove(&id)?;
                self.context.config.borrow_mut().remove_player(&id);
                self.persist();
            }
            Intent::ChangeShader { id, shader } => {
                if shader.trim().is_empty() {
                    return Err(ManagerError::EmptyShaderName);
                }
                self.request_shader(&id, &shader)?;
            }
            Intent::ToggleTexture { id, show } => {
                let index = self
                    .index_of(&id)
                    .ok_or_else(|| ManagerError::UnknownPlayer(id.clone()))?;
                self.slots[index].player.borrow_mut().set_show_texture(show);
                self.context.config.borrow_mut().set_show_texture(&id, show);
                self.persist();
            }
            Intent::SetTickInterval(interval) => {
                self.clock.set_interval(interval, now)?;
                self.emit(BusEvent::TickInterval(interval))?;
            }
        }
        Ok(())
    }

    fn request_shader(&mut self, id: &str, shader: &str) -> Result<(), ManagerError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ManagerError::UnknownPlayer(id.to_string()))?;
        let ticket = self.slots[index].player.borrow_mut().begin_load(shader);
        self.context.loader.request(ticket);
        Ok(())
    }

    /// Applies every fetch that finished since the last call.
    pub fn pump_fetches(&mut self) -> usize {
        let mut applied = 0;
        for completion in self.context.loader.drain() {
            let id = completion.ticket.player_id.clone();
            let Some(index) = self.index_of(&id) else {
                debug!(player = %id, shader = %completion.ticket.shader, "dropping fetch for removed player");
                continue;
            };
            let (outcome, shader) = {
                let mut player = self.slots[index].player.borrow_mut();
                let outcome = player.apply_fetch(completion);
                (outcome, player.shader().to_string())
            };
            if outcome.selection_changed() {
                self.context.config.borrow_mut().set_shader(&id, &shader);
                self.persist();
                applied += 1;
            }
        }
        applied
    }

    /// Fires one tick on every player when the interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.clock.poll(now) {
            return false;
        }
        for slot in &self.slots {
            slot.player.borrow_mut().tick();
        }
        true
    }

    pub fn next_tick(&self) -> Instant {
        self.clock.next_deadline()
    }

    /// Draws every player into its target and blits it into its cell.
    pub fn render(&mut self, now: Instant) -> usize {
        let mut drawn = 0;
        for slot in &self.slots {
            let mut player = slot.player.borrow_mut();
            if let FrameOutcome::Drawn { .. } = player.frame(now) {
                drawn += 1;
            }
            if player.lifecycle().is_active() {
                player.present(slot.cell);
            }
        }
        drawn
    }

    pub fn resize(&mut self, viewport: Size) {
        let viewport = viewport.at_least_one();
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.relayout();
    }

    /// Finds the player under a window point (bottom-left origin) and
    /// returns its id with the point in that player's canvas space.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<(String, f32, f32)> {
        self.slots.iter().find(|slot| slot.cell.contains(x, y)).map(|slot| {
            let id = slot.player.borrow().id().to_string();
            (id, x - slot.cell.x as f32, y - slot.cell.y as f32)
        })
    }

    pub fn context_lost(&mut self) {
        warn!(players = self.slots.len(), "GL context lost");
        for slot in &self.slots {
            slot.player.borrow_mut().context_lost();
        }
    }

    /// Moves every player onto `gl`; a player that fails to restore is reported and skipped.
    pub fn context_restored(&mut self, gl: Rc<G>) {
        self.gl = gl;
        for slot in &self.slots {
            let mut player = slot.player.borrow_mut();
            if let Err(err) = player.context_restored(Rc::clone(&self.gl)) {
                warn!(player = %player.id(), error = %err, "player did not survive context restore");
            }
        }
        info!(players = self.slots.len(), "GL context restored");
    }

    /// Unsubscribes and disposes every player.
    pub fn shutdown(&mut self) {
        for mut slot in self.slots.drain(..) {
            slot.subscription.unsubscribe();
            slot.player.borrow_mut().dispose();
        }
        self.settings.unsubscribe();
    }

    fn spawn(&mut self, descriptor: PlayerDescriptor) -> Result<(), ManagerError> {
        let (cursor_color, background_color, mode) = {
            let config = self.context.config.borrow();
            (
                hex_to_rgb_normalized(&config.cursor_color),
                hex_to_rgb_normalized(&config.background_color),
                config.cursor_mode,
            )
        };
        let size = grid_layout(self.slots.len() + 1, self.viewport)
            .last()
            .map(|cell| cell.size())
            .unwrap_or(self.viewport);
        let init = PlayerInit {
            descriptor,
            size,
            cursor_color,
            background_color,
            mode,
            seed: self.next_seed,
            decoration: self.context.decoration.clone(),
        };
        self.next_seed = self.next_seed.wrapping_add(1);
        let player = Rc::new(RefCell::new(Player::new(
            Rc::clone(&self.gl),
            init,
            &self.context.reporter,
        )?));
        let weak = Rc::downgrade(&player);
        let subscription = self.context.bus.subscribe(move |event| {
            let Some(player) = weak.upgrade() else {
                return;
            };
            match player.try_borrow_mut() {
                Ok(mut player) => player.handle_event(event),
                Err(_) => warn!(event = event.name(), "player busy; event skipped"),
            };
        });
        self.slots.push(PlayerSlot {
            player,
            subscription,
            cell: Rect::default(),
        });
        Ok(())
    }

    /// Unsubscribe, dispose, then drop from the list and relayout.
    fn remove(&mut self, id: &str) -> Result<(), ManagerError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ManagerError::UnknownPlayer(id.to_string()))?;
        {
            let slot = &mut self.slots[index];
            slot.subscription.unsubscribe();
            slot.player.borrow_mut().dispose();
        }
        self.slots.remove(index);
        self.relayout();
        info!(player = %id, remaining = self.slots.len(), "player removed");
        Ok(())
    }

    fn relayout(&mut self) {
        let cells = grid_layout(self.slots.len(), self.viewport);
        for (slot, cell) in self.slots.iter_mut().zip(cells) {
            slot.cell = cell;
            let mut player = slot.player.borrow_mut();
            if let Err(err) = player.resize(cell.size()) {
                warn!(player = %player.id(), error = %err, "failed to resize player");
            }
        }
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.player.borrow().id() == id)
    }

    fn persist(&self) {
        if let Err(err) = self.context.persist() {
            warn!(error = %err, "failed to persist configuration");
        }
    }
}

impl<G: Gl + 'static> Drop for PlayerSetManager<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Records global settings carried by bus events and persists them.
fn subscribe_settings(context: &AppContext) -> Subscription {
    let config = Rc::clone(&context.config);
    let store = Rc::clone(&context.store);
    context.bus.subscribe(move |event| {
        {
            let mut config = config.borrow_mut();
            match event {
                BusEvent::CursorColor(hex) => config.cursor_color = hex.clone(),
                BusEvent::BackgroundColor(hex) => config.background_color = hex.clone(),
                BusEvent::ChangeMode(mode) => config.cursor_mode = *mode,
                BusEvent::TickInterval(interval) => config.tick_interval = *interval,
                BusEvent::Keyboard(_) | BusEvent::ChangeCursor { .. } | BusEvent::Click { .. } => {
                    return;
                }
            }
        }
        if let Err(err) = context::persist(store.as_ref(), &config) {
            warn!(event = event.name(), error = %err, "failed to persist setting");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Direction;
    use crate::loader::fake::FakeSource;
    use crate::player::{PlayerState, CHANNEL_UNIFORM};
    use playconfig::{ConfigStore, Configuration, CursorMode, MemoryStore};
    use renderer::testing::RecordingGl;
    use renderer::Reporter;

    const BODY: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(p, 0.0, 1.0); }";

    struct Harness {
        gl: Rc<RecordingGl>,
        store: Rc<MemoryStore>,
        manager: PlayerSetManager<RecordingGl>,
    }

    fn harness(players: &[(&str, &str)]) -> Harness {
        let mut config = Configuration::default();
        for (id, shader) in players {
            config.add_player(PlayerDescriptor::with_id(*id, *shader));
        }
        let store = Rc::new(MemoryStore::new());
        let source = FakeSource::with(&[
            ("debug_cursor_static.glsl", BODY),
            ("cursor_smear.glsl", BODY),
            ("broken.glsl", "FAIL_COMPILE"),
        ]);
        let context = AppContext::new(config, store.clone(), source, Reporter::new());
        let gl = Rc::new(RecordingGl::new());
        let manager =
            PlayerSetManager::new(Rc::clone(&gl), context, Size::new(400, 200), 1, Instant::now())
                .unwrap();
        Harness { gl, store, manager }
    }

    fn settle(manager: &mut PlayerSetManager<RecordingGl>, expected: usize) {
        let mut applied = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while applied < expected && Instant::now() < deadline {
            applied += manager.pump_fetches();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(applied, expected, "fetches did not settle");
    }

    #[test]
    fn grid_is_square_ish() {
        let viewport = Size::new(300, 200);
        assert_eq!(grid_layout(1, viewport), [Rect::new(0, 0, 300, 200)]);
        let three = grid_layout(3, viewport);
        assert_eq!(three.len(), 3);
        assert_eq!(three[0], Rect::new(0, 100, 150, 100));
        assert_eq!(three[1], Rect::new(150, 100, 150, 100));
        assert_eq!(three[2], Rect::new(0, 0, 150, 100));
        assert_eq!(grid_layout(5, viewport).len(), 5);
        assert!(grid_layout(0, viewport).is_empty());
    }

    #[test]
    fn loads_every_configured_player() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl"), ("b", "cursor_smear.glsl")]);
        settle(&mut h.manager, 2);
        for id in ["a", "b"] {
            let player = h.manager.player(id).unwrap();
            assert_eq!(player.state(), PlayerState::Loaded);
            assert_eq!(player.size(), Size::new(200, 200));
        }
        assert_eq!(h.manager.render(Instant::now()), 2);
        assert_eq!(h.gl.blits().len(), 2);
    }

    #[test]
    fn settings_events_are_persisted() {
        let h = harness(&[("a", "debug_cursor_static.glsl")]);
        h.manager
            .emit(BusEvent::CursorColor("#fedf16".into()))
            .unwrap();
        h.manager
            .emit(BusEvent::ChangeMode(CursorMode::Click))
            .unwrap();
        let stored = h.store.load().unwrap().unwrap();
        assert_eq!(stored.cursor_color, "#fedf16");
        assert_eq!(stored.cursor_mode, CursorMode::Click);
        assert_eq!(h.manager.player("a").unwrap().mode(), CursorMode::Click);
    }

    #[test]
    fn invalid_events_are_rejected_before_dispatch() {
        let h = harness(&[("a", "debug_cursor_static.glsl")]);
        assert!(matches!(
            h.manager.emit(BusEvent::BackgroundColor("blue".into())),
            Err(ManagerError::InvalidColor(_))
        ));
        assert!(h
            .manager
            .emit(BusEvent::ChangeCursor {
                width: 0.0,
                height: 20.0
            })
            .is_err());
        assert_eq!(h.store.writes(), 0);
    }

    #[test]
    fn keyboard_reaches_every_player() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl"), ("b", "cursor_smear.glsl")]);
        settle(&mut h.manager, 2);
        h.manager.emit(BusEvent::Keyboard(Direction::Up)).unwrap();
        for id in ["a", "b"] {
            assert_eq!(h.manager.player(id).unwrap().cursor().position(), (0.0, 20.0));
        }
    }

    #[test]
    fn change_shader_persists_by_id() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl"), ("p1", "debug_cursor_static.glsl")]);
        settle(&mut h.manager, 2);
        h.manager
            .apply(
                Intent::ChangeShader {
                    id: "p1".into(),
                    shader: "cursor_smear.glsl".into(),
                },
                Instant::now(),
            )
            .unwrap();
        settle(&mut h.manager, 1);
        let stored = h.store.load().unwrap().unwrap();
        assert_eq!(stored.player("p1").unwrap().shader, "cursor_smear.glsl");
        assert_eq!(stored.player("a").unwrap().shader, "debug_cursor_static.glsl");
    }

    #[test]
    fn broken_shader_keeps_previous_program_rendering() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl")]);
        settle(&mut h.manager, 1);
        h.manager
            .apply(
                Intent::ChangeShader {
                    id: "a".into(),
                    shader: "broken.glsl".into(),
                },
                Instant::now(),
            )
            .unwrap();
        settle(&mut h.manager, 1);
        assert!(h.manager.player("a").unwrap().lifecycle().is_active());
        assert_eq!(h.manager.render(Instant::now()), 1);
    }

    #[test]
    fn remove_releases_gl_objects_and_relayouts() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl"), ("b", "cursor_smear.glsl")]);
        settle(&mut h.manager, 2);
        let bus_listeners = h.manager.context().bus.listener_count();
        h.manager
            .apply(Intent::RemovePlayer("a".into()), Instant::now())
            .unwrap();
        assert_eq!(h.manager.ids(), ["b"]);
        assert_eq!(h.manager.context().bus.listener_count(), bus_listeners - 1);
        assert_eq!(h.manager.cell("b"), Some(Rect::new(0, 0, 400, 200)));
        assert_eq!(h.gl.live_programs(), 1);
        assert_eq!(h.gl.double_frees(), 0);
        assert!(h.store.load().unwrap().unwrap().player("a").is_none());
    }

    #[test]
    fn removing_mid_fetch_drops_late_completion() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl")]);
        h.manager
            .apply(Intent::RemovePlayer("a".into()), Instant::now())
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(h.manager.pump_fetches(), 0);
        assert!(h.manager.is_empty());
        assert_eq!(h.gl.live_objects(), 0);
    }

    #[test]
    fn add_player_uses_default_shader() {
        let mut h = harness(&[]);
        h.manager
            .apply(Intent::AddPlayer { shader: None }, Instant::now())
            .unwrap();
        settle(&mut h.manager, 1);
        let ids = h.manager.ids();
        let player = h.manager.player(&ids[0]).unwrap();
        assert_eq!(player.shader(), DEFAULT_SHADER);
        assert!(player.lifecycle().uniform(CHANNEL_UNIFORM).is_some());
    }

    #[test]
    fn ticks_every_player_once_per_interval() {
        let mut h = harness(&[("a", "debug_cursor_static.glsl"), ("b", "cursor_smear.glsl")]);
        let start = Instant::now();
        h.manager
            .apply(Intent::SetTickInterval(Duration::from_millis(100)), start)
            .unwrap();
        assert!(!h.manager.tick(start + Duration::from_millis(50)));
        assert!(h.manager.tick(start + Duration::from_millis(100)));
        for id in ["a", "b"] {
            assert_eq!(h.manager.player(id).unwrap().cursor().position(), (180.0, 20.0));
        }
        let stored = h.store.load().unwrap().unwrap();
        assert_eq!(stored.tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn hit_test_maps_into_cell_space() {
        let h = harness(&[("a", "debug_cursor_static.glsl"), ("b", "cursor_smear.glsl")]);
        let (id, x, y) = h.manager.hit_test(250.0, 30.0).unwrap();
        assert_eq!(id, "b");
        assert_eq!((x, y), (50.0, 30.0));
    }
}
