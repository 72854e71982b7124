use std::time::{Duration, Instant};

use playconfig::CursorMode;
use rand::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
}

/// Width and height of the canvas cursor positions are computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    pub width: f32,
    pub height: f32,
}

impl Area {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Fixed-interval tick source shared by every player.
///
/// Missed intervals are not replayed: a late poll fires once and the next
/// deadline is measured from that poll.
#[derive(Debug, Clone)]
pub struct TickClock {
    interval: Duration,
    last: Instant,
}

impl TickClock {
    pub fn new(interval: Duration, now: Instant) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        Ok(Self {
            interval,
            last: now,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the interval and restarts the countdown from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        self.interval = interval;
        self.last = now;
        Ok(())
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.last + self.interval
    }
}

/// Seven-step walk over the canvas corners at 10%/90% margins.
///
/// Advancing increments the step first, so a fresh cycle starts at step 1.
/// Step 6 yields two placements: top-right then bottom-left.
#[derive(Debug, Clone, Default)]
pub struct PresetCycle {
    step: usize,
}

impl PresetCycle {
    pub const STEPS: usize = 7;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn advance(&mut self, area: Area) -> Vec<(f32, f32)> {
        self.step = (self.step + 1) % Self::STEPS;
        Self::placements(self.step, area)
    }

    pub fn placements(step: usize, area: Area) -> Vec<(f32, f32)> {
        let bottom = area.height * 0.1;
        let top = area.height * 0.9;
        let left = area.width * 0.1;
        let right = area.width * 0.9;
        match step % Self::STEPS {
            0 | 3 => vec![(left, top)],
            1 | 5 => vec![(right, bottom)],
            2 => vec![(right, top)],
            4 => vec![(left, bottom)],
            _ => vec![(right, top), (left, bottom)],
        }
    }
}

/// Per-player tick behaviour selected by [`CursorMode`].
///
/// The preset cycle position survives mode switches, so returning to `auto`
/// resumes where it left off.
#[derive(Debug, Clone)]
pub struct Ticker {
    mode: CursorMode,
    cycle: PresetCycle,
    rng: StdRng,
}

impl Ticker {
    pub fn new(mode: CursorMode, seed: u64) -> Self {
        Self {
            mode,
            cycle: PresetCycle::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CursorMode) {
        self.mode = mode;
    }

    /// False in `click` mode, where clicks place the cursor directly.
    pub fn has_tick(&self) -> bool {
        self.mode != CursorMode::Click
    }

    pub fn cycle(&self) -> &PresetCycle {
        &self.cycle
    }

    /// Cursor placements for one tick, in order. Empty when there is no tick.
    pub fn tick(&mut self, area: Area) -> Vec<(f32, f32)> {
        match self.mode {
            CursorMode::Auto => self.cycle.advance(area),
            CursorMode::Rnd => vec![self.random_point(area)],
            CursorMode::Click => Vec::new(),
        }
    }

    fn random_point(&mut self, area: Area) -> (f32, f32) {
        let x = self.rng.gen::<f32>() * area.width.max(0.0);
        let y = self.rng.gen::<f32>() * area.height.max(0.0);
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playconfig::Configuration;

    const AREA: Area = Area {
        width: 200.0,
        height: 100.0,
    };

    #[test]
    fn cycle_visits_seven_states_before_repeating() {
        let mut cycle = PresetCycle::new();
        let mut steps = Vec::new();
        for _ in 0..PresetCycle::STEPS {
            cycle.advance(AREA);
            steps.push(cycle.step());
        }
        assert_eq!(steps, [1, 2, 3, 4, 5, 6, 0]);
        cycle.advance(AREA);
        assert_eq!(cycle.step(), 1);
    }

    #[test]
    fn only_step_six_places_twice() {
        for step in 0..PresetCycle::STEPS {
            let expected = if step == 6 { 2 } else { 1 };
            assert_eq!(PresetCycle::placements(step, AREA).len(), expected, "step {step}");
        }
        assert_eq!(
            PresetCycle::placements(6, AREA),
            vec![(180.0, 90.0), (20.0, 10.0)]
        );
    }

    #[test]
    fn first_auto_tick_is_bottom_right() {
        let mut ticker = Ticker::new(CursorMode::Auto, 1);
        assert_eq!(ticker.tick(AREA), vec![(180.0, 10.0)]);
    }

    #[test]
    fn click_mode_has_no_tick() {
        let mut ticker = Ticker::new(CursorMode::Click, 1);
        assert!(!ticker.has_tick());
        assert!(ticker.tick(AREA).is_empty());
    }

    #[test]
    fn random_points_stay_in_bounds_and_are_seeded() {
        let mut a = Ticker::new(CursorMode::Rnd, 42);
        let mut b = Ticker::new(CursorMode::Rnd, 42);
        for _ in 0..50 {
            let point = a.tick(AREA);
            assert_eq!(point, b.tick(AREA));
            let (x, y) = point[0];
            assert!((0.0..200.0).contains(&x));
            assert!((0.0..100.0).contains(&y));
        }
    }

    #[test]
    fn preset_position_survives_mode_switch() {
        let mut ticker = Ticker::new(CursorMode::Auto, 9);
        ticker.tick(AREA);
        ticker.tick(AREA);
        ticker.set_mode(CursorMode::Rnd);
        ticker.tick(AREA);
        ticker.set_mode(CursorMode::Auto);
        ticker.tick(AREA);
        assert_eq!(ticker.cycle().step(), 3);
    }

    #[test]
    fn clock_fires_once_per_interval() {
        let config = Configuration::default();
        let start = Instant::now();
        let mut clock = TickClock::new(config.tick_interval, start).unwrap();
        assert!(!clock.poll(start + Duration::from_millis(999)));
        assert!(clock.poll(start + Duration::from_millis(1000)));
        assert!(!clock.poll(start + Duration::from_millis(1500)));
        assert!(clock.poll(start + Duration::from_millis(5000)));
        assert_eq!(clock.next_deadline(), start + Duration::from_millis(6000));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let now = Instant::now();
        assert!(TickClock::new(Duration::ZERO, now).is_err());
        let mut clock = TickClock::new(Duration::from_millis(250), now).unwrap();
        assert!(clock.set_interval(Duration::ZERO, now).is_err());
        assert_eq!(clock.interval(), Duration::from_millis(250));
    }
}
