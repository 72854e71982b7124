use std::time::Duration;

use player::Direction;
use winit::keyboard::{Key, NamedKey};

pub const CURSOR_COLORS: [&str; 6] = [
    "#ff0000", "#00ff00", "#0000ff", "#ffff00", "#ff00ff", "#ffffff",
];
pub const BACKGROUND_COLORS: [&str; 4] = ["#000000", "#1e1e2e", "#282828", "#ffffff"];

const MIN_TICK: Duration = Duration::from_millis(50);
const MAX_TICK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move(Direction),
    AddPlayer,
    RemoveHovered,
    CycleMode,
    NextShader,
    ToggleTexture,
    CycleCursorColor,
    CycleBackground,
    FasterTicks,
    SlowerTicks,
}

pub fn action_for(key: &Key) -> Option<Action> {
    match key {
        Key::Named(NamedKey::ArrowUp) => Some(Action::Move(Direction::Up)),
        Key::Named(NamedKey::ArrowDown) => Some(Action::Move(Direction::Down)),
        Key::Named(NamedKey::ArrowLeft) => Some(Action::Move(Direction::Left)),
        Key::Named(NamedKey::ArrowRight) => Some(Action::Move(Direction::Right)),
        Key::Named(NamedKey::Delete | NamedKey::Backspace) => Some(Action::RemoveHovered),
        Key::Character(text) => match text.to_ascii_lowercase().as_str() {
            "a" => Some(Action::AddPlayer),
            "m" => Some(Action::CycleMode),
            "n" => Some(Action::NextShader),
            "t" => Some(Action::ToggleTexture),
            "c" => Some(Action::CycleCursorColor),
            "b" => Some(Action::CycleBackground),
            "[" => Some(Action::FasterTicks),
            "]" => Some(Action::SlowerTicks),
            _ => None,
        },
        _ => None,
    }
}

/// The entry after `current` in `items`, wrapping; the first entry when `current` is absent.
pub fn next_after<'a, S: AsRef<str>>(items: &'a [S], current: &str) -> Option<&'a str> {
    if items.is_empty() {
        return None;
    }
    let next = items
        .iter()
        .position(|item| item.as_ref().eq_ignore_ascii_case(current))
        .map_or(0, |index| (index + 1) % items.len());
    Some(items[next].as_ref())
}

/// Halves or doubles the tick interval within sane bounds.
pub fn scaled_tick(current: Duration, faster: bool) -> Duration {
    let scaled = if faster { current / 2 } else { current * 2 };
    scaled.clamp(MIN_TICK, MAX_TICK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_and_letters_map_to_actions() {
        assert_eq!(
            action_for(&Key::Named(NamedKey::ArrowLeft)),
            Some(Action::Move(Direction::Left))
        );
        assert_eq!(
            action_for(&Key::Character("A".into())),
            Some(Action::AddPlayer)
        );
        assert_eq!(
            action_for(&Key::Named(NamedKey::Backspace)),
            Some(Action::RemoveHovered)
        );
        assert_eq!(action_for(&Key::Character("z".into())), None);
    }

    #[test]
    fn next_after_wraps_and_defaults_to_first() {
        let shaders = ["a.glsl", "b.glsl", "c.glsl"];
        assert_eq!(next_after(&shaders, "b.glsl"), Some("c.glsl"));
        assert_eq!(next_after(&shaders, "c.glsl"), Some("a.glsl"));
        assert_eq!(next_after(&shaders, "gone.glsl"), Some("a.glsl"));
        assert_eq!(next_after::<&str>(&[], "a.glsl"), None);
        assert_eq!(next_after(&CURSOR_COLORS, "#FF0000"), Some("#00ff00"));
    }

    #[test]
    fn tick_scaling_is_clamped() {
        assert_eq!(
            scaled_tick(Duration::from_millis(1000), true),
            Duration::from_millis(500)
        );
        assert_eq!(scaled_tick(Duration::from_millis(60), true), MIN_TICK);
        assert_eq!(scaled_tick(Duration::from_secs(8), false), MAX_TICK);
    }
}
