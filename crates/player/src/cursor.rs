//! Simulated cursor state fed to shaders as uniforms.

use std::fmt;
use std::str::FromStr;

pub const CURRENT_CURSOR_UNIFORM: &str = "iCurrentCursor";
pub const PREVIOUS_CURSOR_UNIFORM: &str = "iPreviousCursor";
pub const CURSOR_COLOR_UNIFORM: &str = "iCurrentCursorColor";
pub const CURSOR_CHANGE_TIME_UNIFORM: &str = "iTimeCursorChange";

/// Horizontal distance of one keyboard step.
pub const CELL_STEP_X: f32 = 10.0;
/// Vertical distance of one keyboard step.
pub const CELL_STEP_Y: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Parses `#rrggbb` into normalized RGBA with alpha 1.
///
/// Malformed channels come back as `NaN`; validate with
/// [`playconfig::is_hex_color`] before calling when that matters.
pub fn hex_to_rgb_normalized(hex: &str) -> [f32; 4] {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    let channel = |index: usize| {
        digits
            .get(index * 2..index * 2 + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .map(|byte| f32::from(byte) / 255.0)
            .unwrap_or(f32::NAN)
    };
    [channel(0), channel(1), channel(2), 1.0]
}

/// Position, size and color of the simulated cursor.
///
/// Y grows upward, matching `gl_FragCoord`.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorModel {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    color: [f32; 4],
}

impl Default for CursorModel {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 20.0,
            color: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

impl CursorModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves one cell in `direction`.
    pub fn step(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.y += CELL_STEP_Y,
            Direction::Down => self.y -= CELL_STEP_Y,
            Direction::Left => self.x -= CELL_STEP_X,
            Direction::Right => self.x += CELL_STEP_X,
        }
    }

    /// Overwrites only the coordinates that are given.
    pub fn set_position(&mut self, x: Option<f32>, y: Option<f32>) {
        if let Some(x) = x {
            self.x = x;
        }
        if let Some(y) = y {
            self.y = y;
        }
    }

    pub fn set_size(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_color(&mut self, hex: &str) -> [f32; 4] {
        self.color = hex_to_rgb_normalized(hex);
        self.color
    }

    pub fn set_rgba(&mut self, color: [f32; 4]) {
        self.color = color;
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    /// `(x, y, width, height)` as uploaded to `iCurrentCursor`.
    pub fn uniform_data(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}
