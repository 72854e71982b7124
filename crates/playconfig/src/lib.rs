use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

mod migrate;
mod store;

pub use migrate::{document_version, migrate};
pub use store::{ConfigStore, FileStore, MemoryStore};

/// Newest document version this crate reads and writes.
pub const CURRENT_VERSION: u32 = 3;

pub const DEFAULT_BACKGROUND_COLOR: &str = "#000000";
pub const DEFAULT_CURSOR_COLOR: &str = "#ff0000";
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_SHADER: &str = "debug_cursor_static.glsl";

/// Shaders a brand new configuration starts with.
pub const STARTER_SHADERS: [&str; 2] = ["cursor_blaze.glsl", DEFAULT_SHADER];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("unsupported config version {found}; newest supported is {CURRENT_VERSION}")]
    UnsupportedVersion { found: u64 },
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a player's cursor advances on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Walk the fixed preset cycle.
    #[default]
    Auto,
    /// No ticking; clicks place the cursor.
    Click,
    /// Jump to a random point.
    Rnd,
}

impl CursorMode {
    pub const ALL: [CursorMode; 3] = [CursorMode::Auto, CursorMode::Click, CursorMode::Rnd];

    pub fn as_str(self) -> &'static str {
        match self {
            CursorMode::Auto => "auto",
            CursorMode::Click => "click",
            CursorMode::Rnd => "rnd",
        }
    }

    pub fn next(self) -> Self {
        match self {
            CursorMode::Auto => CursorMode::Click,
            CursorMode::Click => CursorMode::Rnd,
            CursorMode::Rnd => CursorMode::Auto,
        }
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CursorMode::Auto),
            "click" => Ok(CursorMode::Click),
            "rnd" | "random" => Ok(CursorMode::Rnd),
            other => Err(ConfigError::Invalid(format!(
                "unknown cursor mode '{other}'; expected auto, click or rnd"
            ))),
        }
    }
}

/// Persisted settings of one player, keyed by a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDescriptor {
    pub id: String,
    pub shader: String,
    #[serde(default)]
    pub show_texture: bool,
}

impl PlayerDescriptor {
    /// A descriptor with a freshly generated id.
    pub fn new(shader: impl Into<String>) -> Self {
        Self::with_id(generate_id(), shader)
    }

    pub fn with_id(id: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shader: shader.into(),
            show_texture: false,
        }
    }
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub version: u32,
    #[serde(default)]
    pub players: Vec<PlayerDescriptor>,
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_cursor_color")]
    pub cursor_color: String,
    #[serde(
        default = "default_tick_interval",
        deserialize_with = "deserialize_tick_interval",
        serialize_with = "serialize_tick_interval"
    )]
    pub tick_interval: Duration,
    #[serde(default)]
    pub cursor_mode: CursorMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            players: Vec::new(),
            background_color: default_background_color(),
            cursor_color: default_cursor_color(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            cursor_mode: CursorMode::default(),
        }
    }
}

fn default_background_color() -> String {
    DEFAULT_BACKGROUND_COLOR.to_string()
}

fn default_cursor_color() -> String {
    DEFAULT_CURSOR_COLOR.to_string()
}

fn default_tick_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn serialize_tick_interval<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

/// Accepts milliseconds as a number or a human-readable string like `"1s"`.
fn deserialize_tick_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a tick interval as milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid tick interval '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("tick interval must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("tick interval must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v / 1000.0))
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// True for `#rrggbb`.
pub fn is_hex_color(raw: &str) -> bool {
    raw.len() == 7
        && raw.starts_with('#')
        && raw[1..].chars().all(|ch| ch.is_ascii_hexdigit())
}

impl Configuration {
    /// A fresh document with the starter players.
    pub fn starter() -> Self {
        Self {
            players: STARTER_SHADERS
                .iter()
                .map(|shader| PlayerDescriptor::new(*shader))
                .collect(),
            ..Self::default()
        }
    }

    /// Parses a document of any known version, migrating it forward.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_str(input)?;
        Self::from_json_value(raw)
    }

    pub fn from_json_value(raw: serde_json::Value) -> Result<Self, ConfigError> {
        let migrated = migrate(raw)?;
        let config: Configuration = serde_json::from_value(migrated)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn player(&self, id: &str) -> Option<&PlayerDescriptor> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut PlayerDescriptor> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn add_player(&mut self, descriptor: PlayerDescriptor) {
        match self.player_mut(&descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => self.players.push(descriptor),
        }
    }

    pub fn remove_player(&mut self, id: &str) -> Option<PlayerDescriptor> {
        let index = self.players.iter().position(|player| player.id == id)?;
        Some(self.players.remove(index))
    }

    /// Returns false when no player has `id`.
    pub fn set_shader(&mut self, id: &str, shader: &str) -> bool {
        match self.player_mut(id) {
            Some(player) => {
                player.shader = shader.to_string();
                true
            }
            None => false,
        }
    }

    pub fn set_show_texture(&mut self, id: &str, show: bool) -> bool {
        match self.player_mut(id) {
            Some(player) => {
                player.show_texture = show;
                true
            }
            None => false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CURRENT_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CURRENT_VERSION}",
                self.version
            )));
        }

        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tickInterval must be greater than zero".into(),
            ));
        }

        for (key, color) in [
            ("backgroundColor", &self.background_color),
            ("cursorColor", &self.cursor_color),
        ] {
            if !is_hex_color(color) {
                return Err(ConfigError::Invalid(format!(
                    "{key} '{color}' is not a #rrggbb color"
                )));
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for player in &self.players {
            if player.id.trim().is_empty() {
                return Err(ConfigError::Invalid("player id may not be empty".into()));
            }
            if !seen.insert(player.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "player id '{}' appears more than once",
                    player.id
                )));
            }
            if player.shader.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "player '{}' has an empty shader name",
                    player.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "version": 3,
        "players": [
            { "id": "p1", "shader": "cursor_smear.glsl", "showTexture": true },
            { "id": "p2", "shader": "debug_cursor_static.glsl" }
        ],
        "backgroundColor": "#101820",
        "cursorColor": "#fedf16",
        "tickInterval": "1500ms",
        "cursorMode": "rnd"
    }"##;

    #[test]
    fn parses_sample_config() {
        let config = Configuration::from_json_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.players.len(), 2);
        assert!(config.player("p1").unwrap().show_texture);
        assert!(!config.player("p2").unwrap().show_texture);
        assert_eq!(config.tick_interval, Duration::from_millis(1500));
        assert_eq!(config.cursor_mode, CursorMode::Rnd);
    }

    #[test]
    fn tick_interval_serializes_as_milliseconds() {
        let config = Configuration::from_json_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["tickInterval"], serde_json::json!(1500));

        let reparsed = Configuration::from_json_value(value).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn rejects_duplicate_player_ids() {
        let input = r##"{
            "version": 3,
            "players": [
                { "id": "same", "shader": "a.glsl" },
                { "id": "same", "shader": "b.glsl" }
            ]
        }"##;
        let err = Configuration::from_json_str(input).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_colors_and_zero_tick() {
        let bad_color = r##"{ "version": 3, "cursorColor": "red" }"##;
        assert!(matches!(
            Configuration::from_json_str(bad_color),
            Err(ConfigError::Invalid(_))
        ));

        let zero_tick = r##"{ "version": 3, "tickInterval": 0 }"##;
        assert!(matches!(
            Configuration::from_json_str(zero_tick),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn player_edits_are_keyed_by_id() {
        let mut config = Configuration::from_json_str(SAMPLE).unwrap();
        assert!(config.remove_player("p1").is_some());
        assert!(config.set_shader("p2", "cursor_blaze.glsl"));
        assert!(!config.set_shader("p1", "ghost.glsl"));
        assert_eq!(config.players.len(), 1);
        assert_eq!(config.player("p2").unwrap().shader, "cursor_blaze.glsl");
    }

    #[test]
    fn cursor_mode_cycles_and_parses() {
        assert_eq!(CursorMode::Auto.next().next().next(), CursorMode::Auto);
        assert_eq!("RND".parse::<CursorMode>().unwrap(), CursorMode::Rnd);
        assert!("sideways".parse::<CursorMode>().is_err());
    }

    #[test]
    fn starter_has_unique_ids() {
        let config = Configuration::starter();
        assert_eq!(config.players.len(), STARTER_SHADERS.len());
        assert_ne!(config.players[0].id, config.players[1].id);
        config.validate().unwrap();
    }
}
