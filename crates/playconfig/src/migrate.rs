//! Upgrades older configuration documents one version at a time.
//!
//! | from | to | change                                                       |
//! |------|----|--------------------------------------------------------------|
//! | 1    | 2  | `canvas: [shader]` becomes `players` with generated ids      |
//! | 2    | 3  | colors normalised to `#rrggbb`, defaults filled, extras dropped |
//!
//! A document without `version` is treated as version 1. Each step bumps the
//! version, so re-running the chain on its own output changes nothing.

use serde_json::{json, Map, Value};

use crate::{
    generate_id, is_hex_color, ConfigError, CURRENT_VERSION, DEFAULT_BACKGROUND_COLOR,
    DEFAULT_CURSOR_COLOR, DEFAULT_TICK_INTERVAL,
};

const V3_KEYS: [&str; 6] = [
    "players",
    "backgroundColor",
    "cursorColor",
    "tickInterval",
    "cursorMode",
    "version",
];

pub fn document_version(document: &Value) -> Result<u64, ConfigError> {
    match document.get("version") {
        None | Some(Value::Null) => Ok(1),
        Some(Value::Number(number)) => number.as_u64().ok_or_else(|| {
            ConfigError::Invalid(format!("version '{number}' is not a positive integer"))
        }),
        Some(other) => Err(ConfigError::Invalid(format!(
            "version must be a number, found {other}"
        ))),
    }
}

/// Runs every step needed to bring `document` to [`CURRENT_VERSION`].
pub fn migrate(mut document: Value) -> Result<Value, ConfigError> {
    if !document.is_object() {
        return Err(ConfigError::Invalid(
            "configuration must be a JSON object".into(),
        ));
    }
    loop {
        let version = document_version(&document)?;
        document = match version {
            1 => v1_to_v2(document),
            2 => v2_to_v3(document),
            v if v == u64::from(CURRENT_VERSION) => return Ok(document),
            found => return Err(ConfigError::UnsupportedVersion { found }),
        };
        tracing::debug!(from = version, to = version + 1, "migrated configuration");
    }
}

fn v1_to_v2(document: Value) -> Value {
    let mut object = into_object(document);
    let players: Vec<Value> = match object.remove("canvas") {
        Some(Value::Array(shaders)) => shaders
            .into_iter()
            .filter_map(|shader| match shader {
                Value::String(name) => Some(name),
                _ => None,
            })
            .map(|shader| json!({ "id": generate_id(), "shader": shader, "showTexture": false }))
            .collect(),
        _ => Vec::new(),
    };
    object.insert("players".into(), Value::Array(players));
    object.insert("version".into(), json!(2));
    Value::Object(object)
}

fn v2_to_v3(document: Value) -> Value {
    let mut object = into_object(document);
    object.retain(|key, _| V3_KEYS.contains(&key.as_str()));

    for (key, fallback) in [
        ("cursorColor", DEFAULT_CURSOR_COLOR),
        ("backgroundColor", DEFAULT_BACKGROUND_COLOR),
    ] {
        let color = object
            .get(key)
            .and_then(color_to_hex)
            .unwrap_or_else(|| fallback.to_string());
        object.insert(key.into(), Value::String(color));
    }
    object
        .entry("tickInterval")
        .or_insert_with(|| json!(DEFAULT_TICK_INTERVAL.as_millis() as u64));
    object.entry("cursorMode").or_insert_with(|| json!("auto"));
    object.entry("players").or_insert_with(|| json!([]));
    object.insert("version".into(), json!(3));
    Value::Object(object)
}

fn into_object(document: Value) -> Map<String, Value> {
    match document {
        Value::Object(object) => object,
        _ => Map::new(),
    }
}

/// Accepts `#rrggbb` strings or normalised `[r, g, b, a?]` float arrays.
fn color_to_hex(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if is_hex_color(raw) => Some(raw.clone()),
        Value::Array(components) if components.len() >= 3 => {
            let mut hex = String::from("#");
            for component in &components[..3] {
                let channel = component.as_f64()?.clamp(0.0, 1.0);
                hex.push_str(&format!("{:02x}", (channel * 255.0).round() as u8));
            }
            Some(hex)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configuration;

    #[test]
    fn v1_canvas_list_becomes_players() {
        let migrated = migrate(json!({ "canvas": ["a.glsl", "b.glsl"] })).unwrap();
        let config = Configuration::from_json_value(migrated).unwrap();

        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.players.len(), 2);
        assert_eq!(config.players[0].shader, "a.glsl");
        assert_eq!(config.players[1].shader, "b.glsl");
        assert!(config.players.iter().all(|player| !player.show_texture));
        assert!(config.players.iter().all(|player| !player.id.is_empty()));
        assert_ne!(config.players[0].id, config.players[1].id);
    }

    #[test]
    fn v1_float_color_and_stray_keys_are_normalised() {
        let migrated = migrate(json!({
            "version": 1,
            "canvas": ["cursor_blaze.glsl"],
            "cursorColor": [1, 0, 0, 1],
            "magia": [1]
        }))
        .unwrap();

        assert_eq!(migrated["cursorColor"], json!("#ff0000"));
        assert_eq!(migrated["backgroundColor"], json!("#000000"));
        assert_eq!(migrated["tickInterval"], json!(1000));
        assert_eq!(migrated["cursorMode"], json!("auto"));
        assert!(migrated.get("magia").is_none());
        assert!(migrated.get("canvas").is_none());
    }

    #[test]
    fn chain_is_idempotent() {
        let once = migrate(json!({ "canvas": ["a.glsl"], "cursorColor": "#fedf16" })).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn newer_versions_are_rejected() {
        let err = migrate(json!({ "version": 9 })).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 9 }));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(matches!(
            migrate(json!(["a.glsl"])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            migrate(json!({ "version": "two" })),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn v2_keeps_existing_settings() {
        let migrated = migrate(json!({
            "version": 2,
            "players": [{ "id": "p1", "shader": "x.glsl", "showTexture": true }],
            "tickInterval": "2s",
            "cursorMode": "click"
        }))
        .unwrap();
        let config = Configuration::from_json_value(migrated).unwrap();
        assert_eq!(config.player("p1").map(|p| p.show_texture), Some(true));
        assert_eq!(config.tick_interval, std::time::Duration::from_secs(2));
        assert_eq!(config.cursor_mode, crate::CursorMode::Click);
    }

    #[test]
    fn unparseable_color_strings_fall_back_to_defaults() {
        let migrated = migrate(json!({
            "version": 2,
            "players": [],
            "cursorColor": "red",
            "backgroundColor": "#fff"
        }))
        .unwrap();
        assert_eq!(migrated["cursorColor"], json!(DEFAULT_CURSOR_COLOR));
        assert_eq!(migrated["backgroundColor"], json!(DEFAULT_BACKGROUND_COLOR));

        let config = Configuration::from_json_value(migrated).unwrap();
        assert_eq!(config.cursor_color, DEFAULT_CURSOR_COLOR);
    }
}
