//! User preferences kept as one JSON value per key.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::settings::AppSettings;
use std::collections::HashMap;

use crate::db::Database;

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_MODEL: &str = "model";
pub const KEY_MAX_TOKENS: &str = "maxTokens";
pub const KEY_TEMPERATURE: &str = "temperature";
pub const KEY_STREAM: &str = "streamResponses";
pub const KEY_TYPEWRITER_DELAY: &str = "typewriterDelayMs";
pub const KEY_USER_NAME: &str = "userName";
pub const KEY_SEPARATOR: &str = "triggerSeparator";
pub const KEY_SYMBOL_START: &str = "triggerSymbolStart";
pub const KEY_SYMBOL_END: &str = "triggerSymbolEnd";
pub const KEY_AUDIO_ENABLED: &str = "audioEnabled";
pub const KEY_AUDIO_VOLUME: &str = "audioVolume";

#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn all_raw(&self) -> Result<HashMap<String, String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (key, value): (String, String) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Snapshot of all preferences. Missing or unreadable keys use defaults.
    pub fn get_settings(&self) -> Result<AppSettings> {
        let raw = self.all_raw()?;
        let mut s = AppSettings::default();

        if let Some(v) = parse::<Option<String>>(&raw, KEY_API_KEY) {
            s.api_key = v.filter(|k| !k.trim().is_empty());
        }
        if let Some(v) = parse::<String>(&raw, KEY_MODEL) {
            if !v.trim().is_empty() {
                s.model = v;
            }
        }
        if let Some(v) = parse(&raw, KEY_MAX_TOKENS) {
            s.max_tokens = v;
        }
        if let Some(v) = parse(&raw, KEY_TEMPERATURE) {
            s.temperature = v;
        }
        if let Some(v) = parse(&raw, KEY_STREAM) {
            s.stream_responses = v;
        }
        if let Some(v) = parse(&raw, KEY_TYPEWRITER_DELAY) {
            s.typewriter_delay_ms = v;
        }
        if let Some(v) = parse(&raw, KEY_USER_NAME) {
            s.user_name = v;
        }
        if let Some(v) = parse::<String>(&raw, KEY_SEPARATOR) {
            if !v.is_empty() {
                s.triggers.separator = v;
            }
        }
        if let Some(v) = parse(&raw, KEY_SYMBOL_START) {
            s.triggers.symbol_start = v;
        }
        if let Some(v) = parse(&raw, KEY_SYMBOL_END) {
            s.triggers.symbol_end = v;
        }
        if let Some(v) = parse(&raw, KEY_AUDIO_ENABLED) {
            s.audio.enabled = v;
        }
        if let Some(v) = parse::<f32>(&raw, KEY_AUDIO_VOLUME) {
            s.audio.volume = v.clamp(0.0, 1.0);
        }

        Ok(s)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let entries: Vec<(&str, String)> = vec![
            (KEY_API_KEY, to_json(&settings.api_key)?),
            (KEY_MODEL, to_json(&settings.model)?),
            (KEY_MAX_TOKENS, to_json(&settings.max_tokens)?),
            (KEY_TEMPERATURE, to_json(&settings.temperature)?),
            (KEY_STREAM, to_json(&settings.stream_responses)?),
            (KEY_TYPEWRITER_DELAY, to_json(&settings.typewriter_delay_ms)?),
            (KEY_USER_NAME, to_json(&settings.user_name)?),
            (KEY_SEPARATOR, to_json(&settings.triggers.separator)?),
            (KEY_SYMBOL_START, to_json(&settings.triggers.symbol_start)?),
            (KEY_SYMBOL_END, to_json(&settings.triggers.symbol_end)?),
            (KEY_AUDIO_ENABLED, to_json(&settings.audio.enabled)?),
            (KEY_AUDIO_VOLUME, to_json(&settings.audio.volume.clamp(0.0, 1.0))?),
        ];

        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        tracing::debug!("Settings saved");
        Ok(())
    }

    /// Drop every stored preference and return the defaults
    pub fn reset(&self) -> Result<AppSettings> {
        self.db.lock().execute("DELETE FROM settings", [])?;
        Ok(AppSettings::default())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn parse<T: DeserializeOwned>(raw: &HashMap<String, String>, key: &str) -> Option<T> {
    let value = raw.get(key)?;
    match serde_json::from_str(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Ignoring unreadable setting {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        SettingsStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_empty_store_gives_defaults() {
        assert_eq!(store().get_settings().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let store = store();
        let mut settings = AppSettings::default();
        settings.model = "gemini-1.5-pro".into();
        settings.max_tokens = 2048;
        settings.triggers.separator = "###".into();
        settings.triggers.symbol_start = "{".into();
        settings.triggers.symbol_end = "}".into();
        settings.audio.enabled = false;
        settings.audio.volume = 0.25;
        settings.api_key = Some("abc".into());

        store.save_settings(&settings).unwrap();
        assert_eq!(store.get_settings().unwrap(), settings);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let store = store();
        store.set_raw(KEY_MAX_TOKENS, "\"lots\"").unwrap();
        store.set_raw(KEY_AUDIO_VOLUME, "4.5").unwrap();
        store.set_raw(KEY_SEPARATOR, "\"\"").unwrap();

        let settings = store.get_settings().unwrap();
        assert_eq!(settings.max_tokens, AppSettings::default().max_tokens);
        assert_eq!(settings.audio.volume, 1.0);
        assert_eq!(settings.triggers.separator, "---");
    }

    #[test]
    fn test_raw_overwrite_and_reset() {
        let store = store();
        store.set_raw("theme", "\"dark\"").unwrap();
        store.set_raw("theme", "\"light\"").unwrap();
        assert_eq!(store.get_raw("theme").unwrap().as_deref(), Some("\"light\""));

        store.reset().unwrap();
        assert!(store.get_raw("theme").unwrap().is_none());
    }
}
