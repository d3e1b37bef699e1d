/*
 * @file config.rs
 * @brief Runtime configuration for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Runtime configuration loaded from `jasp.json`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::chat::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use crate::conversation::{Personalities, PersonalityKind, DEFAULT_WINDOW};
use crate::device::{DEFAULT_BAUD, DEFAULT_PORT_KEYWORDS};
use crate::error::Result;
use crate::retrieval::DEFAULT_SEARCH_URL;

/// Path to the JSON configuration file that holds runtime defaults.
pub const DEFAULT_CONFIG_PATH: &str = "jasp.json";

/// Strongly typed representation of `jasp.json`.
///
/// # Details
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Explicit serial port; discovery is used when absent.
    pub serial_port: Option<String>,
    pub serial_baud: u32,
    /// Wait after opening the port before the board accepts input.
    pub serial_settle_ms: u64,
    /// How long the sensor handler waits for a reading.
    pub sensor_timeout_ms: u64,
    /// Descriptor fragments used by port discovery.
    pub port_keywords: Vec<String>,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// History entries sent with each completion request.
    pub history_window: usize,
    /// Personality active at startup.
    pub personality: PersonalityKind,
    pub prompts: Personalities,
    /// Spoken before chat answers while the formal personality is active.
    pub serious_prefix: String,
    /// Augment time-sensitive questions with a web lookup.
    pub web_search: bool,
    pub search_url: String,
    /// Overrides the platform speech program.
    pub tts_program: Option<String>,
    pub tts_args: Vec<String>,
    /// Whisper GGML model used by the microphone listener.
    pub whisper_model: String,
    /// Extra device rules, matched after the built-in commands.
    pub custom_commands: Vec<CustomCommand>,
}

/// A user-defined utterance → device command rule.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CustomCommand {
    /// Regular expression searched in the lower-cased utterance.
    pub pattern: String,
    /// Command name sent to the board.
    pub cmd: String,
    /// Command argument; `null` when omitted.
    #[serde(default)]
    pub value: Value,
    /// Confirmation spoken after the frame is sent.
    pub reply: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            serial_baud: DEFAULT_BAUD,
            serial_settle_ms: 2000,
            sensor_timeout_ms: 1000,
            port_keywords: DEFAULT_PORT_KEYWORDS.iter().map(ToString::to_string).collect(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            request_timeout_secs: 120,
            history_window: DEFAULT_WINDOW,
            personality: PersonalityKind::Normal,
            prompts: Personalities::default(),
            serious_prefix: "Certo.".to_string(),
            web_search: true,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            tts_program: None,
            tts_args: Vec::new(),
            whisper_model: "models/ggml-base.bin".to_string(),
            custom_commands: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration, falling back to defaults when the file is missing or invalid.
    ///
    /// # Arguments
    /// * `path` - Location of the JSON file.
    ///
    /// # Returns
    /// * `AppConfig` - The loaded or default configuration.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "config load error, using defaults");
                Self::default()
            }
        }
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.serial_settle_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config.serial_baud, 9600);
        assert_eq!(config.ollama_model, "mistral");
        assert_eq!(config.history_window, 6);
        assert_eq!(config.personality, PersonalityKind::Normal);
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jasp.json");
        fs::write(
            &path,
            r#"{ "serial_port": "/dev/ttyACM0", "personality": "formal", "prompts": { "formal": "Seja breve." } }"#,
        )
        .expect("write");

        let config = AppConfig::load(&path);
        assert_eq!(config.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.personality, PersonalityKind::Formal);
        assert_eq!(config.prompts.formal, "Seja breve.");
        assert_eq!(config.prompts.normal, Personalities::default().normal);
        assert_eq!(config.serial_baud, 9600);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jasp.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(AppConfig::from_file(&path).is_err());
        assert_eq!(AppConfig::load(&path).ollama_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn custom_commands_parse_with_optional_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jasp.json");
        fs::write(
            &path,
            r#"{ "custom_commands": [
                { "pattern": "liga.*ventilador", "cmd": "fan_on", "value": 5, "reply": "Ventilador ligado." },
                { "pattern": "buzina", "cmd": "beep", "reply": "Bip." }
            ] }"#,
        )
        .expect("write");

        let config = AppConfig::load(&path);
        assert_eq!(config.custom_commands.len(), 2);
        assert_eq!(config.custom_commands[0].value, json!(5));
        assert_eq!(config.custom_commands[1].value, Value::Null);
    }
}
