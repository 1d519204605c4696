// ABOUTME: Typed chat settings with the key=value line protocol parser
// ABOUTME: Maps the fixed model enumeration onto provider model identifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::{Deserialize, Serialize};

/// Default sampling temperature
const DEFAULT_TEMPERATURE: f32 = 0.1;

/// The fixed set of selectable base models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelChoice {
    /// GPT-4o
    #[default]
    Gpt4o,
    /// GPT-4.1
    Gpt41,
    /// GPT-4.1-nano
    Gpt41Nano,
    /// GPT-4.1 mini
    Gpt41Mini,
}

impl ModelChoice {
    /// User-facing label, the form accepted by the settings protocol
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gpt4o => "GPT-4o",
            Self::Gpt41 => "GPT-4.1",
            Self::Gpt41Nano => "GPT-4.1-nano",
            Self::Gpt41Mini => "GPT-4.1 mini",
        }
    }

    /// Provider-specific model identifier
    #[must_use]
    pub const fn api_model(self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt41 => "gpt-4.1-2025-04-14",
            Self::Gpt41Nano => "gpt-4.1-nano-2025-04-14",
            Self::Gpt41Mini => "gpt-4.1-mini-2025-04-14",
        }
    }

    /// Default temperature for this model variant
    #[must_use]
    pub const fn default_temperature(self) -> f32 {
        match self {
            Self::Gpt4o | Self::Gpt41 | Self::Gpt41Nano => 0.1,
            Self::Gpt41Mini => 0.2,
        }
    }

    /// Parse a model label case-insensitively
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gpt-4o" => Some(Self::Gpt4o),
            "gpt-4.1" => Some(Self::Gpt41),
            "gpt-4.1-nano" => Some(Self::Gpt41Nano),
            "gpt-4.1 mini" | "gpt-4.1-mini" => Some(Self::Gpt41Mini),
            _ => None,
        }
    }

    /// All selectable models in display order
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Gpt4o, Self::Gpt41, Self::Gpt41Nano, Self::Gpt41Mini]
    }
}

/// Per-session chat settings with documented defaults.
///
/// Defaults: `GPT-4o`, temperature 0.1, warehouse capability enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Selected base model
    pub model: ModelChoice,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,
    /// Whether the warehouse toolset should be provisioned
    pub enable_warehouse: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: ModelChoice::default(),
            temperature: DEFAULT_TEMPERATURE,
            enable_warehouse: true,
        }
    }
}

impl ChatSettings {
    /// Parse a settings line of the form `key=value, key=value, ...`.
    ///
    /// Recognized keys: `model`, `temperature`, `enable_warehouse` (with
    /// `enable_snowflake` accepted as a legacy alias). Unparseable
    /// segments and unknown keys are ignored; fully malformed input yields
    /// the defaults.
    #[must_use]
    pub fn parse_line(line: &str) -> Self {
        let mut settings = Self::default();

        for segment in line.split(',') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "model" => {
                    if let Some(model) = ModelChoice::parse(value) {
                        settings.model = model;
                    }
                }
                "temperature" => {
                    if let Ok(temperature) = value.parse::<f32>() {
                        settings.temperature = temperature.clamp(0.0, 1.0);
                    }
                }
                "enable_warehouse" | "enable_snowflake" => {
                    settings.enable_warehouse =
                        matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
                }
                _ => {}
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let settings =
            ChatSettings::parse_line("model=GPT-4.1, temperature=0.3, enable_warehouse=true");
        assert_eq!(settings.model, ModelChoice::Gpt41);
        assert!((settings.temperature - 0.3).abs() < f32::EPSILON);
        assert!(settings.enable_warehouse);
    }

    #[test]
    fn test_parse_legacy_alias() {
        let settings = ChatSettings::parse_line("enable_snowflake=false");
        assert!(!settings.enable_warehouse);
    }

    #[test]
    fn test_malformed_input_falls_back_to_defaults() {
        let settings = ChatSettings::parse_line("garbage input");
        assert_eq!(settings, ChatSettings::default());
        assert_eq!(settings.model, ModelChoice::Gpt4o);
        assert!((settings.temperature - 0.1).abs() < f32::EPSILON);
        assert!(settings.enable_warehouse);
    }

    #[test]
    fn test_unknown_keys_and_bad_segments_ignored() {
        let settings =
            ChatSettings::parse_line("colour=blue, model=GPT-4.1-nano, nonsense, temperature=oops");
        assert_eq!(settings.model, ModelChoice::Gpt41Nano);
        assert!((settings.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_temperature_clamped_to_unit_range() {
        let settings = ChatSettings::parse_line("temperature=7.5");
        assert!((settings.temperature - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_model_parse_case_insensitive() {
        assert_eq!(ModelChoice::parse("gpt-4.1 MINI"), Some(ModelChoice::Gpt41Mini));
        assert_eq!(ModelChoice::parse("unknown-model"), None);
    }
}
