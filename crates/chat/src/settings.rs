/// Default model offered to new sessions.
pub const DEFAULT_MODEL: &str = "mistral-small-latest";

const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=1.0;

/// Per-session chat settings.
///
/// Only range clamping happens here; anything richer is the settings UI's
/// responsibility. `dark_mode` is display-only and never reaches the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub dark_mode: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            dark_mode: false,
        }
    }
}

impl ChatSettings {
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end());
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens.max(1);
    }

    pub fn toggle_dark_mode(&mut self) {
        self.dark_mode = !self.dark_mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_session_bootstrap() {
        let settings = ChatSettings::default();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 4096);
        assert!(!settings.dark_mode);
    }

    #[test]
    fn temperature_clamps_to_unit_range() {
        let mut settings = ChatSettings::default();
        settings.set_temperature(1.7);
        assert_eq!(settings.temperature, 1.0);
        settings.set_temperature(-0.3);
        assert_eq!(settings.temperature, 0.0);
    }

    #[test]
    fn max_tokens_stays_positive() {
        let mut settings = ChatSettings::default();
        settings.set_max_tokens(0);
        assert_eq!(settings.max_tokens, 1);
    }
}
