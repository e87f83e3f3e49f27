//! Channel selectors.

use std::fmt;

use regex::Regex;

use crate::RegistryError;

/// Selects the channels a subscription receives.
///
/// A regex pattern must match the *whole* channel name: `SENSOR_.*`
/// matches `SENSOR_TEMP` but not `MY_SENSOR_TEMP`.
#[derive(Debug, Clone)]
pub enum ChannelPattern {
    /// Byte-for-byte equality.
    Exact(String),
    /// Full-match regular expression.
    Regex(Regex),
}

impl ChannelPattern {
    /// Compiles `pattern` as a full-match regular expression.
    pub fn regex(pattern: &str) -> Result<Self, RegistryError> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Regex)
            .map_err(|source| RegistryError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn exact(channel: impl Into<String>) -> Self {
        Self::Exact(channel.into())
    }

    pub fn matches(&self, channel: &str) -> bool {
        match self {
            Self::Exact(name) => name == channel,
            Self::Regex(re) => re.is_match(channel),
        }
    }
}

impl From<&str> for ChannelPattern {
    fn from(channel: &str) -> Self {
        Self::Exact(channel.to_string())
    }
}

impl From<String> for ChannelPattern {
    fn from(channel: String) -> Self {
        Self::Exact(channel)
    }
}

impl From<Regex> for ChannelPattern {
    /// Wraps an already compiled regex as-is, without adding anchors.
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl fmt::Display for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matches_only_identical_name() {
        let pattern = ChannelPattern::from("SENSOR_TEMP");
        assert!(pattern.matches("SENSOR_TEMP"));
        assert!(!pattern.matches("SENSOR_TEMP2"));
        assert!(!pattern.matches("sensor_temp"));
    }

    #[test]
    fn test_regex_requires_full_match() {
        let pattern = ChannelPattern::regex("SENSOR_.*").unwrap();
        assert!(pattern.matches("SENSOR_TEMP"));
        assert!(pattern.matches("SENSOR_"));
        assert!(!pattern.matches("MY_SENSOR_TEMP"));
    }

    #[test]
    fn test_regex_alternation_is_anchored_as_a_whole() {
        let pattern = ChannelPattern::regex("A|B").unwrap();
        assert!(pattern.matches("A"));
        assert!(pattern.matches("B"));
        assert!(!pattern.matches("AB"));
        assert!(!pattern.matches("XA"));
    }

    #[test]
    fn test_regex_invalid_reports_pattern() {
        let err = ChannelPattern::regex("SENSOR_(").unwrap_err();
        let RegistryError::InvalidPattern { pattern, .. } = err;
        assert_eq!(pattern, "SENSOR_(");
    }

    #[test]
    fn test_display_distinguishes_kinds() {
        assert_eq!(ChannelPattern::exact("X").to_string(), "X");
        assert_eq!(
            ChannelPattern::regex("X.*").unwrap().to_string(),
            "/^(?:X.*)$/"
        );
    }
}
