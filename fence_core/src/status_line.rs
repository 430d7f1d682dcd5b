use std::sync::LazyLock;

use regex::Regex;

use crate::state::PowerState;

/// Firmware status line pattern.
///
/// One capture group: everything after the first `[` up to the end of the
/// line. The line terminator is required so a partially received line is
/// never classified. The pattern has no letters; case is handled by
/// `classify_token`.
pub const STATUS_PATTERN: &str = r"\[([^\r\n]*)\r?\n";

pub static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_PATTERN).expect("status pattern compiles"));

/// Classify a captured status token.
///
/// Anything that does not start with `on` is `off`, garbage included.
#[inline]
pub fn classify_token(token: &str) -> PowerState {
    if token.to_lowercase().starts_with("on") {
        PowerState::On
    } else {
        PowerState::Off
    }
}

/// Pull the status token out of a chunk of session output, if a complete
/// status line is present.
pub fn extract_token(output: &str) -> Option<&str> {
    STATUS_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_after_bracket() {
        let out = "node 0 [ON, redundant] healthy\r\nnC-RBTP:>";
        assert_eq!(extract_token(out), Some("ON, redundant] healthy"));
    }

    #[test]
    fn pattern_and_token_case() {
        let token = extract_token("node 0 [on, standby]\n").unwrap();
        assert_eq!(token, "on, standby]");
        assert_eq!(classify_token(token), PowerState::On);
        assert_eq!(classify_token(extract_token("node 0 [ON]\r\n").unwrap()), PowerState::On);
    }

    #[test]
    fn partial_line_is_not_a_match() {
        assert_eq!(extract_token("node 0 [O"), None);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_token("On"), PowerState::On);
        assert_eq!(classify_token("oN, degraded]"), PowerState::On);
        assert_eq!(classify_token("OFF]"), PowerState::Off);
        assert_eq!(classify_token("standby]"), PowerState::Off);
        assert_eq!(classify_token(""), PowerState::Off);
        assert_eq!(classify_token("#$%garbled"), PowerState::Off);
    }
}
