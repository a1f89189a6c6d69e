//! Property-Based Tests for operate
//!
//! Uses proptest for testing invariants and edge cases:
//! - Console threshold formula for every verbosity
//! - Quoted words survive command splitting unchanged
//! - Settings loading never invents values for absent keys

use operate::logging::console_threshold;
use operate::runner::{quote, split_command};
use operate::{OperatorSettings, Severity};
use proptest::prelude::*;

// =============================================================================
// Logger Threshold Property Tests
// =============================================================================

proptest! {
    /// threshold = 40 - min(3, v) * 10
    #[test]
    fn console_threshold_formula(v in any::<u8>()) {
        let expected = 40 - u32::from(v.min(3)) * 10;
        prop_assert_eq!(u32::from(console_threshold(Some(v)).value()), expected);
    }

    /// More verbosity never hides messages that less verbosity showed
    #[test]
    fn console_threshold_is_monotonic(a in any::<u8>(), b in any::<u8>()) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(console_threshold(Some(high)) <= console_threshold(Some(low)));
    }
}

#[test]
fn console_threshold_without_verbosity_is_error() {
    assert_eq!(console_threshold(None), Severity::Error);
}

// =============================================================================
// Command Splitting Property Tests
// =============================================================================

proptest! {
    /// Any quoted argument comes back as exactly one word
    #[test]
    fn quoted_words_round_trip(words in prop::collection::vec("[ -~]{0,16}", 1..6)) {
        let mut command = String::from("cmd");
        for word in &words {
            command.push(' ');
            command.push_str(&quote(word).unwrap());
        }

        let argv = split_command(&command).unwrap();
        prop_assert_eq!(argv.len(), words.len() + 1);
        prop_assert_eq!(&argv[1..], &words[..]);
    }
}

// =============================================================================
// Settings Property Tests
// =============================================================================

proptest! {
    /// A document with only an image leaves everything else empty
    #[test]
    fn image_only_document(image in "[a-z][a-z0-9./-]{0,30}") {
        let settings = OperatorSettings::parse(&format!("image: \"{}\"\n", image)).unwrap();
        prop_assert_eq!(settings.image.as_deref(), Some(image.as_str()));
        prop_assert!(settings.version.is_none());
        prop_assert!(settings.channels.is_empty());
        prop_assert!(settings.kinds.is_empty());
        prop_assert!(settings.default_sample.is_none());
        prop_assert!(settings.domain.is_none());
        prop_assert!(settings.group.is_none());
        prop_assert!(settings.api_version.is_none());
        prop_assert!(!settings.is_initialized());
    }

    /// Kind order is preserved exactly
    #[test]
    fn kinds_keep_their_order(kinds in prop::collection::vec("[A-Z][a-zA-Z0-9]{0,12}", 0..8)) {
        let mut document = String::from("kinds:\n");
        for kind in &kinds {
            document.push_str(&format!("  - \"{}\"\n", kind));
        }
        if kinds.is_empty() {
            document = String::from("kinds: []\n");
        }

        let settings = OperatorSettings::parse(&document).unwrap();
        prop_assert_eq!(settings.kinds, kinds);
    }
}
