//! Fixed patterns behind the format rules, each compiled once per process.

use once_cell::sync::Lazy;
use regex::Regex;

pub(super) static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex should be valid")
});

pub(super) static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(https?|ftp)://[^\s/$.?#][^\s]*$").expect("URL regex should be valid")
});

pub(super) static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("UUID regex should be valid")
});

/// `YYYY-MM-DD`, optionally followed by `THH:MM[:SS[.fff]]` and a `Z` or `±HH:MM` zone.
pub(super) static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])([T ]([01]\d|2[0-3]):[0-5]\d(:[0-5]\d(\.\d+)?)?(Z|[+-]([01]\d|2[0-3]):?[0-5]\d)?)?$",
    )
    .expect("ISO date regex should be valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email() {
        assert!(EMAIL.is_match("ada@example.com"));
        assert!(!EMAIL.is_match("ada@example"));
        assert!(!EMAIL.is_match("ada example@x.io"));
    }

    #[test]
    fn url() {
        assert!(URL.is_match("https://example.com/a?b=c"));
        assert!(URL.is_match("HTTP://example.com"));
        assert!(!URL.is_match("example.com"));
        assert!(!URL.is_match("https:// spaced.com"));
    }

    #[test]
    fn uuid() {
        assert!(UUID.is_match("123e4567-e89b-12d3-a456-426614174000"));
        assert!(UUID.is_match("123E4567-E89B-12D3-A456-426614174000"));
        assert!(!UUID.is_match("123e4567e89b12d3a456426614174000"));
    }

    #[test]
    fn iso_date() {
        assert!(ISO_DATE.is_match("2024-02-29"));
        assert!(ISO_DATE.is_match("2024-02-29T13:45:00Z"));
        assert!(ISO_DATE.is_match("2024-02-29T13:45:00.123+02:00"));
        assert!(!ISO_DATE.is_match("2024-13-01"));
        assert!(!ISO_DATE.is_match("yesterday"));
    }
}
