use std::sync::LazyLock;

use regex::Regex;

static RE_PHONE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+?[\d\s-]+").unwrap());

static RE_NANP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?1?\s*\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}$").unwrap()
});

/// Fewer digits than this is a price, an age or a postcode, not a phone.
const MIN_PHONE_DIGITS: usize = 7;

/// Pull the first phone-looking run out of free text.
pub fn extract_phone(text: &str) -> Option<String> {
    RE_PHONE_RUN
        .find_iter(text)
        .map(|m| m.as_str().trim().trim_end_matches('-').trim())
        .find(|candidate| digit_count(candidate) >= MIN_PHONE_DIGITS)
        .map(str::to_string)
}

/// Normalize to E.164 (`+` and 8 to 15 digits).
///
/// Ten-digit national numbers get `default_country_code` prepended. Returns
/// `None` when the result is not a plausible E.164 number.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    let full = if trimmed.starts_with('+') {
        digits
    } else if digits.len() == 10 {
        format!("{default_country_code}{digits}")
    } else {
        digits
    };

    (8..=15).contains(&full.len()).then(|| format!("+{full}"))
}

/// Bucket key for exact phone matching: the E.164 form when there is one,
/// otherwise the `+`/digit form the profile id hashes. Identical numbers
/// always share a key even when they are too short for E.164.
pub fn phone_match_key(raw: &str, default_country_code: &str) -> Option<String> {
    normalize_phone(raw, default_country_code).or_else(|| {
        let canonical = crate::hashing::canonical_phone(raw);
        canonical.chars().any(|c| c.is_ascii_digit()).then_some(canonical)
    })
}

/// North American format plausibility (`(555) 123-4567`, `+1 555.123.4567`, ...).
pub fn is_nanp_format(raw: &str) -> bool {
    RE_NANP.is_match(raw.trim())
}

/// Longest country-code prefix of an E.164 number found in `known`.
pub fn country_code<'a>(e164: &str, known: &'a [String]) -> Option<&'a str> {
    let digits = e164.strip_prefix('+')?;
    known
        .iter()
        .filter(|cc| !cc.is_empty() && digits.starts_with(cc.as_str()))
        .max_by_key(|cc| cc.len())
        .map(String::as_str)
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(char::is_ascii_digit).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_phone_run() {
        assert_eq!(
            extract_phone("Call me: +1 555-123-4567 anytime").as_deref(),
            Some("+1 555-123-4567")
        );
    }

    #[test]
    fn skips_short_number_runs() {
        assert_eq!(
            extract_phone("Age 25, phone 555-123-4567").as_deref(),
            Some("555-123-4567")
        );
        assert_eq!(extract_phone("no digits here"), None);
    }

    #[test]
    fn normalizes_national_numbers() {
        assert_eq!(normalize_phone("(555) 123-4567", "1").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("+1 555 123 4567", "1").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("15551234567", "1").as_deref(), Some("+15551234567"));
    }

    #[test]
    fn rejects_implausible_lengths() {
        assert_eq!(normalize_phone("12345", "1"), None);
        assert_eq!(normalize_phone("+1234567890123456", "1"), None);
    }

    #[test]
    fn match_key_falls_back_to_digits() {
        assert_eq!(phone_match_key("(555) 123-4567", "1").as_deref(), Some("+15551234567"));
        assert_eq!(phone_match_key("555-1234", "1").as_deref(), Some("5551234"));
        assert_eq!(phone_match_key("call me", "1"), None);
    }

    #[test]
    fn nanp_format() {
        assert!(is_nanp_format("+1 (555) 123-4567"));
        assert!(is_nanp_format("555.123.4567"));
        assert!(!is_nanp_format("+44 20 7946 0958"));
    }

    #[test]
    fn country_code_prefers_longest_prefix() {
        let known = vec!["1".to_string(), "44".to_string(), "1268".to_string()];
        assert_eq!(country_code("+15551234567", &known), Some("1"));
        assert_eq!(country_code("+12685551234", &known), Some("1268"));
        assert_eq!(country_code("+33123456789", &known), None);
    }
}
