//! Caller-number normalization shared by the telephony handlers and the
//! member lookup. All comparisons against stored numbers go through these
//! helpers so `+1 (555) 010-1234`, `15550101234` and `5550101234` match the
//! same member row.

/// Strip everything but ASCII digits, then drop a leading US country code.
/// `+15550101234` and `5550101234` both normalize to `5550101234`.
pub fn normalize_digits(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

/// Last 10 digits of the number, used as the trial-record and call-log
/// fallback key. Shorter inputs are returned whole.
pub fn last_ten_digits(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_country_code() {
        assert_eq!(normalize_digits("+1 (555) 010-1234"), "5550101234");
        assert_eq!(normalize_digits("15550101234"), "5550101234");
        assert_eq!(normalize_digits("5550101234"), "5550101234");
    }

    #[test]
    fn keeps_non_us_lengths_intact() {
        assert_eq!(normalize_digits("+442071234567"), "442071234567");
        assert_eq!(normalize_digits("911"), "911");
    }

    #[test]
    fn last_ten_takes_the_suffix() {
        assert_eq!(last_ten_digits("+15550101234"), "5550101234");
        assert_eq!(last_ten_digits("442071234567"), "2071234567");
        assert_eq!(last_ten_digits("12345"), "12345");
        assert_eq!(last_ten_digits(""), "");
    }
}
