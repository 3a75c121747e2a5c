//! Subscriber phone number normalization

use crate::error::PaymentError;

/// Normalize a user-supplied phone number to international MSISDN form.
///
/// Strips every non-digit character, then resolves the country prefix:
/// a leading `0` is replaced with the country code, a number already
/// carrying the country code is kept as-is, and a bare subscriber
/// number gets the code prepended.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String, PaymentError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 9 {
        return Err(PaymentError::validation(
            "Phone number is too short",
            Some("phone_number"),
        ));
    }

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", country_code, rest)
    } else if digits.starts_with(country_code) {
        digits
    } else {
        format!("{}{}", country_code, digits)
    };

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_format_with_leading_zero() {
        assert_eq!(
            normalize_phone("0712345678", "254").unwrap(),
            "254712345678"
        );
    }

    #[test]
    fn test_already_international() {
        assert_eq!(
            normalize_phone("254712345678", "254").unwrap(),
            "254712345678"
        );
    }

    #[test]
    fn test_formatted_input() {
        assert_eq!(
            normalize_phone("+254 712-345-678", "254").unwrap(),
            "254712345678"
        );
    }

    #[test]
    fn test_bare_subscriber_number() {
        assert_eq!(normalize_phone("712345678", "254").unwrap(), "254712345678");
    }

    #[test]
    fn test_too_short_rejected() {
        let err = normalize_phone("07123", "254").unwrap_err();
        assert!(matches!(err, PaymentError::Validation { .. }));
    }

    #[test]
    fn test_non_digits_only_rejected() {
        assert!(normalize_phone("not-a-number", "254").is_err());
    }
}
