//! Phone number normalization.

/// Reduce a phone number to its digits, keeping a leading `+` if the trimmed
/// input started with one. Returns an empty string when no digits remain.
pub fn normalize_phone_number(phone_number: &str) -> String {
    let trimmed = phone_number.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }

    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}
