use crate::error::ValidationError;

/// Parse `H:MM` or `HH:MM` into minutes since midnight.
pub fn parse_hhmm(input: &str) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidClock(input.to_string());
    let s = input.trim();

    let (hh, mm) = s.split_once(':').ok_or_else(invalid)?;
    let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(hh) || !all_digits(mm) || hh.len() > 2 || mm.len() != 2 {
        return Err(invalid());
    }

    let hours: u32 = hh.parse().map_err(|_| invalid())?;
    let minutes: u32 = mm.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Format minutes since midnight as zero-padded `HH:MM`.
pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
