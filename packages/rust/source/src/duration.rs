//! ISO-8601 duration parsing for `contentDetails.duration` (`PT1H2M3S`).

use postforge_shared::{PostforgeError, Result};

/// Parse an ISO-8601 duration into whole seconds.
///
/// Supports the day and time designators YouTube emits (`P1DT2H`, `PT4M13S`,
/// `PT0S`). Fractional seconds are truncated.
pub(crate) fn parse_iso8601_duration(value: &str) -> Result<u64> {
    let invalid = || PostforgeError::parse(format!("invalid ISO-8601 duration: {value:?}"));

    let rest = value.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };
    if date_part.is_empty() && time_part.is_empty() {
        return Err(invalid());
    }

    const DATE_UNITS: &[(char, u64)] = &[('W', 604_800), ('D', 86_400)];
    const TIME_UNITS: &[(char, u64)] = &[('H', 3600), ('M', 60), ('S', 1)];

    let mut total = 0u64;
    for (part, units) in [(date_part, DATE_UNITS), (time_part, TIME_UNITS)] {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let factor = units
                .iter()
                .find(|(u, _)| *u == c)
                .map(|(_, f)| *f)
                .ok_or_else(invalid)?;
            let amount: f64 = number.parse().map_err(|_| invalid())?;
            total += (amount * factor as f64) as u64;
            number.clear();
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shapes() {
        assert_eq!(parse_iso8601_duration("PT4M13S").unwrap(), 253);
        assert_eq!(parse_iso8601_duration("PT1H2M3S").unwrap(), 3723);
        assert_eq!(parse_iso8601_duration("PT59S").unwrap(), 59);
        assert_eq!(parse_iso8601_duration("P1DT1S").unwrap(), 86_401);
        assert_eq!(parse_iso8601_duration("PT0S").unwrap(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iso8601_duration("4:13").is_err());
        assert!(parse_iso8601_duration("P").is_err());
        assert!(parse_iso8601_duration("PT5X").is_err());
        assert!(parse_iso8601_duration("PT12").is_err());
    }
}
