//! Measurement line parsing.
//!
//! Two tokenizations occur in the wild, both whitespace-separated:
//!
//! - `<date> <time> <freq>,<amp>`: the record-prop file, stamped with
//!   the shared textual timestamp format.
//! - `<epoch_ms>, <freq>, <active|inactive>`: the legacy worker file;
//!   the epoch token may carry a trailing `,` or `:`.
//!
//! A parse failure skips the line; it never touches classifier state.

use chrono::DateTime;

use tonewatch_foundation::{timefmt, DetectError};

use crate::types::FrequencyObservation;

/// Amplitude reported when the legacy format omits one.
const LEGACY_AMPLITUDE_DB: f32 = 0.0;

pub fn parse_measurement_line(line: &str) -> Result<FrequencyObservation, DetectError> {
    let line = line.trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(DetectError::parse(line, "expected at least 3 tokens"));
    }

    if tokens[0].contains('-') {
        parse_dated(line, &tokens)
    } else {
        parse_epoch(line, &tokens)
    }
}

/// `<date> <time> <freq>,<amp>`
fn parse_dated(line: &str, tokens: &[&str]) -> Result<FrequencyObservation, DetectError> {
    let time_str = format!("{} {}", tokens[0], tokens[1]);
    let timestamp = timefmt::parse_timestamp(&time_str)?;

    let measurement = tokens[tokens.len() - 1];
    let (freq_str, amp_str) = measurement
        .split_once(',')
        .ok_or_else(|| DetectError::parse(line, "missing `freq,amp` pair"))?;
    let frequency_hz: f32 = freq_str
        .parse()
        .map_err(|_| DetectError::parse(line, "bad frequency"))?;
    let amplitude_db: f32 = amp_str
        .parse()
        .map_err(|_| DetectError::parse(line, "bad amplitude"))?;

    Ok(FrequencyObservation::new(frequency_hz, amplitude_db, timestamp))
}

/// `<epoch_ms>, <freq>, <active|inactive>`
fn parse_epoch(line: &str, tokens: &[&str]) -> Result<FrequencyObservation, DetectError> {
    let epoch_token = tokens[0].trim_end_matches([',', ':']);
    let epoch_ms: i64 = epoch_token
        .parse()
        .map_err(|_| DetectError::parse(line, "bad epoch milliseconds"))?;
    let timestamp = DateTime::from_timestamp_millis(epoch_ms)
        .ok_or_else(|| DetectError::parse(line, "epoch out of range"))?
        .naive_utc();

    let frequency_hz: f32 = tokens[1]
        .trim_end_matches(',')
        .parse()
        .map_err(|_| DetectError::parse(line, "bad frequency"))?;

    // The state tag is collapsed into the shared debounce path: an
    // inactive measurement reads as silence.
    let frequency_hz = match tokens[2].to_ascii_lowercase().as_str() {
        "active" => frequency_hz,
        "inactive" => 0.0,
        other => {
            return Err(DetectError::parse(line, format!("unknown state tag {:?}", other)));
        }
    };

    Ok(FrequencyObservation::new(
        frequency_hz,
        LEGACY_AMPLITUDE_DB,
        timestamp,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_format_parses() {
        let obs = parse_measurement_line("2024-03-01 10:15:30.250000 440.0,-12.5").unwrap();
        assert_eq!(obs.frequency_hz, 440.0);
        assert_eq!(obs.amplitude_db, -12.5);
        assert_eq!(timefmt::format_timestamp(obs.timestamp), "2024-03-01 10:15:30.250000");
    }

    #[test]
    fn dated_format_round_trips_at_millisecond_precision() {
        let stamped = format!("{} 880.0,-3.0", timefmt::now_str());
        let obs = parse_measurement_line(&stamped).unwrap();
        let reparsed =
            parse_measurement_line(&format!("{} 880.0,-3.0", timefmt::format_timestamp(obs.timestamp)))
                .unwrap();
        assert_eq!(obs.timestamp, reparsed.timestamp);
    }

    #[test]
    fn epoch_format_parses_with_trailing_separators() {
        let obs = parse_measurement_line("1709287530250, 440.0, active").unwrap();
        assert_eq!(obs.frequency_hz, 440.0);
        let obs = parse_measurement_line("1709287530250: 440.0, active").unwrap();
        assert_eq!(obs.frequency_hz, 440.0);
        assert_eq!(
            obs.timestamp,
            DateTime::from_timestamp_millis(1709287530250).unwrap().naive_utc()
        );
    }

    #[test]
    fn epoch_round_trips_at_millisecond_precision() {
        let obs = parse_measurement_line("1709287530250, 440.0, active").unwrap();
        let reparsed = parse_measurement_line(&format!(
            "{} 440.0,0.0",
            timefmt::format_timestamp(obs.timestamp)
        ))
        .unwrap();
        assert_eq!(obs.timestamp, reparsed.timestamp);
    }

    #[test]
    fn inactive_tag_reads_as_silence() {
        let obs = parse_measurement_line("1709287530250, 440.0, inactive").unwrap();
        assert_eq!(obs.frequency_hz, 0.0);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_measurement_line("").is_err());
        assert!(parse_measurement_line("garbage").is_err());
        assert!(parse_measurement_line("2024-03-01 10:15:30.250000 no-pair").is_err());
        assert!(parse_measurement_line("2024-03-01 10:15:30.250000 abc,def").is_err());
        assert!(parse_measurement_line("1709287530250, 440.0, paused").is_err());
        assert!(parse_measurement_line("notanumber, 440.0, active").is_err());
    }
}
