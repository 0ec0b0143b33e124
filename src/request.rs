use crate::domain::{ArchiveChoice, ObservationDate, Rate, RinexVersion, StationId, Stream};
use crate::error::RinexError;

/// Caller input as it arrives from the command line or an embedding program.
#[derive(Debug, Clone, Default)]
pub struct DownloadInput {
    pub station: String,
    pub year: i32,
    /// Month, or day of year when `day` is zero.
    pub month: u32,
    pub day: u32,
    pub rate: Rate,
    pub archive: Option<String>,
    pub version: Option<u8>,
    pub strip: bool,
    pub doy_end: Option<u32>,
    pub stream: Option<String>,
    pub sample_rate: Option<u32>,
    pub strip_snr: bool,
    pub force: bool,
}

/// Normalized, immutable request. Built once per invocation.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub station: StationId,
    pub version: RinexVersion,
    pub rate: Rate,
    pub archive: Option<ArchiveChoice>,
    pub stream: Option<Stream>,
    pub sample_rate: Option<u32>,
    pub strip: bool,
    pub strip_snr: bool,
    pub force: bool,
    days: Vec<ObservationDate>,
}

impl DownloadRequest {
    pub fn from_input(input: DownloadInput) -> Result<Self, RinexError> {
        let station: StationId = input.station.parse()?;
        let first = normalize_date(input.year, input.month, input.day)?;
        let days = expand_days(first, input.doy_end)?;
        let version = infer_version(&station, input.version)?;

        Ok(Self {
            station,
            version,
            rate: input.rate,
            archive: input.archive.as_deref().map(ArchiveChoice::parse),
            // unknown stream tokens fall back to the policy default
            stream: input.stream.as_deref().and_then(|value| value.parse().ok()),
            sample_rate: input.sample_rate,
            strip: input.strip,
            strip_snr: input.strip_snr,
            force: input.force,
            days,
        })
    }

    /// Days to retrieve, `[doy, doy_end]` inclusive, in order.
    pub fn days(&self) -> &[ObservationDate] {
        &self.days
    }
}

/// Resolves `(year, month, day)`; `day == 0` means `month` carries the day of year.
pub fn normalize_date(year: i32, month: u32, day: u32) -> Result<ObservationDate, RinexError> {
    if !(1000..=9999).contains(&year) {
        return Err(RinexError::InvalidYear(year));
    }
    if day == 0 {
        ObservationDate::from_ydoy(year, month)
    } else {
        ObservationDate::from_ymd(year, month, day)
    }
}

/// Nine-character station ids are always RINEX 3, whatever the caller asked for.
pub fn infer_version(
    station: &StationId,
    requested: Option<u8>,
) -> Result<RinexVersion, RinexError> {
    if station.len() == RinexVersion::V3.station_len() {
        return Ok(RinexVersion::V3);
    }
    let requested = requested.map(RinexVersion::try_from).transpose()?;
    Ok(requested.unwrap_or(RinexVersion::V2))
}

fn expand_days(
    first: ObservationDate,
    doy_end: Option<u32>,
) -> Result<Vec<ObservationDate>, RinexError> {
    let last = doy_end.unwrap_or(first.doy);
    if last < first.doy {
        return Err(RinexError::InvalidInput(format!(
            "doy_end {last} is before the first day of year {}",
            first.doy
        )));
    }
    (first.doy..=last)
        .map(|doy| ObservationDate::from_ydoy(first.year, doy))
        .collect()
}

/// Parses the boolean spellings accepted on the command line (`True`, `false`, `yes`, `0`, ...).
pub fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        other => Err(format!("expected true or false, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn input(station: &str) -> DownloadInput {
        DownloadInput {
            station: station.to_string(),
            year: 2023,
            month: 10,
            day: 0,
            ..DownloadInput::default()
        }
    }

    #[test]
    fn day_zero_means_day_of_year() {
        let date = normalize_date(2023, 32, 0).unwrap();
        assert_eq!((date.month, date.day, date.doy), (2, 1, 32));
    }

    #[test]
    fn calendar_date_resolves_day_of_year() {
        let date = normalize_date(2020, 3, 1).unwrap();
        assert_eq!(date.doy, 61);
    }

    #[test]
    fn two_digit_year_is_rejected() {
        assert_matches!(normalize_date(23, 10, 0), Err(RinexError::InvalidYear(23)));
    }

    #[test]
    fn nine_character_station_forces_version_three() {
        let station: StationId = "MCHL00AUS".parse().unwrap();
        assert_eq!(infer_version(&station, Some(2)).unwrap(), RinexVersion::V3);
        assert_eq!(infer_version(&station, Some(4)).unwrap(), RinexVersion::V3);
        let station: StationId = "p041".parse().unwrap();
        assert_eq!(infer_version(&station, None).unwrap(), RinexVersion::V2);
        assert_eq!(infer_version(&station, Some(3)).unwrap(), RinexVersion::V3);
    }

    #[test]
    fn day_range_is_inclusive() {
        let mut raw = input("p041");
        raw.doy_end = Some(12);
        raw.month = 10;
        let request = DownloadRequest::from_input(raw).unwrap();
        let doys: Vec<u32> = request.days().iter().map(|d| d.doy).collect();
        assert_eq!(doys, vec![10, 11, 12]);
    }

    #[test]
    fn reversed_day_range_is_rejected() {
        let mut raw = input("p041");
        raw.doy_end = Some(5);
        assert_matches!(
            DownloadRequest::from_input(raw),
            Err(RinexError::InvalidInput(_))
        );
    }

    #[test]
    fn unknown_stream_is_dropped_at_the_boundary() {
        let mut raw = input("MCHL00AUS");
        raw.stream = Some("X".to_string());
        let request = DownloadRequest::from_input(raw).unwrap();
        assert_eq!(request.stream, None);
    }

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag("True"), Ok(true));
        assert_eq!(parse_flag("FALSE"), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }
}
