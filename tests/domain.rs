use assert_matches::assert_matches;

use rinex_fetch::domain::{
    Archive, ArchiveChoice, ObservationDate, RinexVersion, StationId, Stream,
};
use rinex_fetch::error::RinexError;
use rinex_fetch::request::{DownloadInput, DownloadRequest, normalize_date};

#[test]
fn station_names_keep_case_variants() {
    let id: StationId = " P041 ".parse().unwrap();
    assert_eq!(id.as_str(), "P041");
    assert_eq!(id.short_name(), "p041");
    assert_eq!(id.long_name(), "P041");
}

#[test]
fn station_with_punctuation_is_invalid() {
    let err = "p0-1".parse::<StationId>().unwrap_err();
    assert_matches!(
        err,
        RinexError::InvalidStationId {
            version: 2,
            expected: 4,
            ..
        }
    );
}

#[test]
fn empty_station_is_an_invalid_station_id() {
    let err = "  ".parse::<StationId>().unwrap_err();
    assert_matches!(err, RinexError::InvalidStationId { .. });
}

#[test]
fn nine_character_station_ignores_requested_version() {
    let request = DownloadRequest::from_input(DownloadInput {
        station: "MCHL00AUS".to_string(),
        year: 2023,
        month: 1,
        day: 1,
        version: Some(4),
        ..DownloadInput::default()
    })
    .unwrap();
    assert_eq!(request.version, RinexVersion::V3);
}

#[test]
fn archive_choice_is_case_insensitive() {
    assert_eq!(ArchiveChoice::parse("CDDIS"), ArchiveChoice::Named(Archive::Cddis));
    assert_eq!(ArchiveChoice::parse("All"), ArchiveChoice::All);
    assert_eq!(
        ArchiveChoice::parse("atlantis"),
        ArchiveChoice::Unrecognized("atlantis".to_string())
    );
}

#[test]
fn stream_swaps_between_r_and_s() {
    assert_eq!(Stream::R.swapped(), Stream::S);
    assert_eq!(Stream::S.swapped(), Stream::R);
    assert!("X".parse::<Stream>().is_err());
}

#[test]
fn calendar_and_doy_dates_agree() {
    let by_month = normalize_date(2024, 3, 1).unwrap();
    let by_doy = normalize_date(2024, 61, 0).unwrap();
    assert_eq!(by_month, by_doy);
    assert_eq!(by_doy.doy, 61);
    assert_eq!(by_doy.yy(), 24);
}

#[test]
fn two_digit_year_is_rejected() {
    assert_matches!(normalize_date(23, 1, 1), Err(RinexError::InvalidYear(23)));
}

#[test]
fn impossible_dates_are_rejected() {
    assert_matches!(ObservationDate::from_ymd(2023, 2, 29), Err(RinexError::InvalidInput(_)));
    assert_matches!(ObservationDate::from_ydoy(2023, 366), Err(RinexError::InvalidInput(_)));
}

#[test]
fn day_range_is_inclusive() {
    let request = DownloadRequest::from_input(DownloadInput {
        station: "p041".to_string(),
        year: 2023,
        month: 10,
        day: 0,
        doy_end: Some(12),
        ..DownloadInput::default()
    })
    .unwrap();
    let doys: Vec<u32> = request.days().iter().map(|date| date.doy).collect();
    assert_eq!(doys, vec![10, 11, 12]);
    assert_eq!(request.version, RinexVersion::V2);
}

#[test]
fn backwards_day_range_is_rejected() {
    let err = DownloadRequest::from_input(DownloadInput {
        station: "p041".to_string(),
        year: 2023,
        month: 12,
        day: 0,
        doy_end: Some(10),
        ..DownloadInput::default()
    })
    .unwrap_err();
    assert_matches!(err, RinexError::InvalidInput(_));
}

#[test]
fn unknown_version_is_rejected() {
    let err = DownloadRequest::from_input(DownloadInput {
        station: "p041".to_string(),
        year: 2023,
        month: 1,
        day: 1,
        version: Some(4),
        ..DownloadInput::default()
    })
    .unwrap_err();
    assert_matches!(err, RinexError::InvalidInput(_));
}
