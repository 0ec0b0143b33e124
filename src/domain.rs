use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RinexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    Sopac,
    Unavco,
    Sonel,
    Cddis,
    Nz,
    Ga,
    Bkg,
    Jeff,
    Ngs,
    Nrcan,
    Special,
    Bev,
    Ign,
    Epn,
    Bfg,
    Jp,
}

/// Archives accepted for low-rate RINEX 2 requests.
pub const RINEX2_ARCHIVES: &[Archive] = &[
    Archive::Sopac,
    Archive::Unavco,
    Archive::Sonel,
    Archive::Cddis,
    Archive::Nz,
    Archive::Ga,
    Archive::Bkg,
    Archive::Jeff,
    Archive::Ngs,
    Archive::Nrcan,
    Archive::Special,
    Archive::Bev,
];

/// Fallback group searched, in order, when a low-rate RINEX 2 request names no archive.
pub const LOW_RATE_RINEX2_FALLBACK: &[Archive] = &[Archive::Unavco, Archive::Sopac, Archive::Sonel];

pub const HIGH_RATE_RINEX2_ARCHIVES: &[Archive] =
    &[Archive::Unavco, Archive::Nrcan, Archive::Cddis];

pub const RINEX3_ARCHIVES: &[Archive] = &[
    Archive::Unavco,
    Archive::Cddis,
    Archive::Ga,
    Archive::Bev,
    Archive::Bkg,
    Archive::Ign,
    Archive::Epn,
    Archive::Bfg,
];

/// Order used by the `all` search for RINEX 3, primary provider first.
pub const RINEX3_SEARCH_ORDER: &[Archive] = &[
    Archive::Cddis,
    Archive::Bkg,
    Archive::Ign,
    Archive::Epn,
    Archive::Ga,
    Archive::Bev,
    Archive::Unavco,
    Archive::Bfg,
];

pub const HIGH_RATE_RINEX3_ARCHIVES: &[Archive] = &[Archive::Cddis];

/// Sample rate (seconds) UNAVCO publishes its RINEX 3 daily files at.
pub const UNAVCO_RINEX3_SAMPLE_RATE: u32 = 15;

pub const DEFAULT_SAMPLE_RATE: u32 = 30;

impl Archive {
    pub const ALL: &'static [Archive] = &[
        Archive::Sopac,
        Archive::Unavco,
        Archive::Sonel,
        Archive::Cddis,
        Archive::Nz,
        Archive::Ga,
        Archive::Bkg,
        Archive::Jeff,
        Archive::Ngs,
        Archive::Nrcan,
        Archive::Special,
        Archive::Bev,
        Archive::Ign,
        Archive::Epn,
        Archive::Bfg,
        Archive::Jp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Archive::Sopac => "sopac",
            Archive::Unavco => "unavco",
            Archive::Sonel => "sonel",
            Archive::Cddis => "cddis",
            Archive::Nz => "nz",
            Archive::Ga => "ga",
            Archive::Bkg => "bkg",
            Archive::Jeff => "jeff",
            Archive::Ngs => "ngs",
            Archive::Nrcan => "nrcan",
            Archive::Special => "special",
            Archive::Bev => "bev",
            Archive::Ign => "ign",
            Archive::Epn => "epn",
            Archive::Bfg => "bfg",
            Archive::Jp => "jp",
        }
    }

    pub fn supports(self, version: RinexVersion, rate: Rate) -> bool {
        let group = match (version, rate) {
            (RinexVersion::V2, Rate::Low) => RINEX2_ARCHIVES,
            (RinexVersion::V2, Rate::High) => HIGH_RATE_RINEX2_ARCHIVES,
            (RinexVersion::V3, Rate::Low) => RINEX3_ARCHIVES,
            (RinexVersion::V3, Rate::High) => HIGH_RATE_RINEX3_ARCHIVES,
        };
        group.contains(&self)
    }

    /// Sample rate of the daily RINEX 3 files this archive serves; `requested` when the
    /// archive publishes more than one.
    pub fn rinex3_sample_rate(self, requested: u32) -> u32 {
        match self {
            Archive::Unavco => UNAVCO_RINEX3_SAMPLE_RATE,
            _ => requested,
        }
    }

    pub fn is_slow_high_rate(self) -> bool {
        matches!(self, Archive::Cddis)
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archive {
    type Err = RinexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Archive::ALL
            .iter()
            .copied()
            .find(|archive| archive.as_str() == normalized)
            .ok_or_else(|| RinexError::InvalidInput(format!("unknown archive: {value}")))
    }
}

/// Archive as requested by the caller, normalized but not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveChoice {
    All,
    Named(Archive),
    Unrecognized(String),
}

impl ArchiveChoice {
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "all" {
            return ArchiveChoice::All;
        }
        match normalized.parse::<Archive>() {
            Ok(archive) => ArchiveChoice::Named(archive),
            Err(_) => ArchiveChoice::Unrecognized(normalized),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ArchiveChoice::All => "all".to_string(),
            ArchiveChoice::Named(archive) => archive.to_string(),
            ArchiveChoice::Unrecognized(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RinexVersion {
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,
}

impl RinexVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            RinexVersion::V2 => 2,
            RinexVersion::V3 => 3,
        }
    }

    /// Station-name length RINEX files of this version use.
    pub fn station_len(self) -> usize {
        match self {
            RinexVersion::V2 => 4,
            RinexVersion::V3 => 9,
        }
    }
}

impl TryFrom<u8> for RinexVersion {
    type Error = RinexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(RinexVersion::V2),
            3 => Ok(RinexVersion::V3),
            other => Err(RinexError::InvalidInput(format!(
                "RINEX version must be 2 or 3, got {other}"
            ))),
        }
    }
}

impl fmt::Display for RinexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Rate {
    #[default]
    Low,
    High,
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Low => write!(f, "low"),
            Rate::High => write!(f, "high"),
        }
    }
}

/// RINEX 3 file-name stream token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stream {
    #[default]
    R,
    S,
}

impl Stream {
    pub fn swapped(self) -> Self {
        match self {
            Stream::R => Stream::S,
            Stream::S => Stream::R,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Stream::R => 'R',
            Stream::S => 'S',
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Stream {
    type Err = RinexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "R" => Ok(Stream::R),
            "S" => Ok(Stream::S),
            other => Err(RinexError::InvalidInput(format!("unknown stream: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId(String);

impl StationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase four-character form used in RINEX 2 file names.
    pub fn short_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Uppercase nine-character form used in RINEX 3 file names.
    pub fn long_name(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StationId {
    type Err = RinexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid =
            !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            let version = if trimmed.len() == RinexVersion::V3.station_len() {
                RinexVersion::V3
            } else {
                RinexVersion::V2
            };
            return Err(RinexError::InvalidStationId {
                station: trimmed.to_string(),
                version: version.as_u8(),
                expected: version.station_len(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObservationDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub doy: u32,
}

impl ObservationDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, RinexError> {
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            RinexError::InvalidInput(format!("no such date: {year}-{month:02}-{day:02}"))
        })?;
        Ok(Self::from_naive(date))
    }

    pub fn from_ydoy(year: i32, doy: u32) -> Result<Self, RinexError> {
        let date = NaiveDate::from_yo_opt(year, doy).ok_or_else(|| {
            RinexError::InvalidInput(format!("day of year {doy} out of range for {year}"))
        })?;
        Ok(Self::from_naive(date))
    }

    fn from_naive(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            doy: date.ordinal(),
        }
    }

    /// Two-digit year used by RINEX 2 names.
    pub fn yy(&self) -> u32 {
        self.year.rem_euclid(100) as u32
    }
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}-{:02} (doy {:03})",
            self.year, self.month, self.day, self.doy
        )
    }
}
