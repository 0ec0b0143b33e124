//! Deterministic RINEX file names and the format state a name implies.
//!
//! RINEX 2: `ssssDDD0.YYo` (observation) and `ssssDDD0.YYd` (Hatanaka).
//! RINEX 3: `SSSSMRCCC_S_YYYYDDD0000_01D_NNS_MO.rnx` and `.crx`, where `S` is the
//! stream token and `NN` the sample rate in seconds.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{ObservationDate, StationId, Stream};

static RINEX2_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{4}\d{3}[0-9a-xA-X]\.\d{2}([dDoO])$").unwrap());

static RINEX3_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+\.(crx|rnx|CRX|RNX)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    /// Unix `compress` (`.Z`).
    Lzw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    Hatanaka,
    Observation,
}

/// What a file name says about the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameInfo {
    pub content: Content,
    pub compression: Option<Compression>,
}

pub fn rinex2_observation(station: &StationId, date: &ObservationDate) -> String {
    format!("{}{:03}0.{:02}o", station.short_name(), date.doy, date.yy())
}

pub fn rinex2_hatanaka(station: &StationId, date: &ObservationDate) -> String {
    format!("{}{:03}0.{:02}d", station.short_name(), date.doy, date.yy())
}

fn rinex3_stem(
    station: &StationId,
    date: &ObservationDate,
    stream: Stream,
    sample_rate: u32,
) -> String {
    format!(
        "{}_{}_{}{:03}0000_01D_{:02}S_MO",
        station.long_name(),
        stream,
        date.year,
        date.doy,
        sample_rate
    )
}

pub fn rinex3_observation(
    station: &StationId,
    date: &ObservationDate,
    stream: Stream,
    sample_rate: u32,
) -> String {
    format!("{}.rnx", rinex3_stem(station, date, stream, sample_rate))
}

pub fn rinex3_hatanaka(
    station: &StationId,
    date: &ObservationDate,
    stream: Stream,
    sample_rate: u32,
) -> String {
    format!("{}.crx", rinex3_stem(station, date, stream, sample_rate))
}

/// Classifies a path by name; `None` when it does not look like a RINEX observation product.
pub fn describe(path: &Path) -> Option<NameInfo> {
    let name = path.file_name()?.to_str()?;
    let (inner, compression) = if let Some(inner) = name.strip_suffix(".gz") {
        (inner, Some(Compression::Gzip))
    } else if let Some(inner) = name.strip_suffix(".Z") {
        (inner, Some(Compression::Lzw))
    } else {
        (name, None)
    };

    if let Some(caps) = RINEX2_NAME.captures(inner) {
        let content = match &caps[1] {
            "d" | "D" => Content::Hatanaka,
            _ => Content::Observation,
        };
        return Some(NameInfo {
            content,
            compression,
        });
    }

    let caps = RINEX3_NAME.captures(inner)?;
    let content = if caps[1].eq_ignore_ascii_case("crx") {
        Content::Hatanaka
    } else {
        Content::Observation
    };
    Some(NameInfo {
        content,
        compression,
    })
}

/// Path with one compression suffix removed.
pub fn decompressed_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let inner = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".Z"))?;
    Some(path.with_file_name(inner))
}

/// Observation path CRX2RNX produces for a Hatanaka input.
pub fn translated_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let translated = if let Some(stem) = name.strip_suffix(".crx") {
        format!("{stem}.rnx")
    } else if let Some(stem) = name.strip_suffix(".CRX") {
        format!("{stem}.RNX")
    } else if let Some(stem) = name.strip_suffix('d') {
        format!("{stem}o")
    } else if let Some(stem) = name.strip_suffix('D') {
        format!("{stem}O")
    } else {
        return None;
    };
    Some(path.with_file_name(translated))
}
