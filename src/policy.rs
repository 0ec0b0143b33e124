use serde::Serialize;
use tracing::warn;

use crate::domain::{
    Archive, ArchiveChoice, DEFAULT_SAMPLE_RATE, HIGH_RATE_RINEX2_ARCHIVES,
    HIGH_RATE_RINEX3_ARCHIVES, LOW_RATE_RINEX2_FALLBACK, RINEX2_ARCHIVES, RINEX3_ARCHIVES,
    RINEX3_SEARCH_ORDER, Rate, RinexVersion, Stream,
};
use crate::error::RinexError;
use crate::request::DownloadRequest;

/// Sample rate (seconds) of the high-rate RINEX 3 product.
pub const HIGH_RATE_SAMPLE_RATE: u32 = 1;

/// Which archives a day is searched in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "archives", rename_all = "snake_case")]
pub enum ArchiveSelection {
    Single(Archive),
    /// Tried in order; the first archive that has the file wins.
    Fallback(Vec<Archive>),
    /// RINEX 3 `all` search: every stream-archive pair, primary stream first.
    SearchAll(Vec<Archive>),
}

impl ArchiveSelection {
    pub fn label(&self) -> String {
        match self {
            ArchiveSelection::Single(archive) => archive.to_string(),
            ArchiveSelection::Fallback(_) | ArchiveSelection::SearchAll(_) => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivePlan {
    pub selection: ArchiveSelection,
    pub stream: Stream,
    pub sample_rate: u32,
    /// Recoverable degradations and advisories raised while resolving.
    pub notices: Vec<String>,
}

/// Decides the effective archive(s), stream and sample rate for a request.
///
/// Rules run in a fixed order: low-rate RINEX 2 station and archive checks, RINEX 3
/// station/default/allow-list checks, then the high-rate restrictions for each version.
/// Any violation rejects the whole request before a single day is attempted.
pub fn resolve(request: &DownloadRequest) -> Result<ArchivePlan, RinexError> {
    let station_len = request.station.len();
    let version = request.version;
    let rate = request.rate;

    let mut archive = request.archive.clone();
    let mut stream = Stream::default();
    let mut sample_rate = request.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let mut notices = Vec::new();

    if version == RinexVersion::V2 && rate == Rate::Low {
        // GSI stations are exempt from the four-character rule.
        let exempt = archive == Some(ArchiveChoice::Named(Archive::Jp));
        if station_len != RinexVersion::V2.station_len() && !exempt {
            return Err(invalid_station(request, RinexVersion::V2));
        }
        archive = Some(match archive {
            None | Some(ArchiveChoice::All) => ArchiveChoice::All,
            Some(ArchiveChoice::Named(name)) if name.supports(version, rate) => {
                ArchiveChoice::Named(name)
            }
            Some(other) => {
                let message = format!(
                    "archive {:?} is not a RINEX 2 archive; searching {} instead (allowed: {})",
                    other.label(),
                    join(LOW_RATE_RINEX2_FALLBACK),
                    join(RINEX2_ARCHIVES),
                );
                warn!("{message}");
                notices.push(message);
                ArchiveChoice::All
            }
        });
    }

    if version == RinexVersion::V3 {
        if station_len != RinexVersion::V3.station_len() {
            return Err(invalid_station(request, RinexVersion::V3));
        }
        let chosen = archive.take().unwrap_or(ArchiveChoice::Named(Archive::Cddis));
        stream = request.stream.unwrap_or_default();
        if let ArchiveChoice::Named(name) = &chosen {
            sample_rate = name.rinex3_sample_rate(sample_rate);
        }
        let supported = match &chosen {
            ArchiveChoice::All => true,
            ArchiveChoice::Named(name) => name.supports(RinexVersion::V3, Rate::Low),
            ArchiveChoice::Unrecognized(_) => false,
        };
        if !supported {
            return Err(unsupported(&chosen, RINEX3_ARCHIVES, true));
        }
        archive = Some(chosen);
    }

    if rate == Rate::High && version == RinexVersion::V2 {
        if station_len != RinexVersion::V2.station_len() {
            return Err(invalid_station(request, RinexVersion::V2));
        }
        let chosen = archive.take().unwrap_or(ArchiveChoice::Named(Archive::Unavco));
        match chosen {
            ArchiveChoice::Named(name) if name.supports(version, rate) => {
                archive = Some(chosen);
            }
            other => return Err(unsupported(&other, HIGH_RATE_RINEX2_ARCHIVES, false)),
        }
    }

    if rate == Rate::High && version == RinexVersion::V3 {
        match archive {
            Some(ArchiveChoice::Named(name)) if name.supports(version, rate) => {
                if name.is_slow_high_rate() {
                    let message = format!("high-rate RINEX 3 from {name} is supported but slow");
                    warn!("{message}");
                    notices.push(message);
                }
                sample_rate = HIGH_RATE_SAMPLE_RATE;
            }
            Some(ref other) => {
                return Err(unsupported(other, HIGH_RATE_RINEX3_ARCHIVES, false));
            }
            None => {
                return Err(unsupported(
                    &ArchiveChoice::All,
                    HIGH_RATE_RINEX3_ARCHIVES,
                    false,
                ));
            }
        }
    }

    let selection = match (archive, version) {
        (Some(ArchiveChoice::Named(name)), _) => ArchiveSelection::Single(name),
        (_, RinexVersion::V2) => ArchiveSelection::Fallback(LOW_RATE_RINEX2_FALLBACK.to_vec()),
        (_, RinexVersion::V3) => ArchiveSelection::SearchAll(RINEX3_SEARCH_ORDER.to_vec()),
    };

    Ok(ArchivePlan {
        selection,
        stream,
        sample_rate,
        notices,
    })
}

fn invalid_station(request: &DownloadRequest, version: RinexVersion) -> RinexError {
    RinexError::InvalidStationId {
        station: request.station.to_string(),
        version: version.as_u8(),
        expected: version.station_len(),
    }
}

fn unsupported(choice: &ArchiveChoice, allowed: &[Archive], with_all: bool) -> RinexError {
    let mut allowed: Vec<String> = allowed.iter().map(|archive| archive.to_string()).collect();
    if with_all {
        allowed.push("all".to_string());
    }
    RinexError::UnsupportedArchive {
        archive: choice.label(),
        allowed,
    }
}

fn join(archives: &[Archive]) -> String {
    archives
        .iter()
        .map(|archive| archive.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
