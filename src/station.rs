use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::StationId;
use crate::error::RinexError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    /// Ellipsoidal height, meters.
    pub height: f64,
}

impl Coordinates {
    /// Station files mark unknown stations with a zero latitude/longitude pair.
    pub fn is_sentinel(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

pub trait StationDatabase: Send + Sync {
    fn lookup(&self, station: &StationId) -> Option<Coordinates>;

    /// Lookup for callers that cannot proceed without coordinates.
    fn require(&self, station: &StationId) -> Result<Coordinates, RinexError> {
        self.lookup(station)
            .ok_or_else(|| RinexError::StationNotFound(station.to_string()))
    }
}

/// Station coordinates read from a JSON object keyed by station id.
#[derive(Debug, Clone, Default)]
pub struct JsonStationDatabase {
    stations: HashMap<String, Coordinates>,
}

impl JsonStationDatabase {
    pub fn load(path: &Utf8Path) -> Result<Self, RinexError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RinexError::Filesystem(format!("read {path}: {err}")))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, RinexError> {
        let raw: HashMap<String, Coordinates> = serde_json::from_str(content)
            .map_err(|err| RinexError::ConfigParse(err.to_string()))?;
        let stations = raw
            .into_iter()
            .map(|(id, coords)| (id.to_ascii_lowercase(), coords))
            .collect();
        Ok(Self { stations })
    }
}

impl StationDatabase for JsonStationDatabase {
    fn lookup(&self, station: &StationId) -> Option<Coordinates> {
        self.stations
            .get(&station.short_name())
            .copied()
            .filter(|coords| !coords.is_sentinel())
    }
}
