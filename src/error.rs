use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RinexError {
    #[error("configuration error: {0}")]
    #[diagnostic(help("set RINEX_OUTPUT_DIR / RINEX_EXE_DIR or fix rinex-fetch.json"))]
    Config(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("year must have four digits: {0}")]
    InvalidYear(i32),

    #[error("invalid station id {station:?}: RINEX {version} station names must have {expected} alphanumeric characters")]
    InvalidStationId {
        station: String,
        version: u8,
        expected: usize,
    },

    #[error("archive {archive:?} is not supported for this request")]
    #[diagnostic(help("supported archives: {}", allowed.join(", ")))]
    UnsupportedArchive {
        archive: String,
        allowed: Vec<String>,
    },

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("station not found in station database: {0}")]
    StationNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("conversion failed: {0}")]
    Conversion(String),
}
