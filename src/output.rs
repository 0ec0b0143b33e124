use std::io::{self, Write};

use serde::Serialize;
use tracing::debug;

use crate::engine::{DownloadReport, ProgressEvent, ProgressSink};
use crate::station::Coordinates;
use crate::tools::ToolInfo;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &DownloadReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tools(result: &ToolInfo) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_station(station: &str, coordinates: &Coordinates) -> io::Result<()> {
        #[derive(Serialize)]
        struct StationOutput<'a> {
            station: &'a str,
            #[serde(flatten)]
            coordinates: &'a Coordinates,
        }
        Self::print_json(&StationOutput {
            station,
            coordinates,
        })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => debug!(latency_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => debug!("{}", event.message),
        }
    }
}
