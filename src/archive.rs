use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Archive, ObservationDate, Rate, RinexVersion, StationId, Stream};
use crate::error::RinexError;

/// One `(day, archive, stream)` request to a data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub station: StationId,
    pub date: ObservationDate,
    pub archive: Archive,
    pub version: RinexVersion,
    pub rate: Rate,
    pub stream: Stream,
    pub sample_rate: u32,
}

pub trait ArchiveClient: Send + Sync {
    /// Downloads the file for `query` into `destination`.
    ///
    /// `Ok(None)` means the archive does not have it. Repeating a query while the
    /// remote file is unchanged must produce the same local file.
    fn fetch(&self, query: &ArchiveQuery, destination: &Path)
    -> Result<Option<PathBuf>, RinexError>;
}

/// URL templates for one archive. Placeholders: `{year}`, `{yy}`, `{doy}`,
/// `{station}` (lowercase), `{STATION}` (uppercase), `{stream}`, `{rate}` (seconds, two digits).
///
/// A missing template makes the archive answer "not found" for that version and rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEndpoint {
    #[serde(default)]
    pub rinex2: Option<String>,
    #[serde(default)]
    pub rinex3: Option<String>,
    #[serde(default)]
    pub rinex2_highrate: Option<String>,
    #[serde(default)]
    pub rinex3_highrate: Option<String>,
}

impl ArchiveEndpoint {
    fn template(&self, version: RinexVersion, rate: Rate) -> Option<&str> {
        match (version, rate) {
            (RinexVersion::V2, Rate::Low) => self.rinex2.as_deref(),
            (RinexVersion::V3, Rate::Low) => self.rinex3.as_deref(),
            (RinexVersion::V2, Rate::High) => self.rinex2_highrate.as_deref(),
            (RinexVersion::V3, Rate::High) => self.rinex3_highrate.as_deref(),
        }
    }
}

const RINEX3_DAILY: &str = "{STATION}_{stream}_{year}{doy}0000_01D_{rate}S_MO.crx.gz";

/// Built-in HTTPS endpoints.
///
/// Archives reachable only over FTP (sonel among them) and the sub-daily high-rate
/// products of cddis and nrcan have no entry here; they are skipped as not found
/// unless the config file's `archives` table supplies a template.
pub fn default_endpoints() -> BTreeMap<Archive, ArchiveEndpoint> {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        Archive::Sopac,
        ArchiveEndpoint {
            rinex2: Some(
                "https://garner.ucsd.edu/pub/rinex/{year}/{doy}/{station}{doy}0.{yy}d.Z".to_string(),
            ),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Unavco,
        ArchiveEndpoint {
            rinex2: Some(
                "https://data.unavco.org/archive/gnss/rinex/obs/{year}/{doy}/{station}{doy}0.{yy}d.Z"
                    .to_string(),
            ),
            rinex3: Some(format!(
                "https://data.unavco.org/archive/gnss/rinex3/obs/{{year}}/{{doy}}/{RINEX3_DAILY}"
            )),
            rinex2_highrate: Some(
                "https://data.unavco.org/archive/gnss/highrate/1-Hz/rinex/{year}/{doy}/{station}/{station}{doy}0.{yy}d.Z"
                    .to_string(),
            ),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Cddis,
        ArchiveEndpoint {
            rinex2: Some(
                "https://cddis.nasa.gov/archive/gnss/data/daily/{year}/{doy}/{yy}d/{station}{doy}0.{yy}d.gz"
                    .to_string(),
            ),
            rinex3: Some(format!(
                "https://cddis.nasa.gov/archive/gnss/data/daily/{{year}}/{{doy}}/{{yy}}d/{RINEX3_DAILY}"
            )),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Bkg,
        ArchiveEndpoint {
            rinex3: Some(format!(
                "https://igs.bkg.bund.de/root_ftp/IGS/obs/{{year}}/{{doy}}/{RINEX3_DAILY}"
            )),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Epn,
        ArchiveEndpoint {
            rinex3: Some(format!(
                "https://igs.bkg.bund.de/root_ftp/EUREF/obs/{{year}}/{{doy}}/{RINEX3_DAILY}"
            )),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Ign,
        ArchiveEndpoint {
            rinex3: Some(format!(
                "https://igs.ign.fr/pub/igs/data/{{year}}/{{doy}}/{RINEX3_DAILY}"
            )),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints.insert(
        Archive::Nz,
        ArchiveEndpoint {
            rinex2: Some(
                "https://data.geonet.org.nz/gnss/rinex/{year}/{doy}/{station}{doy}0.{yy}d.gz"
                    .to_string(),
            ),
            ..ArchiveEndpoint::default()
        },
    );
    endpoints
}

/// Fills the placeholders of an endpoint template for `query`.
pub fn expand_template(template: &str, query: &ArchiveQuery) -> String {
    template
        .replace("{year}", &query.date.year.to_string())
        .replace("{yy}", &format!("{:02}", query.date.yy()))
        .replace("{doy}", &format!("{:03}", query.date.doy))
        .replace("{station}", &query.station.short_name())
        .replace("{STATION}", &query.station.long_name())
        .replace("{stream}", &query.stream.to_string())
        .replace("{rate}", &format!("{:02}", query.sample_rate))
}

#[derive(Clone)]
pub struct HttpArchiveClient {
    client: Client,
    endpoints: BTreeMap<Archive, ArchiveEndpoint>,
}

impl HttpArchiveClient {
    pub fn new(
        endpoints: BTreeMap<Archive, ArchiveEndpoint>,
        timeout: Duration,
    ) -> Result<Self, RinexError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("rinex-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RinexError::ArchiveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| RinexError::ArchiveHttp(err.to_string()))?;
        Ok(Self { client, endpoints })
    }

    pub fn url_for(&self, query: &ArchiveQuery) -> Option<String> {
        let template = self
            .endpoints
            .get(&query.archive)?
            .template(query.version, query.rate)?;
        Some(expand_template(template, query))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, RinexError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(RinexError::ArchiveHttp(err.to_string()));
                }
            }
        }
    }
}

impl ArchiveClient for HttpArchiveClient {
    fn fetch(
        &self,
        query: &ArchiveQuery,
        destination: &Path,
    ) -> Result<Option<PathBuf>, RinexError> {
        let Some(url) = self.url_for(query) else {
            debug!(
                archive = %query.archive,
                version = %query.version,
                rate = %query.rate,
                "no endpoint configured"
            );
            return Ok(None);
        };
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RinexError::ArchiveHttp(format!("url has no file name: {url}")))?
            .to_string();

        debug!(%url, "archive request");
        let mut response = self.send_with_retries(|| self.client.get(&url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive request failed".to_string());
            return Err(RinexError::ArchiveStatus { status, message });
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".rinex-fetch-download")
            .tempfile_in(destination)
            .map_err(|err| RinexError::Filesystem(err.to_string()))?;
        response
            .copy_to(&mut temp)
            .map_err(|err| RinexError::ArchiveHttp(err.to_string()))?;
        let path = destination.join(file_name);
        temp.persist(&path)
            .map_err(|err| RinexError::Filesystem(err.to_string()))?;
        Ok(Some(path))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(archive: Archive, version: RinexVersion) -> ArchiveQuery {
        let station = match version {
            RinexVersion::V2 => "P041",
            RinexVersion::V3 => "mchl00aus",
        };
        ArchiveQuery {
            station: station.parse().unwrap(),
            date: ObservationDate::from_ydoy(2023, 7).unwrap(),
            archive,
            version,
            rate: Rate::Low,
            stream: Stream::S,
            sample_rate: 30,
        }
    }

    #[test]
    fn expands_rinex2_template() {
        let client = HttpArchiveClient::new(default_endpoints(), Duration::from_secs(5)).unwrap();
        let url = client.url_for(&query(Archive::Sopac, RinexVersion::V2)).unwrap();
        assert_eq!(
            url,
            "https://garner.ucsd.edu/pub/rinex/2023/007/p0410070.23d.Z"
        );
    }

    #[test]
    fn expands_rinex3_template() {
        let client = HttpArchiveClient::new(default_endpoints(), Duration::from_secs(5)).unwrap();
        let url = client.url_for(&query(Archive::Bkg, RinexVersion::V3)).unwrap();
        assert!(url.ends_with("/2023/007/MCHL00AUS_S_20230070000_01D_30S_MO.crx.gz"));
    }

    #[test]
    fn ftp_only_and_subdaily_archives_need_configured_templates() {
        let mut endpoints = default_endpoints();
        let client = HttpArchiveClient::new(endpoints.clone(), Duration::from_secs(5)).unwrap();
        assert!(client.url_for(&query(Archive::Sonel, RinexVersion::V2)).is_none());
        let mut high_rate = query(Archive::Cddis, RinexVersion::V3);
        high_rate.rate = Rate::High;
        assert!(client.url_for(&high_rate).is_none());

        endpoints.insert(
            Archive::Sonel,
            ArchiveEndpoint {
                rinex2: Some("https://mirror.example/{year}/{doy}/{station}{doy}0.{yy}d.Z".into()),
                ..ArchiveEndpoint::default()
            },
        );
        let client = HttpArchiveClient::new(endpoints, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url_for(&query(Archive::Sonel, RinexVersion::V2)).unwrap(),
            "https://mirror.example/2023/007/p0410070.23d.Z"
        );
    }

    #[test]
    fn archive_without_template_is_not_found() {
        let client = HttpArchiveClient::new(BTreeMap::new(), Duration::from_secs(5)).unwrap();
        let temp = tempfile::tempdir().unwrap();
        let found = client
            .fetch(&query(Archive::Sonel, RinexVersion::V2), temp.path())
            .unwrap();
        assert!(found.is_none());
    }
}
