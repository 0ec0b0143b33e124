use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveClient, ArchiveQuery};
use crate::config::Settings;
use crate::convert::{ConversionPipeline, RinexFile, RinexStage, StripMode};
use crate::domain::{Archive, ObservationDate, Rate, RinexVersion, Stream};
use crate::error::RinexError;
use crate::naming;
use crate::policy::{self, ArchivePlan, ArchiveSelection};
use crate::request::DownloadRequest;
use crate::tools::ConversionTools;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// One `(archive, stream)` combination to try for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub archive: Archive,
    /// Only meaningful for RINEX 3.
    pub stream: Option<Stream>,
    /// Sample rate, seconds, of the RINEX 3 file asked for.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalAttempt {
    pub archive: Archive,
    pub stream: Option<Stream>,
    pub found: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub candidate: Candidate,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// Fetched and converted to an observation file.
    Retrieved,
    /// Observation file was already on disk; nothing fetched.
    Existing,
    NotFound,
    /// Fetched, but a conversion stage failed; `path` is the last good artifact.
    ConversionFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub date: ObservationDate,
    pub status: DayStatus,
    /// Observation file, or the expected one when the day failed.
    pub path: String,
    pub archive: Option<Archive>,
    pub stream: Option<Stream>,
    pub stage: Option<RinexStage>,
    pub attempts: Vec<RetrievalAttempt>,
    pub notes: Vec<String>,
}

impl DayReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, DayStatus::Retrieved | DayStatus::Existing)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub station: String,
    pub version: RinexVersion,
    pub rate: Rate,
    pub selection: ArchiveSelection,
    pub stream: Option<Stream>,
    pub sample_rate: Option<u32>,
    pub notices: Vec<String>,
    pub days: Vec<DayReport>,
    pub finished_at: String,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.days.iter().filter(|day| day.is_success()).count()
    }
}

/// Ordered `(archive, stream)` candidates for one day. Each pair appears at most once.
pub fn candidates(version: RinexVersion, rate: Rate, plan: &ArchivePlan) -> Vec<Candidate> {
    let stream = plan.stream;
    let rinex3 = |archive: Archive, stream: Stream| Candidate {
        archive,
        stream: Some(stream),
        sample_rate: archive.rinex3_sample_rate(plan.sample_rate),
    };
    match (version, &plan.selection) {
        (RinexVersion::V3, ArchiveSelection::Single(archive)) if rate == Rate::High => {
            vec![rinex3(*archive, stream)]
        }
        (RinexVersion::V3, ArchiveSelection::Single(archive)) => [stream, stream.swapped()]
            .into_iter()
            .map(|stream| rinex3(*archive, stream))
            .collect(),
        (RinexVersion::V3, ArchiveSelection::SearchAll(archives))
        | (RinexVersion::V3, ArchiveSelection::Fallback(archives)) => [stream, stream.swapped()]
            .into_iter()
            .flat_map(|stream| archives.iter().map(move |archive| rinex3(*archive, stream)))
            .collect(),
        (RinexVersion::V2, ArchiveSelection::Single(archive)) => vec![Candidate {
            archive: *archive,
            stream: None,
            sample_rate: plan.sample_rate,
        }],
        (RinexVersion::V2, ArchiveSelection::Fallback(archives))
        | (RinexVersion::V2, ArchiveSelection::SearchAll(archives)) => archives
            .iter()
            .map(|archive| Candidate {
                archive: *archive,
                stream: None,
                sample_rate: plan.sample_rate,
            })
            .collect(),
    }
}

/// Tries candidates in order and stops at the first one that yields a file.
pub fn first_found<F>(
    candidates: &[Candidate],
    mut attempt: F,
) -> (Option<Found>, Vec<RetrievalAttempt>)
where
    F: FnMut(&Candidate) -> Result<Option<PathBuf>, RinexError>,
{
    let mut attempts = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let (path, error) = match attempt(candidate) {
            Ok(path) => (path, None),
            Err(err) => (None, Some(err.to_string())),
        };
        attempts.push(RetrievalAttempt {
            archive: candidate.archive,
            stream: candidate.stream,
            found: path.is_some(),
            error,
        });
        if let Some(path) = path {
            return (
                Some(Found {
                    candidate: *candidate,
                    path,
                }),
                attempts,
            );
        }
    }
    (None, attempts)
}

/// Retrieval engine: resolves the archive plan, then walks the day range one day at
/// a time. Days are independent; a failed day never stops the ones after it.
pub struct Downloader<A: ArchiveClient, T: ConversionTools> {
    output_dir: PathBuf,
    archive: A,
    pipeline: ConversionPipeline<T>,
}

impl<A: ArchiveClient, T: ConversionTools> Downloader<A, T> {
    pub fn new(settings: &Settings, archive: A, tools: T) -> Self {
        Self::new_with_output(settings.output_dir.as_std_path(), archive, tools)
    }

    pub fn new_with_output(output_dir: &Path, archive: A, tools: T) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            archive,
            pipeline: ConversionPipeline::new(tools),
        }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn run(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, RinexError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; station {} RINEX {}",
                request.station, request.version
            ),
            elapsed: None,
        });
        let plan = policy::resolve(request)?;
        let is_v3 = request.version == RinexVersion::V3;

        let days = request
            .days()
            .iter()
            .map(|date| self.retrieve_day(request, &plan, *date, sink))
            .collect();

        Ok(DownloadReport {
            station: request.station.to_string(),
            version: request.version,
            rate: request.rate,
            selection: plan.selection.clone(),
            stream: is_v3.then_some(plan.stream),
            sample_rate: is_v3.then_some(plan.sample_rate),
            notices: plan.notices.clone(),
            days,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn retrieve_day(
        &self,
        request: &DownloadRequest,
        plan: &ArchivePlan,
        date: ObservationDate,
        sink: &dyn ProgressSink,
    ) -> DayReport {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; {} {date} from {}",
                request.station,
                plan.selection.label()
            ),
            elapsed: None,
        });
        let candidates = candidates(request.version, request.rate, plan);
        let expected = self.expected_observations(request, &candidates, &date);

        let mut report = if let Some(existing) = expected
            .iter()
            .find(|path| !request.force && path.is_file())
        {
            debug!(path = %existing.display(), "observation file already present");
            DayReport {
                date,
                status: DayStatus::Existing,
                path: existing.display().to_string(),
                archive: None,
                stream: None,
                stage: Some(RinexStage::Translated),
                attempts: Vec::new(),
                notes: Vec::new(),
            }
        } else {
            self.fetch_and_convert(request, &candidates, date, &expected[0], sink)
        };

        if request.version == RinexVersion::V2 && request.strip {
            self.strip_day(&expected[0], &mut report);
        }

        match report.status {
            DayStatus::Retrieved | DayStatus::Existing => info!("SUCCESS: {}", report.path),
            DayStatus::NotFound => info!("FAILURE: {} was not found", report.path),
            DayStatus::ConversionFailed => warn!("FAILURE: {} could not be converted", report.path),
        }
        report
    }

    fn fetch_and_convert(
        &self,
        request: &DownloadRequest,
        candidates: &[Candidate],
        date: ObservationDate,
        expected: &Path,
        sink: &dyn ProgressSink,
    ) -> DayReport {
        let start = Instant::now();
        let (found, attempts) = first_found(candidates, |candidate| {
            let query = ArchiveQuery {
                station: request.station.clone(),
                date,
                archive: candidate.archive,
                version: request.version,
                rate: request.rate,
                stream: candidate.stream.unwrap_or_default(),
                sample_rate: candidate.sample_rate,
            };
            debug!(archive = %query.archive, stream = %query.stream, doy = date.doy, "attempt");
            let result = self.archive.fetch(&query, &self.output_dir);
            if let Err(err) = &result {
                warn!(archive = %query.archive, %err, "archive request failed");
            }
            result
        });
        sink.event(ProgressEvent {
            message: format!("archive.response attempts={}", attempts.len()),
            elapsed: Some(start.elapsed()),
        });

        let mut report = DayReport {
            date,
            status: DayStatus::NotFound,
            path: expected.display().to_string(),
            archive: None,
            stream: None,
            stage: None,
            attempts,
            notes: Vec::new(),
        };
        let Some(found) = found else {
            return report;
        };
        report.archive = Some(found.candidate.archive);
        report.stream = found.candidate.stream;

        sink.event(ProgressEvent {
            message: "phase=Convert; producing observation file".to_string(),
            elapsed: None,
        });
        let converted = RinexFile::classify(found.path.clone())
            .and_then(|file| self.pipeline.to_observation(file));
        let observation = match converted {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %found.path.display(), %err, "conversion failed");
                let remaining = last_artifact(&found.path);
                report.status = DayStatus::ConversionFailed;
                report.path = remaining.display().to_string();
                report.stage = RinexFile::classify(remaining).ok().map(|file| file.stage());
                report.notes.push(err.to_string());
                return report;
            }
        };

        let observation = if request.version == RinexVersion::V2
            && request.rate == Rate::High
            && request.strip_snr
        {
            match self.pipeline.strip(observation.path(), StripMode::Snr) {
                Ok(Some(stripped)) => stripped,
                Ok(None) => observation,
                Err(err) => {
                    warn!(%err, "SNR strip failed");
                    report.notes.push(format!("SNR strip failed: {err}"));
                    observation
                }
            }
        } else {
            observation
        };

        report.status = DayStatus::Retrieved;
        report.path = observation.path().display().to_string();
        report.stage = Some(observation.stage());
        report
    }

    fn strip_day(&self, observation: &Path, report: &mut DayReport) {
        match self.pipeline.strip(observation, StripMode::Observables) {
            Ok(Some(file)) => {
                if report.is_success() {
                    report.stage = Some(file.stage());
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = %observation.display(), %err, "strip failed");
                report.notes.push(format!("strip failed: {err}"));
            }
        }
    }

    /// Final observation paths a day can end up at, in candidate order. The first entry
    /// is the primary one and never missing.
    fn expected_observations(
        &self,
        request: &DownloadRequest,
        candidates: &[Candidate],
        date: &ObservationDate,
    ) -> Vec<PathBuf> {
        match request.version {
            RinexVersion::V2 => vec![
                self.output_dir
                    .join(naming::rinex2_observation(&request.station, date)),
            ],
            RinexVersion::V3 => {
                let mut paths: Vec<PathBuf> = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let path = self.output_dir.join(naming::rinex3_observation(
                        &request.station,
                        date,
                        candidate.stream.unwrap_or_default(),
                        candidate.sample_rate,
                    ));
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                paths
            }
        }
    }
}

/// The fetched file, or its decompressed form when only the translation failed.
fn last_artifact(fetched: &Path) -> PathBuf {
    if fetched.exists() {
        return fetched.to_path_buf();
    }
    naming::decompressed_path(fetched)
        .filter(|path| path.exists())
        .unwrap_or_else(|| fetched.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(selection: ArchiveSelection) -> ArchivePlan {
        ArchivePlan {
            selection,
            stream: Stream::R,
            sample_rate: 30,
            notices: Vec::new(),
        }
    }

    #[test]
    fn v3_single_archive_tries_swapped_stream_once() {
        let candidates = candidates(
            RinexVersion::V3,
            Rate::Low,
            &plan(ArchiveSelection::Single(Archive::Bkg)),
        );
        assert_eq!(
            candidates,
            vec![
                Candidate {
                    archive: Archive::Bkg,
                    stream: Some(Stream::R),
                    sample_rate: 30,
                },
                Candidate {
                    archive: Archive::Bkg,
                    stream: Some(Stream::S),
                    sample_rate: 30,
                },
            ]
        );
    }

    #[test]
    fn v3_search_all_is_stream_major() {
        let candidates = candidates(
            RinexVersion::V3,
            Rate::Low,
            &plan(ArchiveSelection::SearchAll(vec![Archive::Cddis, Archive::Bkg])),
        );
        let order: Vec<_> = candidates
            .iter()
            .map(|c| (c.archive, c.stream.unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Archive::Cddis, Stream::R),
                (Archive::Bkg, Stream::R),
                (Archive::Cddis, Stream::S),
                (Archive::Bkg, Stream::S),
            ]
        );
    }

    #[test]
    fn v3_search_all_asks_unavco_for_its_own_rate() {
        let candidates = candidates(
            RinexVersion::V3,
            Rate::Low,
            &plan(ArchiveSelection::SearchAll(vec![Archive::Cddis, Archive::Unavco])),
        );
        let rates: Vec<_> = candidates
            .iter()
            .map(|c| (c.archive, c.sample_rate))
            .collect();
        assert_eq!(
            rates,
            vec![
                (Archive::Cddis, 30),
                (Archive::Unavco, 15),
                (Archive::Cddis, 30),
                (Archive::Unavco, 15),
            ]
        );
    }

    #[test]
    fn v3_high_rate_has_no_stream_fallback() {
        let candidates = candidates(
            RinexVersion::V3,
            Rate::High,
            &plan(ArchiveSelection::Single(Archive::Cddis)),
        );
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn first_found_short_circuits() {
        let candidates = candidates(
            RinexVersion::V2,
            Rate::Low,
            &plan(ArchiveSelection::Fallback(vec![
                Archive::Unavco,
                Archive::Sopac,
                Archive::Sonel,
            ])),
        );
        let mut seen = Vec::new();
        let (found, attempts) = first_found(&candidates, |candidate| {
            seen.push(candidate.archive);
            Ok((candidate.archive == Archive::Sopac).then(|| PathBuf::from("p0410070.23d.Z")))
        });
        assert_eq!(seen, vec![Archive::Unavco, Archive::Sopac]);
        assert_eq!(found.unwrap().candidate.archive, Archive::Sopac);
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].found);
    }

    #[test]
    fn first_found_records_errors_and_continues() {
        let candidates = [
            Candidate {
                archive: Archive::Unavco,
                stream: None,
                sample_rate: 30,
            },
            Candidate {
                archive: Archive::Sopac,
                stream: None,
                sample_rate: 30,
            },
        ];
        let (found, attempts) = first_found(&candidates, |candidate| match candidate.archive {
            Archive::Unavco => Err(RinexError::ArchiveHttp("timeout".to_string())),
            _ => Ok(None),
        });
        assert!(found.is_none());
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].error.is_some());
    }
}
