use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RinexError;
use crate::naming::{self, Compression, Content};
use crate::tools::ConversionTools;

/// Format state of a RINEX artifact, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RinexStage {
    /// Still compressed, as fetched from the archive.
    Fetched,
    /// Decompressed Hatanaka file.
    Decompressed,
    /// Full observation file.
    Translated,
    /// Observation file reduced to SNR observables.
    Stripped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RinexFile {
    path: PathBuf,
    stage: RinexStage,
}

impl RinexFile {
    /// Infers the stage from the file name.
    pub fn classify(path: impl Into<PathBuf>) -> Result<Self, RinexError> {
        let path = path.into();
        let info = naming::describe(&path).ok_or_else(|| {
            RinexError::Conversion(format!("not a RINEX observation file: {}", path.display()))
        })?;
        let stage = match (info.compression, info.content) {
            (Some(_), _) => RinexStage::Fetched,
            (None, Content::Hatanaka) => RinexStage::Decompressed,
            (None, Content::Observation) => RinexStage::Translated,
        };
        Ok(Self { path, stage })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> RinexStage {
        self.stage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMode {
    /// teqc, keeps S1/S2/S5/S6/S7/S8.
    Observables,
    /// gfzrnx, keeps every S observation type.
    Snr,
}

/// Advances fetched files to observation form, removing each intermediate once the
/// next stage exists. A failing stage leaves its input on disk untouched.
#[derive(Debug, Clone)]
pub struct ConversionPipeline<T: ConversionTools> {
    tools: T,
}

impl<T: ConversionTools> ConversionPipeline<T> {
    pub fn new(tools: T) -> Self {
        Self { tools }
    }

    /// Runs one stage transition. Observation files come back unchanged.
    pub fn advance(&self, file: RinexFile) -> Result<RinexFile, RinexError> {
        match file.stage {
            RinexStage::Fetched => {
                let info = naming::describe(&file.path).ok_or_else(|| {
                    RinexError::Conversion(format!("unrecognized file: {}", file.path.display()))
                })?;
                let output = match info.compression {
                    Some(Compression::Gzip) => gunzip(&file.path)?,
                    Some(Compression::Lzw) => self.tools.uncompress(&file.path)?,
                    None => return RinexFile::classify(file.path),
                };
                remove_superseded(&file.path);
                RinexFile::classify(output)
            }
            RinexStage::Decompressed => {
                let output = self.tools.hatanaka_to_observation(&file.path)?;
                remove_superseded(&file.path);
                Ok(RinexFile {
                    path: output,
                    stage: RinexStage::Translated,
                })
            }
            RinexStage::Translated | RinexStage::Stripped => Ok(file),
        }
    }

    /// Decompresses and translates until the file is an observation file.
    pub fn to_observation(&self, file: RinexFile) -> Result<RinexFile, RinexError> {
        let mut current = file;
        while current.stage < RinexStage::Translated {
            let before = current.stage;
            current = self.advance(current)?;
            debug!(path = %current.path.display(), from = ?before, to = ?current.stage, "advanced");
        }
        Ok(current)
    }

    /// Strips an observation file in place. A missing file is a no-op (`Ok(None)`).
    pub fn strip(&self, path: &Path, mode: StripMode) -> Result<Option<RinexFile>, RinexError> {
        if !path.is_file() {
            debug!(path = %path.display(), "nothing to strip");
            return Ok(None);
        }
        let file = RinexFile::classify(path)?;
        if file.stage < RinexStage::Translated {
            return Err(RinexError::Conversion(format!(
                "cannot strip {} before it is an observation file",
                path.display()
            )));
        }

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(".rinex-fetch-strip")
            .tempfile_in(parent)
            .map_err(|err| RinexError::Filesystem(err.to_string()))?;
        match mode {
            StripMode::Observables => self.tools.strip_observables(path, temp.path())?,
            StripMode::Snr => self.tools.strip_to_snr(path, temp.path())?,
        }
        temp.persist(path)
            .map_err(|err| RinexError::Filesystem(err.to_string()))?;
        Ok(Some(RinexFile {
            path: path.to_path_buf(),
            stage: RinexStage::Stripped,
        }))
    }
}

fn gunzip(input: &Path) -> Result<PathBuf, RinexError> {
    let output = naming::decompressed_path(input).ok_or_else(|| {
        RinexError::Conversion(format!("not a gzip file name: {}", input.display()))
    })?;
    let file = File::open(input)
        .map_err(|err| RinexError::Filesystem(format!("open {}: {err}", input.display())))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".rinex-fetch-gunzip")
        .tempfile_in(parent)
        .map_err(|err| RinexError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut temp)
        .map_err(|err| RinexError::Conversion(format!("gunzip {}: {err}", input.display())))?;
    temp.persist(&output)
        .map_err(|err| RinexError::Filesystem(err.to_string()))?;
    Ok(output)
}

fn remove_superseded(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), %err, "could not remove intermediate file");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression as Level;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::tools::ToolInfo;

    /// Stand-in for CRX2RNX/gzip/teqc that rewrites files with a marker.
    struct FakeTools;

    impl ConversionTools for FakeTools {
        fn hatanaka_to_observation(&self, input: &Path) -> Result<PathBuf, RinexError> {
            let output = naming::translated_path(input).unwrap();
            let content = fs::read_to_string(input).unwrap();
            fs::write(&output, format!("OBS:{content}")).unwrap();
            Ok(output)
        }

        fn uncompress(&self, input: &Path) -> Result<PathBuf, RinexError> {
            let output = naming::decompressed_path(input).unwrap();
            fs::rename(input, &output).unwrap();
            Ok(output)
        }

        fn strip_observables(&self, _input: &Path, output: &Path) -> Result<(), RinexError> {
            fs::write(output, "SNR").unwrap();
            Ok(())
        }

        fn strip_to_snr(&self, _input: &Path, _output: &Path) -> Result<(), RinexError> {
            Err(RinexError::Conversion("gfzrnx exited with 1".to_string()))
        }

        fn tool_info(&self) -> ToolInfo {
            ToolInfo {
                crx2rnx: None,
                gzip: None,
                teqc: None,
                gfzrnx: None,
            }
        }
    }

    fn gz(path: &Path, content: &str) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Level::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn crx_gz_becomes_rnx_and_intermediates_are_removed() {
        let temp = tempfile::tempdir().unwrap();
        let fetched = temp.path().join("MCHL00AUS_R_20230070000_01D_30S_MO.crx.gz");
        gz(&fetched, "crx-body");

        let pipeline = ConversionPipeline::new(FakeTools);
        let file = pipeline
            .to_observation(RinexFile::classify(&fetched).unwrap())
            .unwrap();

        assert_eq!(file.stage(), RinexStage::Translated);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "OBS:crx-body");
        assert!(!fetched.exists());
        assert!(!temp.path().join("MCHL00AUS_R_20230070000_01D_30S_MO.crx").exists());
    }

    #[test]
    fn unix_compressed_rinex2_goes_through_tools() {
        let temp = tempfile::tempdir().unwrap();
        let fetched = temp.path().join("p0410070.23d.Z");
        fs::write(&fetched, "hatanaka").unwrap();

        let pipeline = ConversionPipeline::new(FakeTools);
        let file = pipeline
            .to_observation(RinexFile::classify(&fetched).unwrap())
            .unwrap();
        assert_eq!(file.path(), temp.path().join("p0410070.23o"));
    }

    #[test]
    fn strip_missing_file_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = ConversionPipeline::new(FakeTools);
        let result = pipeline
            .strip(&temp.path().join("p0410070.23o"), StripMode::Observables)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn strip_overwrites_in_place() {
        let temp = tempfile::tempdir().unwrap();
        let obs = temp.path().join("p0410070.23o");
        fs::write(&obs, "full").unwrap();
        let pipeline = ConversionPipeline::new(FakeTools);
        let file = pipeline.strip(&obs, StripMode::Observables).unwrap().unwrap();
        assert_eq!(file.stage(), RinexStage::Stripped);
        assert_eq!(fs::read_to_string(&obs).unwrap(), "SNR");
    }

    #[test]
    fn strip_refuses_hatanaka_input() {
        let temp = tempfile::tempdir().unwrap();
        let crx = temp.path().join("p0410070.23d");
        fs::write(&crx, "compact").unwrap();
        let pipeline = ConversionPipeline::new(FakeTools);
        assert_matches!(
            pipeline.strip(&crx, StripMode::Observables),
            Err(RinexError::Conversion(_))
        );
    }

    #[test]
    fn failed_strip_leaves_file_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let obs = temp.path().join("p0410070.23o");
        fs::write(&obs, "full").unwrap();
        let pipeline = ConversionPipeline::new(FakeTools);
        assert!(pipeline.strip(&obs, StripMode::Snr).is_err());
        assert_eq!(fs::read_to_string(&obs).unwrap(), "full");
    }
}
