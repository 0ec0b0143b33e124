use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;
use serde::Serialize;
use tracing::debug;

use crate::error::RinexError;
use crate::naming;

pub const CRX2RNX: &str = "CRX2RNX";
pub const GZIP: &str = "gzip";
pub const TEQC: &str = "teqc";
pub const GFZRNX: &str = "gfzrnx";

/// Observables kept when stripping a RINEX 2 file down to signal strength.
const SNR_OBSERVABLES: &str = "S1+S2+S5+S6+S7+S8";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub crx2rnx: Option<String>,
    pub gzip: Option<String>,
    pub teqc: Option<String>,
    pub gfzrnx: Option<String>,
}

/// External executables the conversion pipeline relies on.
///
/// Every operation writes a complete new file or fails; inputs are left alone.
pub trait ConversionTools: Send + Sync {
    /// Hatanaka (`.crx` / `.YYd`) to observation (`.rnx` / `.YYo`) next to the input.
    fn hatanaka_to_observation(&self, input: &Path) -> Result<PathBuf, RinexError>;
    /// Removes a unix-compress (`.Z`) layer, next to the input.
    fn uncompress(&self, input: &Path) -> Result<PathBuf, RinexError>;
    /// teqc-style strip to SNR observables.
    fn strip_observables(&self, input: &Path, output: &Path) -> Result<(), RinexError>;
    /// gfzrnx strip to SNR observation types.
    fn strip_to_snr(&self, input: &Path, output: &Path) -> Result<(), RinexError>;
    fn tool_info(&self) -> ToolInfo;
}

#[derive(Debug, Clone)]
pub enum ToolStatus {
    Ready,
    Missing { message: String },
}

#[derive(Debug, Clone)]
pub struct SystemTools {
    crx2rnx: Option<PathBuf>,
    gzip: Option<PathBuf>,
    teqc: Option<PathBuf>,
    gfzrnx: Option<PathBuf>,
}

impl SystemTools {
    /// Looks each executable up in `exe_dir` first, then on `PATH`.
    pub fn new(exe_dir: Option<&Utf8Path>) -> Self {
        let locate = |name: &str| {
            exe_dir
                .and_then(|dir| find_in_dir(dir.as_std_path(), name))
                .or_else(|| find_in_path(name))
        };
        Self {
            crx2rnx: locate(CRX2RNX),
            gzip: locate(GZIP),
            teqc: locate(TEQC),
            gfzrnx: locate(GFZRNX),
        }
    }

    /// Whether the minimum toolset for producing observation files is present.
    pub fn tool_status(&self) -> ToolStatus {
        if self.crx2rnx.is_none() {
            return ToolStatus::Missing {
                message: "missing CRX2RNX (Hatanaka decompression)".to_string(),
            };
        }
        if self.gzip.is_none() {
            return ToolStatus::Missing {
                message: "missing gzip (needed for .Z archives)".to_string(),
            };
        }
        ToolStatus::Ready
    }

    fn require<'a>(tool: &'a Option<PathBuf>, name: &str) -> Result<&'a PathBuf, RinexError> {
        tool.as_ref()
            .ok_or_else(|| RinexError::MissingTool(name.to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<Vec<u8>, RinexError> {
        debug!(program = %program.display(), ?args, "running external tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| RinexError::Conversion(format!("{}: {err}", program.display())))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} ({})", program.display(), output.status)
        } else {
            stderr
        };
        Err(RinexError::Conversion(message))
    }
}

impl ConversionTools for SystemTools {
    fn hatanaka_to_observation(&self, input: &Path) -> Result<PathBuf, RinexError> {
        let crx2rnx = Self::require(&self.crx2rnx, CRX2RNX)?;
        let output = naming::translated_path(input).ok_or_else(|| {
            RinexError::Conversion(format!("not a Hatanaka file name: {}", input.display()))
        })?;
        let args = vec!["-f".to_string(), input.to_string_lossy().to_string()];
        self.run_cmd(crx2rnx, &args)?;
        expect_output(&output, CRX2RNX)
    }

    fn uncompress(&self, input: &Path) -> Result<PathBuf, RinexError> {
        let gzip = Self::require(&self.gzip, GZIP)?;
        let output = naming::decompressed_path(input).ok_or_else(|| {
            RinexError::Conversion(format!("not a compressed file name: {}", input.display()))
        })?;
        let args = vec![
            "-d".to_string(),
            "-f".to_string(),
            input.to_string_lossy().to_string(),
        ];
        self.run_cmd(gzip, &args)?;
        expect_output(&output, GZIP)
    }

    fn strip_observables(&self, input: &Path, output: &Path) -> Result<(), RinexError> {
        let teqc = Self::require(&self.teqc, TEQC)?;
        let args = vec![
            "-O.obs".to_string(),
            SNR_OBSERVABLES.to_string(),
            input.to_string_lossy().to_string(),
        ];
        let stdout = self.run_cmd(teqc, &args)?;
        if stdout.is_empty() {
            return Err(RinexError::Conversion("teqc produced no output".to_string()));
        }
        fs::write(output, stdout).map_err(|err| RinexError::Filesystem(err.to_string()))
    }

    fn strip_to_snr(&self, input: &Path, output: &Path) -> Result<(), RinexError> {
        let gfzrnx = Self::require(&self.gfzrnx, GFZRNX)?;
        let args = vec![
            "-finp".to_string(),
            input.to_string_lossy().to_string(),
            "-fout".to_string(),
            output.to_string_lossy().to_string(),
            "-vo".to_string(),
            "2".to_string(),
            "-obs_types".to_string(),
            "S".to_string(),
            "-f".to_string(),
            "-q".to_string(),
        ];
        self.run_cmd(gfzrnx, &args)?;
        expect_output(output, GFZRNX).map(|_| ())
    }

    fn tool_info(&self) -> ToolInfo {
        let show = |path: &Option<PathBuf>| path.as_ref().map(|p| p.display().to_string());
        ToolInfo {
            crx2rnx: show(&self.crx2rnx),
            gzip: show(&self.gzip),
            teqc: show(&self.teqc),
            gfzrnx: show(&self.gfzrnx),
        }
    }
}

fn expect_output(path: &Path, tool: &str) -> Result<PathBuf, RinexError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(RinexError::Conversion(format!(
            "{tool} did not produce {}",
            path.display()
        )))
    }
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let exe = dir.join(format!("{name}.exe"));
    if exe.exists() {
        return Some(exe);
    }
    let plain = dir.join(name);
    plain.exists().then_some(plain)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| find_in_dir(&dir, name))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn exe_dir_takes_precedence() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(TEQC), b"").unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let tools = SystemTools::new(Some(&dir));
        let info = tools.tool_info();
        assert_eq!(
            info.teqc,
            Some(temp.path().join(TEQC).display().to_string())
        );
    }

    #[test]
    fn missing_tool_is_reported() {
        let tools = SystemTools {
            crx2rnx: None,
            gzip: None,
            teqc: None,
            gfzrnx: None,
        };
        assert_matches!(tools.tool_status(), ToolStatus::Missing { .. });
        let err = tools
            .hatanaka_to_observation(Path::new("p0410070.23d"))
            .unwrap_err();
        assert_matches!(err, RinexError::MissingTool(_));
    }
}
