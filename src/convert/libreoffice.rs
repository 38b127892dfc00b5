//! LibreOffice command-line conversion (`soffice --headless --convert-to pdf`)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::{run_with_timeout, Converter, DEFAULT_TIMEOUT};
use crate::error::ConversionError;
use crate::model::FileFormat;

/// Install locations checked when `soffice` is not on `PATH`
const KNOWN_LOCATIONS: &[&str] = &[
    r"C:\Program Files\LibreOffice\program\soffice.exe",
    r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    "/usr/lib/libreoffice/program/soffice",
    "/opt/libreoffice/program/soffice",
    "/snap/bin/libreoffice",
];

pub struct LibreOffice {
    program: PathBuf,
    timeout: Duration,
}

impl LibreOffice {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Find an installation: `SOFFICE_PATH`, then `PATH`, then known locations
    pub fn locate() -> Option<Self> {
        if let Ok(path) = env::var("SOFFICE_PATH") {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Some(Self::new(path));
            }
            debug!(path = %path.display(), "SOFFICE_PATH does not point at a file");
        }

        ["soffice", "libreoffice"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .or_else(|| {
                KNOWN_LOCATIONS
                    .iter()
                    .map(PathBuf::from)
                    .find(|path| path.is_file())
            })
            .map(Self::new)
    }
}

impl Converter for LibreOffice {
    fn name(&self) -> &str {
        "LibreOffice"
    }

    fn supports(&self, format: FileFormat) -> bool {
        format.is_convertible()
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let outdir = output.parent().unwrap_or_else(|| Path::new("."));
        // soffice names its output after the input stem
        let produced = outdir.join(
            input
                .file_stem()
                .map(|stem| format!("{}.pdf", stem.to_string_lossy()))
                .unwrap_or_else(|| "output.pdf".to_string()),
        );
        let _ = fs::remove_file(&produced);

        let mut command = Command::new(&self.program);
        command
            .args(["--headless", "--norestore", "--nologo", "--convert-to", "pdf", "--outdir"])
            .arg(outdir)
            .arg(input);
        run_with_timeout(&mut command, self.name(), input, self.timeout)?;

        if produced != output {
            fs::rename(&produced, output).map_err(|source| ConversionError::Io {
                path: produced.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
