//! Conversion through a running unoserver instance (`unoconvert` client)
//!
//! unoserver keeps one LibreOffice process warm, which is much faster than a
//! cold `soffice` start per file.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{run_with_timeout, Converter, DEFAULT_TIMEOUT};
use crate::error::ConversionError;
use crate::model::FileFormat;

pub struct Unoserver {
    client: PathBuf,
    timeout: Duration,
}

impl Unoserver {
    pub fn new(client: impl Into<PathBuf>) -> Self {
        Self {
            client: client.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn locate() -> Option<Self> {
        which::which("unoconvert").ok().map(Self::new)
    }
}

impl Converter for Unoserver {
    fn name(&self) -> &str {
        "unoserver"
    }

    fn supports(&self, format: FileFormat) -> bool {
        format.is_convertible()
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let mut command = Command::new(&self.client);
        command.args(["--convert-to", "pdf"]).arg(input).arg(output);
        run_with_timeout(&mut command, self.name(), input, self.timeout)
    }
}
