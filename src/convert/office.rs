//! Native Microsoft Office automation
//!
//! PowerPoint and Word are driven over COM from a PowerShell one-liner, so no
//! COM bindings are needed on the Rust side. Only available on Windows.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{run_with_timeout, Converter, DEFAULT_TIMEOUT};
use crate::error::ConversionError;
use crate::model::FileFormat;

/// `PpSaveAsFileType.ppSaveAsPDF`
const PP_SAVE_AS_PDF: u32 = 32;
/// `WdSaveFormat.wdFormatPDF`
const WD_FORMAT_PDF: u32 = 17;

pub struct OfficeAutomation {
    powershell: PathBuf,
    timeout: Duration,
}

impl OfficeAutomation {
    pub fn new(powershell: impl Into<PathBuf>) -> Self {
        Self {
            powershell: powershell.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// PowerShell on Windows; `None` everywhere else
    pub fn locate() -> Option<Self> {
        if !cfg!(windows) {
            return None;
        }
        ["powershell.exe", "pwsh.exe"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }
}

/// Quote a path as a PowerShell single-quoted string
fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

/// COM script that opens `input` and saves it as PDF at `output`
pub fn automation_script(format: FileFormat, input: &Path, output: &Path) -> Option<String> {
    let (input, output) = (ps_quote(input), ps_quote(output));
    let script = if format.is_presentation() {
        format!(
            "$ErrorActionPreference = 'Stop'; \
             $app = New-Object -ComObject PowerPoint.Application; \
             try {{ $doc = $app.Presentations.Open({input}, $true, $false, $false); \
             $doc.SaveAs({output}, {PP_SAVE_AS_PDF}); $doc.Close() }} \
             finally {{ $app.Quit() }}"
        )
    } else if matches!(format, FileFormat::Docx | FileFormat::Doc) {
        format!(
            "$ErrorActionPreference = 'Stop'; \
             $app = New-Object -ComObject Word.Application; $app.Visible = $false; \
             try {{ $doc = $app.Documents.Open({input}, $false, $true); \
             $doc.SaveAs([ref] {output}, [ref] {WD_FORMAT_PDF}); $doc.Close([ref] 0) }} \
             finally {{ $app.Quit() }}"
        )
    } else {
        return None;
    };
    Some(script)
}

impl Converter for OfficeAutomation {
    fn name(&self) -> &str {
        "Microsoft Office"
    }

    fn supports(&self, format: FileFormat) -> bool {
        format.is_convertible()
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let absolute = |path: &Path| {
            std::path::absolute(path).map_err(|source| ConversionError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let format = FileFormat::from_extension(input);
        let script = automation_script(format, &absolute(input)?, &absolute(output)?)
            .ok_or_else(|| ConversionError::NoBackend(input.to_path_buf()))?;

        let mut command = Command::new(&self.powershell);
        command
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(script);
        run_with_timeout(&mut command, self.name(), input, self.timeout)
    }
}
