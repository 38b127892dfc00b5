//! Office document to PDF conversion
//!
//! Conversion is delegated to external programs. Each program sits behind the
//! [`Converter`] trait and [`ConverterChain`] tries them in preference order,
//! falling back to a repaired copy of the package when every backend rejects
//! the original.

pub mod libreoffice;
pub mod office;
pub mod repair;
pub mod unoserver;

use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ConversionError;
use crate::model::FileFormat;

pub use libreoffice::LibreOffice;
pub use office::OfficeAutomation;
pub use unoserver::Unoserver;

/// Default time a single backend may spend on one file
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One way of turning an office file into a PDF
pub trait Converter {
    /// Short name used in logs and summaries
    fn name(&self) -> &str;

    fn supports(&self, format: FileFormat) -> bool;

    /// Convert `input` and write the result to exactly `output`
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Outcome of a successful conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    pub output: PathBuf,
    pub backend: String,
    /// The package had to be repaired first
    pub repaired: bool,
}

/// Ordered list of converter backends
pub struct ConverterChain {
    backends: Vec<Box<dyn Converter>>,
    repair: bool,
}

impl ConverterChain {
    pub fn new(backends: Vec<Box<dyn Converter>>) -> Self {
        Self {
            backends,
            repair: true,
        }
    }

    /// Disable the repair-and-retry pass
    pub fn without_repair(mut self) -> Self {
        self.repair = false;
        self
    }

    /// Build the chain from whatever is installed
    ///
    /// Native Office automation comes first where it exists, then a running
    /// unoserver, then a LibreOffice install. `PESU_CONVERTER` restricts the
    /// chain to one backend.
    pub fn probe() -> Self {
        let forced = env::var("PESU_CONVERTER")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());

        let mut backends: Vec<Box<dyn Converter>> = Vec::new();
        let wanted = |name: &str| forced.as_deref().map_or(true, |f| f == name);

        if wanted("office") {
            if let Some(office) = OfficeAutomation::locate() {
                backends.push(Box::new(office));
            }
        }
        if wanted("unoserver") {
            if let Some(uno) = Unoserver::locate() {
                backends.push(Box::new(uno));
            }
        }
        if wanted("libreoffice") {
            if let Some(soffice) = LibreOffice::locate() {
                backends.push(Box::new(soffice));
            }
        }

        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        if backends.is_empty() {
            warn!("no document converter found; office files will be kept unconverted");
        } else {
            info!(backends = ?names, "converter backends");
        }
        Self::new(backends)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Convert one file to a PDF next to it
    pub fn convert(&self, input: &Path) -> Result<Conversion, ConversionError> {
        let format = FileFormat::from_extension(input);
        let output = input.with_extension("pdf");

        let candidates: Vec<&dyn Converter> = self
            .backends
            .iter()
            .map(|b| b.as_ref())
            .filter(|b| b.supports(format))
            .collect();
        if candidates.is_empty() {
            return Err(ConversionError::NoBackend(input.to_path_buf()));
        }

        let mut attempts = Vec::new();
        if let Some(backend) = run_candidates(&candidates, input, &output, &mut attempts) {
            return Ok(Conversion {
                output,
                backend,
                repaired: false,
            });
        }

        if self.repair && format.is_zip_package() {
            match repair::repair_package(input) {
                Ok(repaired) => {
                    info!(file = %input.display(), "retrying with repaired package");
                    let result = run_candidates(&candidates, &repaired, &output, &mut attempts);
                    let _ = fs::remove_file(&repaired);
                    if let Some(backend) = result {
                        return Ok(Conversion {
                            output,
                            backend,
                            repaired: true,
                        });
                    }
                }
                Err(e) => attempts.push(e.to_string()),
            }
        }

        Err(ConversionError::Exhausted {
            path: input.to_path_buf(),
            attempts,
        })
    }
}

fn run_candidates(
    candidates: &[&dyn Converter],
    input: &Path,
    output: &Path,
    attempts: &mut Vec<String>,
) -> Option<String> {
    for backend in candidates {
        debug!(backend = backend.name(), file = %input.display(), "converting");
        let result = backend
            .convert(input, output)
            .and_then(|()| validate_pdf(backend.name(), output));
        match result {
            Ok(()) => return Some(backend.name().to_string()),
            Err(e) => {
                debug!("{}", e);
                let _ = fs::remove_file(output);
                attempts.push(e.to_string());
            }
        }
    }
    None
}

/// A converter's output must exist, be non-empty and look like a PDF
fn validate_pdf(backend: &str, path: &Path) -> Result<(), ConversionError> {
    let invalid = |reason: &str| ConversionError::Backend {
        backend: backend.to_string(),
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let len = fs::metadata(path).map_err(|_| invalid("produced no output"))?.len();
    if len == 0 {
        return Err(invalid("produced an empty file"));
    }

    let mut header = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map_err(|_| invalid("output is not a PDF"))?;
    if &header != b"%PDF" {
        return Err(invalid("output is not a PDF"));
    }
    Ok(())
}

/// Run a converter process, killing it if it outlives `timeout`
///
/// Stderr is drained on a separate thread while the child runs and only
/// shows up in the error of a failed exit.
pub(crate) fn run_with_timeout(
    command: &mut Command,
    backend: &str,
    input: &Path,
    timeout: Duration,
) -> Result<(), ConversionError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConversionError::Backend {
            backend: backend.to_string(),
            path: input.to_path_buf(),
            reason: format!("could not start: {}", e),
        })?;

    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });

    let started = Instant::now();
    loop {
        let status = child.try_wait().map_err(|source| ConversionError::Io {
            path: input.to_path_buf(),
            source,
        })?;

        if let Some(status) = status {
            if status.success() {
                return Ok(());
            }
            let text = stderr
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            return Err(ConversionError::Backend {
                backend: backend.to_string(),
                path: input.to_path_buf(),
                reason: format!("exited with {}: {}", status, text.trim()),
            });
        }

        if started.elapsed() > timeout {
            // Backend helpers may still hold the pipe; the reader is not joined
            let _ = child.kill();
            let _ = child.wait();
            return Err(ConversionError::Timeout {
                backend: backend.to_string(),
                path: input.to_path_buf(),
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(Duration::from_millis(200));
    }
}
