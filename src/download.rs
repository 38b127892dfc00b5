//! Resource listing and sequential downloads
//!
//! Every resource in a unit gets a sequence number when it is listed; the
//! number becomes a zero-padded file name prefix so a plain sort of the unit
//! directory is also the merge order.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{DownloadError, FetchError};
use crate::model::{
    FileFormat, LocalFile, Resource, ResourceKind, ResourceSource, ResourceState, Unit,
};
use crate::pdf::inspect_pdf_bytes;
use crate::portal::Portal;

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";

/// List a unit's resources in merge order
///
/// Classes are walked in portal order and, within each class, the selected
/// kinds in the order given. Sequence numbers start at 1 and run across the
/// whole unit.
pub fn list_resources(
    portal: &mut dyn Portal,
    unit: &Unit,
    kinds: &[ResourceKind],
) -> Result<Vec<Resource>, FetchError> {
    let classes = portal.list_classes(unit)?;
    info!(unit = %unit.name, classes = classes.len(), "listing resources");

    let mut resources = Vec::new();
    for class in &classes {
        for &kind in kinds {
            let links = portal.list_class_resources(unit, class, kind)?;
            if !links.is_empty() {
                debug!(class = %class.name, %kind, count = links.len(), "found resources");
            }
            for link in links {
                resources.push(Resource {
                    sequence: resources.len() + 1,
                    kind,
                    class_name: class.name.clone(),
                    title: link.title,
                    source: link.source,
                    width: 0,
                });
            }
        }
    }

    let width = Resource::prefix_width(resources.len());
    for resource in &mut resources {
        resource.width = width;
    }
    Ok(resources)
}

/// Guess a format from the `Content-Type` header
pub fn format_from_content_type(content_type: &str) -> Option<FileFormat> {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("pdf") {
        Some(FileFormat::Pdf)
    } else if ct.contains("presentationml") {
        Some(FileFormat::Pptx)
    } else if ct.contains("wordprocessingml") {
        Some(FileFormat::Docx)
    } else if ct.contains("spreadsheetml") {
        Some(FileFormat::Xlsx)
    } else if ct.contains("ms-powerpoint") {
        Some(FileFormat::Ppt)
    } else if ct.contains("msword") {
        Some(FileFormat::Doc)
    } else {
        None
    }
}

/// Identify a document from its leading bytes
///
/// Office Open XML files are zip packages, told apart by their top-level
/// directory (`ppt/`, `word/`, `xl/`). Legacy OLE files all share one magic
/// number, so the content type decides between `.ppt` and `.doc`.
pub fn detect_format(bytes: &[u8], content_type: Option<&str>) -> FileFormat {
    let hint = content_type.and_then(format_from_content_type);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let bytes = &bytes[start..];

    if bytes.starts_with(PDF_MAGIC) {
        FileFormat::Pdf
    } else if bytes.starts_with(ZIP_MAGIC) {
        ooxml_format(bytes)
            .or(hint.filter(|f| f.is_zip_package()))
            .unwrap_or(FileFormat::Pptx)
    } else if bytes.starts_with(OLE_MAGIC) {
        match hint {
            Some(FileFormat::Doc) | Some(FileFormat::Docx) => FileFormat::Doc,
            _ => FileFormat::Ppt,
        }
    } else {
        FileFormat::Unknown
    }
}

fn ooxml_format(bytes: &[u8]) -> Option<FileFormat> {
    let from_name = |name: &str| {
        if name.starts_with("ppt/") {
            Some(FileFormat::Pptx)
        } else if name.starts_with("word/") {
            Some(FileFormat::Docx)
        } else if name.starts_with("xl/") {
            Some(FileFormat::Xlsx)
        } else {
            None
        }
    };

    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive.file_names().find_map(from_name),
        Err(e) => {
            // Truncated packages lack a central directory; the local headers
            // near the start still name the first entries.
            debug!("zip directory unreadable ({}), scanning headers", e);
            let head: String = bytes.iter().take(512).map(|&b| b as char).collect();
            ["ppt/", "word/", "xl/"]
                .iter()
                .find(|marker| head.contains(*marker))
                .and_then(|marker| from_name(marker))
        }
    }
}

/// Fetches resources to disk, re-trying corrupt downloads
#[derive(Debug, Clone)]
pub struct Downloader {
    /// Total attempts per resource, including the first
    pub attempts: u32,
}

impl Default for Downloader {
    fn default() -> Self {
        Self { attempts: 2 }
    }
}

impl Downloader {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    /// Download one resource into `dir`
    ///
    /// Empty, unrecognisable or structurally damaged payloads count as
    /// corrupt and are fetched again; after the last attempt the error is
    /// returned and nothing is left on disk. A failed re-login is returned
    /// at once.
    pub fn download(
        &self,
        portal: &mut dyn Portal,
        resource: &Resource,
        dir: &Path,
    ) -> Result<LocalFile, DownloadError> {
        let name = resource.file_stem();
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.attempt(portal, resource, dir, &name) {
                Ok(file) => return Ok(file),
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => {
                    if attempt < self.attempts {
                        warn!("{} (attempt {}/{}), retrying", e, attempt, self.attempts);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DownloadError::Empty { name }))
    }

    fn attempt(
        &self,
        portal: &mut dyn Portal,
        resource: &Resource,
        dir: &Path,
        name: &str,
    ) -> Result<LocalFile, DownloadError> {
        let (content, content_type) = match &resource.source {
            ResourceSource::Link(url) => {
                let fetched = portal.fetch(url).map_err(|source| DownloadError::Fetch {
                    name: name.to_string(),
                    source,
                })?;
                if let Some(served) = &fetched.file_name {
                    debug!(file = %name, served = %served, "portal file name");
                }
                (fetched.content, fetched.content_type)
            }
            ResourceSource::Inline {
                content,
                content_type,
            } => (content.clone(), content_type.clone()),
        };

        if content.is_empty() {
            return Err(DownloadError::Empty {
                name: name.to_string(),
            });
        }

        let format = detect_format(&content, content_type.as_deref());
        if format == FileFormat::Unknown {
            return Err(DownloadError::Unrecognised {
                name: name.to_string(),
            });
        }

        if format == FileFormat::Pdf {
            inspect_pdf_bytes(&content).map_err(|e| DownloadError::Damaged {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }

        let path = dir.join(format!("{}.{}", name, format.extension()));
        write_verified(&path, &content).map_err(|source| DownloadError::Io {
            name: name.to_string(),
            source,
        })?;
        info!(
            file = %path.display(),
            title = resource.title.as_deref().unwrap_or("-"),
            bytes = content.len(),
            "downloaded"
        );

        Ok(LocalFile {
            resource: resource.clone(),
            path,
            format,
            state: ResourceState::Downloaded,
        })
    }
}

/// Write via a `.part` file, then confirm the size on disk before renaming
fn write_verified(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let partial = path.with_extension("part");
    fs::write(&partial, content)?;

    let mut written = Vec::with_capacity(content.len());
    fs::File::open(&partial)?.read_to_end(&mut written)?;
    if written.len() != content.len() {
        let _ = fs::remove_file(&partial);
        return Err(std::io::Error::other(format!(
            "short write: {} of {} bytes",
            written.len(),
            content.len()
        )));
    }

    fs::rename(&partial, path)
}
