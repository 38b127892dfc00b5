//! Portal entities and on-disk file states

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A course from the portal catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    /// Portal identifier used in catalog URLs
    pub id: String,
    /// Subject code such as `UE23CS341A`
    pub code: String,
    /// Display name as shown by the portal
    pub name: String,
}

impl Course {
    /// Build a course, deriving the subject code from the display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let code = match name.split_once('-') {
            Some((code, _)) => code.trim().to_string(),
            None => name.trim().to_string(),
        };
        Self {
            id: id.into(),
            code,
            name,
        }
    }
}

/// A unit inside a course
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: String,
    pub name: String,
    /// Owning course id
    pub course_id: String,
    /// 1-based position in the course's unit list
    pub number: usize,
}

/// A lecture entry inside a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub id: String,
    pub name: String,
}

/// Resource categories the portal exposes per class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Slides,
    Notes,
    Qa,
    Assignments,
    QuestionBank,
    Mcqs,
    References,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Slides,
        ResourceKind::Notes,
        ResourceKind::Qa,
        ResourceKind::Assignments,
        ResourceKind::QuestionBank,
        ResourceKind::Mcqs,
        ResourceKind::References,
    ];

    /// The `id` query parameter the portal uses for this kind
    pub fn portal_id(self) -> u8 {
        match self {
            ResourceKind::Slides => 2,
            ResourceKind::Notes => 3,
            ResourceKind::Qa => 4,
            ResourceKind::Assignments => 5,
            ResourceKind::QuestionBank => 6,
            ResourceKind::Mcqs => 7,
            ResourceKind::References => 8,
        }
    }

    pub fn from_portal_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.portal_id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Slides => "Slides",
            ResourceKind::Notes => "Notes",
            ResourceKind::Qa => "QA",
            ResourceKind::Assignments => "Assignments",
            ResourceKind::QuestionBank => "QB",
            ResourceKind::Mcqs => "MCQs",
            ResourceKind::References => "References",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the bytes of a resource come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    /// A download link to fetch with the session
    Link(String),
    /// The listing request already returned the file itself
    Inline {
        content: Vec<u8>,
        content_type: Option<String>,
    },
}

/// A downloadable item within a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Position within the unit; defines merge order
    pub sequence: usize,
    pub kind: ResourceKind,
    /// Class the resource belongs to
    pub class_name: String,
    /// Link text from the portal, if any
    pub title: Option<String>,
    pub source: ResourceSource,
    /// Digits in the sequence prefix, shared by every resource of the unit
    pub width: usize,
}

impl Resource {
    /// Narrowest prefix width that keeps `count` sequence numbers sortable
    pub fn prefix_width(count: usize) -> usize {
        count.to_string().len().max(3)
    }

    /// Local file stem, e.g. `003-Intro_to_Graphs-Slides`
    pub fn file_stem(&self) -> String {
        format!(
            "{:0width$}-{}-{}",
            self.sequence,
            slugify(&self.class_name, 60),
            self.kind.label(),
            width = self.width.max(3)
        )
    }
}

/// Document formats recognised on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Pptx,
    Ppt,
    Docx,
    Doc,
    Xlsx,
    Unknown,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Pptx => "pptx",
            FileFormat::Ppt => "ppt",
            FileFormat::Docx => "docx",
            FileFormat::Doc => "doc",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Unknown => "bin",
        }
    }

    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => FileFormat::Pdf,
            Some("pptx") => FileFormat::Pptx,
            Some("ppt") => FileFormat::Ppt,
            Some("docx") => FileFormat::Docx,
            Some("doc") => FileFormat::Doc,
            Some("xlsx") => FileFormat::Xlsx,
            _ => FileFormat::Unknown,
        }
    }

    /// Presentation or word-processing formats we know how to turn into PDF
    pub fn is_convertible(self) -> bool {
        matches!(
            self,
            FileFormat::Pptx | FileFormat::Ppt | FileFormat::Docx | FileFormat::Doc
        )
    }

    pub fn is_presentation(self) -> bool {
        matches!(self, FileFormat::Pptx | FileFormat::Ppt)
    }

    /// OOXML formats are zip packages and can be repaired by repacking
    pub fn is_zip_package(self) -> bool {
        matches!(self, FileFormat::Pptx | FileFormat::Docx | FileFormat::Xlsx)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lifecycle of one resource through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Listed,
    Downloading,
    Downloaded,
    Converting,
    Converted,
    /// Format the converters do not handle; kept on disk
    Unsupported,
    Merged,
    /// Dropped by the merger as unreadable
    Excluded(String),
    CleanedUp,
    DownloadFailed(String),
    ConversionFailed(String),
}

impl ResourceState {
    /// Terminal failure states are reported in the unit summary
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResourceState::DownloadFailed(_)
                | ResourceState::ConversionFailed(_)
                | ResourceState::Excluded(_)
                | ResourceState::Unsupported
        )
    }
}

/// A resource materialized on disk
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub resource: Resource,
    pub path: PathBuf,
    pub format: FileFormat,
    pub state: ResourceState,
}

impl LocalFile {
    /// Placeholder for a resource that has not been fetched yet
    pub fn listed(resource: Resource, dir: &Path) -> Self {
        Self {
            path: dir.join(resource.file_stem()),
            resource,
            format: FileFormat::Unknown,
            state: ResourceState::Listed,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.resource.file_stem())
    }
}

/// Make a display name safe for use as a path component
///
/// Alphanumerics, `-` and `_` survive; everything else becomes `_`, runs of
/// whitespace collapse into a single `_`.
pub fn slugify(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = joined.chars().take(max_len).collect();
    let trimmed = truncated.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
