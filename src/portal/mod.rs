//! Portal access: login session, catalog navigation and resource listing

pub mod catalog;
pub mod html;
pub mod session;

use crate::error::FetchError;
use crate::model::{Class, Course, ResourceKind, Unit};

pub use catalog::{filter_by_year, AcademicYear};
pub use html::ListedLink;
pub use session::{classify_login, PortalSession};

/// Bytes of a fetched download plus what the server said about them
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    /// Name from `Content-Disposition`, if the server sent one
    pub file_name: Option<String>,
}

/// Everything the pipeline needs from the portal
///
/// [`PortalSession`] talks to the real site; tests substitute an in-memory
/// implementation.
pub trait Portal {
    fn list_courses(&mut self) -> Result<Vec<Course>, FetchError>;

    fn list_units(&mut self, course: &Course) -> Result<Vec<Unit>, FetchError>;

    fn list_classes(&mut self, unit: &Unit) -> Result<Vec<Class>, FetchError>;

    /// Download targets of one kind for one class
    fn list_class_resources(
        &mut self,
        unit: &Unit,
        class: &Class,
        kind: ResourceKind,
    ) -> Result<Vec<ListedLink>, FetchError>;

    /// Fetch a download link
    fn fetch(&mut self, url: &str) -> Result<Fetched, FetchError>;
}
