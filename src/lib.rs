//! PESU Academy course material downloader
//!
//! Logs into the portal, walks the course catalog and fetches every resource
//! of the selected units. Office documents are converted to PDF with whatever
//! converter is installed, and each unit ends up as one combined PDF:
//! - Authenticate and keep a cookie session ([`portal`])
//! - Pick a course, units and resource kinds ([`select`])
//! - Download numbered files in merge order ([`download`])
//! - Convert PPTX/DOCX to PDF ([`convert`])
//! - Merge and clean up each unit ([`pipeline`], [`pdf`], [`cleanup`])
//!
//! # Example
//!
//! ```no_run
//! use pesu_fetch::config::{Credentials, PortalConfig};
//! use pesu_fetch::portal::{Portal, PortalSession};
//!
//! let credentials = Credentials::new("PES1UG23CS001", "secret").unwrap();
//! let mut session = PortalSession::login(&PortalConfig::default(), credentials)
//!     .expect("login failed");
//! for course in session.list_courses().expect("catalog unavailable") {
//!     println!("{} {}", course.code, course.name);
//! }
//! ```

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod download;
pub mod error;
pub mod logging;
pub mod model;
pub mod pdf;
pub mod pipeline;
pub mod portal;
pub mod report;
pub mod select;

// Re-export commonly used items
pub use error::{Error, Result};
