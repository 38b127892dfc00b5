//! Course catalog filtering and export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Course;

/// An admission batch, identified by the `UEyy` prefix of subject codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicYear(u8);

impl AcademicYear {
    /// Batches offered in the year menu, newest first
    pub const KNOWN: [AcademicYear; 6] = [
        AcademicYear(25),
        AcademicYear(24),
        AcademicYear(23),
        AcademicYear(22),
        AcademicYear(21),
        AcademicYear(20),
    ];

    pub const DEFAULT: AcademicYear = AcademicYear(23);

    /// Accepts `UE23`, `23` or `2023`
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_ascii_uppercase();
        let digits = input.strip_prefix("UE").unwrap_or(&input);
        let year: u16 = digits.parse().ok()?;
        match year {
            0..=99 => Some(AcademicYear(year as u8)),
            2000..=2099 => Some(AcademicYear((year - 2000) as u8)),
            _ => None,
        }
    }

    pub fn prefix(self) -> String {
        format!("UE{:02}", self.0)
    }

    /// Academic session label such as `2023-24`
    pub fn label(self) -> String {
        format!("20{:02}-{:02}", self.0, (self.0 + 1) % 100)
    }

    fn matches(self, course: &Course) -> bool {
        course.code.to_ascii_uppercase().starts_with(&self.prefix())
    }
}

/// Keep courses from the given batches, newest batch first, then by code
///
/// An empty `years` slice keeps every course.
pub fn filter_by_year(courses: &[Course], years: &[AcademicYear]) -> Vec<Course> {
    let mut batches: Vec<AcademicYear> = if years.is_empty() {
        AcademicYear::KNOWN.to_vec()
    } else {
        years.to_vec()
    };
    batches.sort_by(|a, b| b.0.cmp(&a.0));

    let rank = |course: &Course| -> usize {
        batches
            .iter()
            .position(|year| year.matches(course))
            .unwrap_or(usize::MAX)
    };

    let mut filtered: Vec<Course> = courses
        .iter()
        .filter(|course| years.is_empty() || years.iter().any(|year| year.matches(course)))
        .cloned()
        .collect();

    filtered.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.code.cmp(&b.code)));
    filtered
}

/// Write the catalog as pretty JSON for later reference
pub fn write_catalog_json(courses: &[Course], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), courses)
        .map_err(|e| Error::General(format!("failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Course> {
        vec![
            Course::new("1", "UE22MA201 - Linear Algebra"),
            Course::new("2", "UE23CS342A - Compilers"),
            Course::new("3", "UE23CS341A - Software Engineering"),
            Course::new("4", "UE24CS101 - Python"),
            Course::new("5", "Library Orientation"),
        ]
    }

    #[test]
    fn test_parse_academic_year() {
        assert_eq!(AcademicYear::parse("UE23"), Some(AcademicYear(23)));
        assert_eq!(AcademicYear::parse("ue24"), Some(AcademicYear(24)));
        assert_eq!(AcademicYear::parse("2022"), Some(AcademicYear(22)));
        assert_eq!(AcademicYear::parse("abc"), None);
        assert_eq!(AcademicYear::DEFAULT.label(), "2023-24");
    }

    #[test]
    fn test_filter_single_year_sorted_by_code() {
        let filtered = filter_by_year(&catalog(), &[AcademicYear(23)]);
        let codes: Vec<&str> = filtered.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["UE23CS341A", "UE23CS342A"]);
    }

    #[test]
    fn test_filter_all_years_newest_first() {
        let filtered = filter_by_year(&catalog(), &AcademicYear::KNOWN);
        let codes: Vec<&str> = filtered.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["UE24CS101", "UE23CS341A", "UE23CS342A", "UE22MA201"]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        assert_eq!(filter_by_year(&catalog(), &[]).len(), 5);
    }

    #[test]
    fn test_write_catalog_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("courses.json");
        write_catalog_json(&catalog()[..1], &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("UE22MA201"));
        assert!(written.contains("\"id\": \"1\""));
    }
}
