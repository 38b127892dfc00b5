//! Terminal summaries for finished units and runs

use std::path::Path;

use colored::Colorize;

use crate::pipeline::UnitReport;

/// Totals across every unit of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub units: usize,
    pub failed_units: usize,
    pub outputs: usize,
    pub pages: usize,
    pub downloaded: usize,
    pub converted: usize,
    pub skipped: usize,
    pub kept: usize,
}

impl RunTotals {
    pub fn from_reports(reports: &[UnitReport]) -> Self {
        let mut totals = Self::default();
        for report in reports {
            totals.units += 1;
            if report.error.is_some() {
                totals.failed_units += 1;
            }
            totals.outputs += report.outputs.len();
            totals.pages += report.pages();
            totals.downloaded += report.downloaded;
            totals.converted += report.converted;
            totals.skipped += report.skipped_count();
            totals.kept += report.kept.len();
        }
        totals
    }
}

/// Print the summary for one unit
pub fn print_unit_report(report: &UnitReport) {
    println!("\n{}", report.unit.bold());

    if let Some(error) = &report.error {
        println!("  {} {}", "failed:".red(), error);
        return;
    }
    if report.listed == 0 {
        println!("  {}", "no resources found".yellow());
        return;
    }

    println!(
        "  downloaded {}/{}, converted {}",
        report.downloaded, report.listed, report.converted
    );
    for output in &report.outputs {
        println!(
            "  {} {} ({} pages)",
            "✓".green(),
            display_name(&output.path),
            output.pages
        );
    }
    if report.outputs.is_empty() {
        println!("  {}", "no combined PDF was produced".yellow());
    }

    if !report.skipped.is_empty() {
        println!("  {} {}", "skipped:".yellow(), report.skipped_count());
        for skipped in &report.skipped {
            println!("    - {} [{}] {}", skipped.name, skipped.stage, skipped.reason);
        }
    }
    for path in &report.kept {
        println!("  {} {}", "kept for review:".yellow(), path.display());
    }
    for failure in &report.cleanup_failures {
        println!("  {} {}", "cleanup:".yellow(), failure);
    }
}

/// Print the end-of-run totals
pub fn print_run_summary(reports: &[UnitReport], location: &Path) {
    let totals = RunTotals::from_reports(reports);
    let rule = "=".repeat(60);

    println!("\n{}", rule.green());
    println!(
        "{} {} combined PDF(s), {} pages from {} unit(s)",
        "Done:".green().bold(),
        totals.outputs,
        totals.pages,
        totals.units
    );
    println!(
        "  downloaded {}, converted {}, skipped {}",
        totals.downloaded, totals.converted, totals.skipped
    );
    if totals.failed_units > 0 {
        println!("  {} unit(s) could not be listed", totals.failed_units.to_string().red());
    }
    if totals.kept > 0 {
        println!("  {} file(s) kept for manual review", totals.kept.to_string().yellow());
    }
    println!("  location: {}", location.display());
    println!("{}", rule.green());
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CombinedPdf, FailedStage, SkippedFile};
    use std::path::PathBuf;

    #[test]
    fn test_totals() {
        let done = UnitReport {
            unit: "Unit 1".to_string(),
            listed: 3,
            downloaded: 2,
            converted: 1,
            outputs: vec![CombinedPdf {
                path: PathBuf::from("Unit_1.pdf"),
                pages: 12,
                kind: None,
            }],
            skipped: vec![SkippedFile {
                name: "002-Intro-Slides".to_string(),
                stage: FailedStage::Download,
                reason: "downloaded file is empty".to_string(),
            }],
            ..UnitReport::default()
        };
        let failed = UnitReport {
            unit: "Unit 2".to_string(),
            error: Some("HTTP 500".to_string()),
            ..UnitReport::default()
        };

        let totals = RunTotals::from_reports(&[done, failed]);
        assert_eq!(totals.units, 2);
        assert_eq!(totals.failed_units, 1);
        assert_eq!(totals.pages, 12);
        assert_eq!(totals.skipped, 1);
        assert_eq!(totals.downloaded, 2);
    }
}
