//! Per-unit download, convert, merge and cleanup
//!
//! Units are processed one after another and each unit's files one at a
//! time. Failures below the unit level are recorded in the [`UnitReport`]
//! and never stop the remaining files or units; a failed re-login does.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cleanup::clean_unit;
use crate::convert::ConverterChain;
use crate::download::{list_resources, Downloader};
use crate::error::{DownloadError, Error, FetchError, MergeError, Result};
use crate::model::{slugify, Course, FileFormat, LocalFile, ResourceKind, ResourceState, Unit};
use crate::pdf::{merge_pdfs, MergeOptions};
use crate::portal::Portal;
use crate::select::Selection;

/// Settings shared by every unit of a run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Root of the download tree
    pub output_dir: PathBuf,
    /// Produce one combined PDF per resource kind instead of one per unit
    pub by_kind: bool,
    /// Leave per-resource PDFs next to the combined output
    pub keep_intermediates: bool,
    pub download_attempts: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            by_kind: false,
            keep_intermediates: false,
            download_attempts: 2,
        }
    }
}

/// Stage at which a file dropped out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Download,
    Conversion,
    Merge,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailedStage::Download => "download",
            FailedStage::Conversion => "conversion",
            FailedStage::Merge => "merge",
        })
    }
}

/// A file left out of the combined PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub name: String,
    pub stage: FailedStage,
    pub reason: String,
}

/// A combined PDF written for a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedPdf {
    pub path: PathBuf,
    pub pages: usize,
    /// Set when the output holds a single resource kind
    pub kind: Option<ResourceKind>,
}

/// Outcome of one unit
#[derive(Debug, Clone, Default)]
pub struct UnitReport {
    pub unit: String,
    pub directory: PathBuf,
    pub listed: usize,
    pub downloaded: usize,
    pub converted: usize,
    pub outputs: Vec<CombinedPdf>,
    pub skipped: Vec<SkippedFile>,
    /// Files left on disk for manual review
    pub kept: Vec<PathBuf>,
    pub removed: usize,
    pub cleanup_failures: Vec<String>,
    /// Why the unit produced nothing at all, if it failed before downloading
    pub error: Option<String>,
    /// Final state of every listed resource
    pub files: Vec<LocalFile>,
}

impl UnitReport {
    fn new(unit: &Unit, directory: PathBuf) -> Self {
        Self {
            unit: unit.name.clone(),
            directory,
            ..Self::default()
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn pages(&self) -> usize {
        self.outputs.iter().map(|o| o.pages).sum()
    }

    fn skip(&mut self, name: impl Into<String>, stage: FailedStage, reason: impl fmt::Display) {
        let skipped = SkippedFile {
            name: name.into(),
            stage,
            reason: reason.to_string(),
        };
        warn!(file = %skipped.name, stage = %skipped.stage, "skipped: {}", skipped.reason);
        self.skipped.push(skipped);
    }
}

/// Directory of one unit: `<output>/<COURSE_CODE>/<NN>-<unit-slug>`
pub fn unit_directory(output_dir: &Path, course: &Course, unit: &Unit) -> PathBuf {
    output_dir
        .join(slugify(&course.code, 40))
        .join(format!("{:02}-{}", unit.number, slugify(&unit.name, 60)))
}

/// Name of a combined PDF, `<unit-slug>.pdf` or `<unit-slug>_<Kind>.pdf`
pub fn combined_file_name(unit: &Unit, kind: Option<ResourceKind>) -> String {
    let slug = slugify(&unit.name, 60);
    match kind {
        Some(kind) => format!("{}_{}.pdf", slug, kind.label()),
        None => format!("{}.pdf", slug),
    }
}

/// Run every selected unit in order
///
/// `on_unit` sees each report as soon as its unit finishes. Only errors that
/// must stop the run (a rejected re-login, failing to create the output
/// tree) are returned.
pub fn process_selection(
    portal: &mut dyn Portal,
    converter: &ConverterChain,
    selection: &Selection,
    options: &PipelineOptions,
    mut on_unit: impl FnMut(&UnitReport),
) -> Result<Vec<UnitReport>> {
    let mut reports = Vec::with_capacity(selection.units.len());
    for unit in &selection.units {
        let report = process_unit(
            portal,
            converter,
            &selection.course,
            unit,
            &selection.kinds,
            options,
        )?;
        on_unit(&report);
        reports.push(report);
    }
    Ok(reports)
}

/// Download, convert, merge and clean one unit
///
/// A failed re-login is returned as [`Error::Authentication`] and ends the
/// run; every other failure is recorded in the report.
pub fn process_unit(
    portal: &mut dyn Portal,
    converter: &ConverterChain,
    course: &Course,
    unit: &Unit,
    kinds: &[ResourceKind],
    options: &PipelineOptions,
) -> Result<UnitReport> {
    let dir = unit_directory(&options.output_dir, course, unit);
    let mut report = UnitReport::new(unit, dir.clone());
    info!(unit = %unit.name, "processing unit");

    let resources = match list_resources(portal, unit, kinds) {
        Ok(resources) => resources,
        Err(FetchError::Reauthentication(e)) => return Err(Error::Authentication(e)),
        Err(e) => {
            warn!(unit = %unit.name, "could not list resources: {}", e);
            report.error = Some(e.to_string());
            return Ok(report);
        }
    };
    report.listed = resources.len();
    if resources.is_empty() {
        info!(unit = %unit.name, "no resources");
        return Ok(report);
    }

    fs::create_dir_all(&dir)?;

    let downloader = Downloader::new(options.download_attempts);
    let mut files: Vec<LocalFile> = resources
        .into_iter()
        .map(|resource| LocalFile::listed(resource, &dir))
        .collect();
    for file in &mut files {
        file.state = ResourceState::Downloading;
        debug!(file = %file.resource.file_stem(), "downloading");
        match downloader.download(portal, &file.resource, &dir) {
            Ok(downloaded) => *file = downloaded,
            Err(DownloadError::Fetch {
                source: FetchError::Reauthentication(e),
                ..
            }) => return Err(Error::Authentication(e)),
            Err(e) => {
                report.skip(file.resource.file_stem(), FailedStage::Download, &e);
                file.state = ResourceState::DownloadFailed(e.to_string());
            }
        }
    }
    report.downloaded = files
        .iter()
        .filter(|f| f.state == ResourceState::Downloaded)
        .count();

    for file in &mut files {
        convert_file(converter, file, &mut report);
    }

    let outputs = merge_unit(unit, kinds, options.by_kind, &dir, &mut files, &mut report);

    if outputs.is_empty() {
        info!(unit = %unit.name, "nothing merged; leaving files in place");
    } else {
        let intermediates: Vec<PathBuf> = files
            .iter()
            .filter(|f| matches!(f.state, ResourceState::Merged | ResourceState::Excluded(_)))
            .map(|f| f.path.clone())
            .collect();
        let cleanup = clean_unit(&dir, &intermediates, &outputs, options.keep_intermediates);
        for file in &mut files {
            if cleanup.removed.contains(&file.path) {
                file.state = ResourceState::CleanedUp;
            }
        }
        report.removed = cleanup.removed.len();
        report.cleanup_failures = cleanup.failures.iter().map(|e| e.to_string()).collect();
    }

    report.kept = files
        .iter()
        .filter(|f| is_kept(&f.state))
        .map(|f| f.path.clone())
        .collect();
    report.files = files;
    Ok(report)
}

/// Files left on disk that no combined PDF contains
fn is_kept(state: &ResourceState) -> bool {
    matches!(
        state,
        ResourceState::ConversionFailed(_)
            | ResourceState::Unsupported
            | ResourceState::Downloaded
            | ResourceState::Converted
    )
}

fn convert_file(converter: &ConverterChain, file: &mut LocalFile, report: &mut UnitReport) {
    if file.state != ResourceState::Downloaded || file.format == FileFormat::Pdf {
        return;
    }
    if !file.format.is_convertible() {
        file.state = ResourceState::Unsupported;
        report.skip(
            file.file_name(),
            FailedStage::Conversion,
            format!(".{} files are not converted", file.format),
        );
        return;
    }

    file.state = ResourceState::Converting;
    match converter.convert(&file.path) {
        Ok(conversion) => {
            if let Err(e) = fs::remove_file(&file.path) {
                warn!(file = %file.path.display(), "could not remove original: {}", e);
            }
            info!(
                file = %conversion.output.display(),
                backend = %conversion.backend,
                repaired = conversion.repaired,
                "converted"
            );
            file.path = conversion.output;
            file.format = FileFormat::Pdf;
            file.state = ResourceState::Converted;
            report.converted += 1;
        }
        Err(e) => {
            file.state = ResourceState::ConversionFailed(e.to_string());
            report.skip(file.file_name(), FailedStage::Conversion, e);
        }
    }
}

/// Merge the unit's PDFs in sequence order; returns the written outputs
fn merge_unit(
    unit: &Unit,
    kinds: &[ResourceKind],
    by_kind: bool,
    dir: &Path,
    files: &mut [LocalFile],
    report: &mut UnitReport,
) -> Vec<PathBuf> {
    files.sort_by_key(|f| f.resource.sequence);

    let groups: Vec<Option<ResourceKind>> = if by_kind {
        kinds.iter().copied().map(Some).collect()
    } else {
        vec![None]
    };

    let mut written = Vec::new();
    for kind in groups {
        let members: Vec<usize> = files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.format == FileFormat::Pdf && !f.state.is_failure())
            .filter(|(_, f)| kind.map_or(true, |k| f.resource.kind == k))
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }

        let output = dir.join(combined_file_name(unit, kind));
        let options = MergeOptions {
            input_paths: members.iter().map(|&i| files[i].path.clone()).collect(),
            output_path: output.clone(),
        };

        match merge_pdfs(&options) {
            Ok(merged) => {
                for &i in &members {
                    let file = &mut files[i];
                    match merged.excluded.iter().find(|x| x.path == file.path) {
                        Some(excluded) => {
                            file.state = ResourceState::Excluded(excluded.reason.clone());
                            report.skip(file.file_name(), FailedStage::Merge, &excluded.reason);
                        }
                        None => file.state = ResourceState::Merged,
                    }
                }
                info!(output = %output.display(), pages = merged.page_count, "combined");
                report.outputs.push(CombinedPdf {
                    path: output.clone(),
                    pages: merged.page_count,
                    kind,
                });
                written.push(output);
            }
            Err(e @ MergeError::NothingToMerge(_)) => {
                for &i in &members {
                    let file = &mut files[i];
                    file.state = ResourceState::Excluded(e.to_string());
                    report.skip(file.file_name(), FailedStage::Merge, &e);
                }
            }
            // Members keep their state so cleanup leaves them on disk
            Err(e) => report.skip(combined_file_name(unit, kind), FailedStage::Merge, e),
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Unit {
        Unit {
            id: "77".to_string(),
            name: "Unit 2: Trees & Graphs".to_string(),
            course_id: "1".to_string(),
            number: 2,
        }
    }

    #[test]
    fn test_unit_directory_layout() {
        let course = Course::new("1", "UE23CS201 - Data Structures");
        let dir = unit_directory(Path::new("downloads"), &course, &unit());
        assert_eq!(dir, Path::new("downloads/UE23CS201/02-Unit_2__Trees___Graphs"));
    }

    #[test]
    fn test_combined_file_names() {
        assert_eq!(combined_file_name(&unit(), None), "Unit_2__Trees___Graphs.pdf");
        assert_eq!(
            combined_file_name(&unit(), Some(ResourceKind::QuestionBank)),
            "Unit_2__Trees___Graphs_QB.pdf"
        );
    }

    #[test]
    fn test_report_counts() {
        let mut report = UnitReport::default();
        report.skip("001-a-Slides.pptx", FailedStage::Download, "empty");
        report.outputs.push(CombinedPdf {
            path: PathBuf::from("a.pdf"),
            pages: 4,
            kind: None,
        });
        report.outputs.push(CombinedPdf {
            path: PathBuf::from("b.pdf"),
            pages: 3,
            kind: Some(ResourceKind::Notes),
        });
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.pages(), 7);
        assert_eq!(FailedStage::Conversion.to_string(), "conversion");
    }
}
