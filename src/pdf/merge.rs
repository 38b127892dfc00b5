//! PDF merging functionality using lopdf

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::MergeError;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Options for merging PDFs
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Input PDF file paths in the order they should be merged
    pub input_paths: Vec<PathBuf>,
    /// Output PDF file path
    pub output_path: PathBuf,
}

/// An input the merger left out, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedPdf {
    pub path: PathBuf,
    pub reason: String,
}

/// What a merge actually produced
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub page_count: usize,
    /// Inputs that made it into the output, in output order
    pub included: Vec<PathBuf>,
    pub excluded: Vec<ExcludedPdf>,
}

/// Merge multiple PDF files into a single PDF
///
/// Based on the lopdf merge example:
/// https://github.com/J-F-Liu/lopdf/blob/main/examples/merge.rs
///
/// The merge is best-effort: an input that cannot be loaded or has no pages
/// is excluded and reported in [`MergeReport::excluded`] while the remaining
/// inputs are still merged in their given order. Only when nothing survives
/// does the merge fail.
///
/// # Example
///
/// ```no_run
/// use pesu_fetch::pdf::{MergeOptions, merge_pdfs};
/// use std::path::PathBuf;
///
/// let options = MergeOptions {
///     input_paths: vec![
///         PathBuf::from("001-Intro-Slides.pdf"),
///         PathBuf::from("002-Intro-Notes.pdf"),
///     ],
///     output_path: PathBuf::from("Unit_1.pdf"),
/// };
///
/// let report = merge_pdfs(&options).expect("Failed to merge");
/// println!("{} pages", report.page_count);
/// ```
pub fn merge_pdfs(options: &MergeOptions) -> Result<MergeReport, MergeError> {
    if options.input_paths.is_empty() {
        return Err(MergeError::NoInputs);
    }

    // Load all documents, setting aside the ones that will not load
    let mut documents: Vec<(PathBuf, Document)> = Vec::new();
    let mut excluded = Vec::new();
    for path in &options.input_paths {
        match load_for_merge(path) {
            Ok(doc) => documents.push((path.clone(), doc)),
            Err(e) => {
                warn!("excluding from merge: {}", e);
                let reason = match e {
                    MergeError::Unreadable { reason, .. } => reason,
                    other => other.to_string(),
                };
                excluded.push(ExcludedPdf {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    if documents.is_empty() {
        return Err(MergeError::NothingToMerge(options.input_paths.len()));
    }

    // Define a starting max_id for merged document
    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut included = Vec::new();

    for (path, mut doc) in documents {
        // Renumber objects in this document to avoid conflicts
        doc.renumber_objects_with(max_id);

        // Update max_id for next document
        max_id = doc.max_id + 1;

        // Pull inherited attributes down before the old page tree is dropped
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &pages {
            flatten_inherited_attributes(&mut doc, page_id);
        }
        page_ids.extend(pages);

        // Collect all objects from this document
        objects.extend(doc.objects);
        included.push(path);
    }

    // Create new document with merged content
    let mut merged_doc = Document::with_version("1.5");

    // Add all collected objects FIRST
    merged_doc.objects.extend(objects);

    // Update max_id to reflect the highest object ID we just added,
    // otherwise new_object_id() will return IDs that collide
    merged_doc.max_id = max_id - 1;

    let pages_id = merged_doc.new_object_id();

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();

    let mut pages_object = Dictionary::new();
    pages_object.set("Type", Object::Name(b"Pages".to_vec()));
    pages_object.set("Count", Object::Integer(page_ids.len() as i64));
    pages_object.set("Kids", Object::Array(kids));

    let catalog_id = merged_doc.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    merged_doc.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged_doc.objects.insert(pages_id, Object::Dictionary(pages_object));
    merged_doc.trailer.set("Root", Object::Reference(catalog_id));

    // Update parent references for all pages
    for &page_id in &page_ids {
        if let Ok(Object::Dictionary(dict)) = merged_doc.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    // Drop the source catalogs and page trees that nothing references anymore
    merged_doc.prune_objects();

    merged_doc.compress();
    save_atomically(&mut merged_doc, &options.output_path)?;
    debug!(
        output = %options.output_path.display(),
        pages = page_ids.len(),
        inputs = included.len(),
        "merged"
    );

    Ok(MergeReport {
        output_path: options.output_path.clone(),
        page_count: page_ids.len(),
        included,
        excluded,
    })
}

/// Load a document and make sure it has at least one page
fn load_for_merge(path: &Path) -> Result<Document, MergeError> {
    let unreadable = |reason: String| MergeError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(unreadable("file not found".to_string()));
    }
    let doc = Document::load(path).map_err(|e| unreadable(e.to_string()))?;
    if doc.get_pages().is_empty() {
        return Err(unreadable("PDF has no pages".to_string()));
    }
    Ok(doc)
}

/// Copy attributes a page inherits from its page-tree ancestors onto the page
fn flatten_inherited_attributes(doc: &mut Document, page_id: ObjectId) {
    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    {
        let Ok(page) = doc.get_dictionary(page_id) else {
            return;
        };
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        // Bounded walk guards against cyclic Parent links
        let mut depth = 0;
        while let Some(parent_id) = parent {
            if depth > 32 {
                break;
            }
            depth += 1;
            let Ok(node) = doc.get_dictionary(parent_id) else {
                break;
            };
            for key in INHERITABLE {
                let already = page.has(key) || inherited.iter().any(|(k, _)| *k == key);
                if !already {
                    if let Ok(value) = node.get(key) {
                        inherited.push((key, value.clone()));
                    }
                }
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }

    if inherited.is_empty() {
        return;
    }
    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        for (key, value) in inherited {
            page.set(key.to_vec(), value);
        }
    }
}

fn save_atomically(doc: &mut Document, output: &Path) -> Result<(), MergeError> {
    let write_error = |source: std::io::Error| MergeError::Write {
        path: output.to_path_buf(),
        source,
    };

    let partial = output.with_extension("pdf.part");
    doc.save(&partial)
        .map_err(|e| write_error(std::io::Error::other(e.to_string())))?;
    fs::rename(&partial, output).map_err(write_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_merge_options_creation() {
        let options = MergeOptions {
            input_paths: vec![PathBuf::from("test1.pdf"), PathBuf::from("test2.pdf")],
            output_path: PathBuf::from("merged.pdf"),
        };

        assert_eq!(options.input_paths.len(), 2);
        assert_eq!(options.output_path, Path::new("merged.pdf"));
    }

    #[test]
    fn test_merge_without_inputs() {
        let options = MergeOptions {
            input_paths: vec![],
            output_path: PathBuf::from("merged.pdf"),
        };
        assert!(matches!(merge_pdfs(&options), Err(MergeError::NoInputs)));
    }

    #[test]
    fn test_merge_all_inputs_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad = dir.path().join("001-bad.pdf");
        fs::write(&bad, b"%PDF-1.4 truncated").unwrap();

        let options = MergeOptions {
            input_paths: vec![bad, dir.path().join("missing.pdf")],
            output_path: dir.path().join("out.pdf"),
        };
        assert!(matches!(merge_pdfs(&options), Err(MergeError::NothingToMerge(2))));
        assert!(!dir.path().join("out.pdf").exists());
    }

    // Merges of real documents are covered in tests/integration.rs
}
