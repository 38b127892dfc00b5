//! PDF page counting and structural checks

use std::path::Path;

use lopdf::{Document, Object};

use crate::error::{Error, Result};

/// Count pages by reading the Count field from the Pages dictionary
/// This is more reliable than get_pages() which doesn't handle nested page trees
fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog_id = match doc.trailer.get(b"Root") {
        Ok(Object::Reference(id)) => *id,
        Ok(_) => return Err(Error::General("Root is not a reference".to_string())),
        Err(_) => return Err(Error::General("No Root in trailer".to_string())),
    };

    let catalog = doc.get_dictionary(catalog_id)?;

    let pages_id = match catalog.get(b"Pages") {
        Ok(Object::Reference(id)) => *id,
        Ok(_) => return Err(Error::General("Pages is not a reference".to_string())),
        Err(_) => return Err(Error::General("No Pages in catalog".to_string())),
    };

    let pages = doc.get_dictionary(pages_id)?;

    match pages.get(b"Count") {
        Ok(Object::Integer(n)) if *n >= 0 => Ok(*n as usize),
        Ok(_) => Err(Error::General("Count is not a page count".to_string())),
        Err(_) => Err(Error::General("No Count in Pages".to_string())),
    }
}

/// Page count of a loaded document, falling back to walking the tree when the
/// catalog's Count is missing or wrong
fn page_count(doc: &Document) -> usize {
    let walked = doc.get_pages().len();
    match count_pages_from_catalog(doc) {
        Ok(count) if count > 0 => count,
        _ => walked,
    }
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let count = page_count(&doc);

    if count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(count)
}

/// Parse PDF bytes and return the page count; fails for damaged or empty files
pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(bytes)?;
    match page_count(&doc) {
        0 => Err(Error::General("PDF has no pages".to_string())),
        count => Ok(count),
    }
}
