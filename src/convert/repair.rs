//! Repacking damaged Office Open XML packages
//!
//! Portal uploads are sometimes re-zipped badly or carry hyperlink
//! relationships with an empty external target, both of which make
//! converters refuse the file. Repacking every readable entry into a fresh
//! archive and dropping the empty hyperlinks fixes most of them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ConversionError;

static RELATIONSHIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<Relationship\b[^>]*/>").unwrap());

/// Write a repaired copy of `input` next to it and return its path
///
/// The copy is named `<stem>.repaired.<ext>`; the caller removes it.
pub fn repair_package(input: &Path) -> Result<PathBuf, ConversionError> {
    let fail = |reason: String| ConversionError::Repair {
        path: input.to_path_buf(),
        reason,
    };
    let io_fail = |source: std::io::Error| ConversionError::Io {
        path: input.to_path_buf(),
        source,
    };

    let file = File::open(input).map_err(io_fail)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| fail(e.to_string()))?;

    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "zip".to_string());
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = input.with_file_name(format!("{}.repaired.{}", stem, ext));

    let out = File::create(&output).map_err(io_fail)?;
    let mut writer = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut copied = 0usize;
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index, "skipping unreadable zip entry: {}", e);
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let mut content = Vec::new();
        if let Err(e) = entry.read_to_end(&mut content) {
            warn!(entry = %name, "skipping corrupt zip entry: {}", e);
            continue;
        }

        if name.ends_with(".rels") {
            if let Ok(xml) = String::from_utf8(content.clone()) {
                content = strip_empty_hyperlinks(&xml).into_bytes();
            }
        }

        writer
            .start_file(name, options)
            .map_err(|e| fail(e.to_string()))?;
        writer.write_all(&content).map_err(io_fail)?;
        copied += 1;
    }

    writer.finish().map_err(|e| fail(e.to_string()))?;

    if copied == 0 {
        let _ = std::fs::remove_file(&output);
        return Err(fail("no readable entries".to_string()));
    }
    debug!(entries = copied, file = %output.display(), "repacked package");
    Ok(output)
}

/// Remove external hyperlink relationships whose target is empty
pub fn strip_empty_hyperlinks(xml: &str) -> String {
    RELATIONSHIP_RE
        .replace_all(xml, |caps: &regex::Captures| {
            let rel = &caps[0];
            let broken = rel.contains("relationships/hyperlink")
                && rel.contains("TargetMode=\"External\"")
                && rel.contains("Target=\"\"");
            if broken {
                String::new()
            } else {
                rel.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const RELS: &str = concat!(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#,
        r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" TargetMode="External" Target=""/>"#,
        r#"</Relationships>"#
    );

    #[test]
    fn test_strip_empty_hyperlinks() {
        let cleaned = strip_empty_hyperlinks(RELS);
        assert!(cleaned.contains("rId1"));
        assert!(!cleaned.contains("rId2"));
    }

    #[test]
    fn test_repair_package_repacks_entries() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("001-a-Slides.pptx");

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file("ppt/presentation.xml", options).unwrap();
            writer.write_all(b"<p:presentation/>").unwrap();
            writer.start_file("ppt/slides/_rels/slide1.xml.rels", options).unwrap();
            writer.write_all(RELS.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&input, buffer.into_inner()).unwrap();

        let repaired = repair_package(&input).unwrap();
        assert_eq!(repaired, dir.path().join("001-a-Slides.repaired.pptx"));

        let mut archive = ZipArchive::new(File::open(&repaired).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut rels = String::new();
        archive
            .by_name("ppt/slides/_rels/slide1.xml.rels")
            .unwrap()
            .read_to_string(&mut rels)
            .unwrap();
        assert!(!rels.contains("rId2"));
    }

    #[test]
    fn test_repair_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("junk.pptx");
        std::fs::write(&input, b"definitely not a zip").unwrap();
        assert!(matches!(repair_package(&input), Err(ConversionError::Repair { .. })));
    }
}
