//! DOCX container handling: VBA macro probe and text extraction.
//!
//! A .docx is a zip archive; text lives in `word/document.xml` as `<w:t>`
//! runs and macros ship as `vbaProject.bin`.

use std::io::{Cursor, Read};

use tracing::warn;
use zip::ZipArchive;

use crate::cv::error::CvParseError;

/// Checks whether a DOCX buffer carries VBA macros. A container that cannot
/// be opened returns `false` here; the extraction stage rejects it as
/// corrupted with a proper error instead.
pub fn has_vba_macros(buffer: &[u8]) -> bool {
    let archive = match ZipArchive::new(Cursor::new(buffer)) {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "macro probe could not open container");
            return false;
        }
    };
    let has_macros = archive.file_names().any(|name| name.contains("vbaProject.bin"));
    has_macros
}

/// Extracts plain text from a DOCX buffer.
pub fn extract_text(buffer: &[u8]) -> Result<String, CvParseError> {
    let mut archive = ZipArchive::new(Cursor::new(buffer))
        .map_err(|e| CvParseError::corrupted(&format!("not a valid DOCX container: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| CvParseError::corrupted("DOCX has no word/document.xml"))?
        .read_to_string(&mut xml)
        .map_err(|e| CvParseError::corrupted(&format!("unreadable document.xml: {e}")))?;

    Ok(document_xml_text(&xml))
}

/// Pulls visible text out of WordprocessingML. Paragraph ends and explicit
/// breaks become newlines, tabs stay tabs; everything else is markup.
fn document_xml_text(xml: &str) -> String {
    let mut out = String::new();
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        let tail = &rest[open + 1..];
        let Some(close) = tail.find('>') else { break };
        let tag = &tail[..close];
        let after = &tail[close + 1..];

        if tag == "w:t" || tag.starts_with("w:t ") {
            if let Some(end) = after.find("</w:t>") {
                push_unescaped(&mut out, &after[..end]);
                rest = &after[end + "</w:t>".len()..];
                continue;
            }
        } else if tag == "/w:p" {
            out.push('\n');
        } else if tag.starts_with("w:tab") {
            out.push('\t');
        } else if tag.starts_with("w:br") {
            out.push('\n');
        }
        rest = after;
    }

    out
}

fn push_unescaped(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return;
        };
        match &tail[..=semi] {
            "&amp;" => out.push('&'),
            "&lt;" => out.push('<'),
            "&gt;" => out.push('>'),
            "&quot;" => out.push('"'),
            "&apos;" => out.push('\''),
            other => out.push_str(other),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_docx(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            for (name, content) in entries {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    const DOC_XML: &str = r#"<?xml version="1.0"?>
<w:document><w:body>
<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Engineer &amp; Architect</w:t></w:r><w:r><w:br/><w:t>Rust</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_extract_text_joins_runs_with_breaks() {
        let docx = build_docx(&[("word/document.xml", DOC_XML)]);
        let text = extract_text(&docx).unwrap();
        assert_eq!(text, "Jane Doe\nEngineer & Architect\nRust\n");
    }

    #[test]
    fn test_macro_probe_detects_vba_project() {
        let clean = build_docx(&[("word/document.xml", DOC_XML)]);
        assert!(!has_vba_macros(&clean));

        let infected = build_docx(&[
            ("word/document.xml", DOC_XML),
            ("word/vbaProject.bin", "binary"),
        ]);
        assert!(has_vba_macros(&infected));
    }

    #[test]
    fn test_macro_probe_fails_open_on_garbage() {
        assert!(!has_vba_macros(b"not a zip at all"));
    }

    #[test]
    fn test_missing_document_xml_is_corrupted() {
        let docx = build_docx(&[("word/other.xml", "<x/>")]);
        let err = extract_text(&docx).unwrap_err();
        assert_eq!(err.code, crate::cv::error::CvParseErrorCode::FileCorrupted);
    }

    #[test]
    fn test_garbage_container_is_corrupted() {
        let err = extract_text(b"garbage").unwrap_err();
        assert_eq!(err.code, crate::cv::error::CvParseErrorCode::FileCorrupted);
    }

    #[test]
    fn test_entity_unescaping() {
        let mut out = String::new();
        push_unescaped(&mut out, "a &lt;b&gt; &quot;c&quot; &apos;d&apos; &amp;e");
        assert_eq!(out, "a <b> \"c\" 'd' &e");
    }
}
