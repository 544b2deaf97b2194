//! Text extraction from uploaded documents
//!
//! Pure and synchronous: bytes in, normalized plain text out. No
//! network calls, no side effects. Format handling:
//! - PDF via lopdf page text
//! - DOCX via the `word/document.xml` entry (zip + quick-xml)
//! - HTML via tag stripping with entity decoding
//! - RTF via control-word stripping
//! - plain text passthrough
//!
//! Declared and signature-detected formats must agree; an
//! irreconcilable mismatch is an `UnsupportedFormat` error, and output
//! below the minimum length threshold is an `EmptyDocument` error
//! (blank or corrupt input).

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;
use semestra_domain::constants::MIN_EXTRACTED_TEXT_LEN;
use semestra_domain::{DocumentType, Result, SemestraError};

/// Result of text extraction.
#[derive(Debug, Clone)]
pub struct TextExtraction {
    pub text: String,
    pub detected_type: DocumentType,
}

/// Extract normalized plain text from document bytes.
pub fn extract_text(bytes: &[u8], declared: DocumentType) -> Result<TextExtraction> {
    let effective = reconcile_format(bytes, declared)?;

    let raw = match effective {
        DocumentType::Pdf => extract_pdf(bytes)?,
        DocumentType::Docx => extract_docx(bytes)?,
        DocumentType::Html => extract_html(bytes),
        DocumentType::Rtf => extract_rtf(bytes),
        DocumentType::Text => String::from_utf8_lossy(bytes).into_owned(),
    };

    let text = normalize(&raw);

    if text.chars().count() < MIN_EXTRACTED_TEXT_LEN {
        return Err(SemestraError::EmptyDocument(format!(
            "extracted text below minimum length ({} chars)",
            text.chars().count()
        )));
    }

    Ok(TextExtraction { text, detected_type: effective })
}

/// Detect the document format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<DocumentType> {
    if bytes.starts_with(b"%PDF") {
        return Some(DocumentType::Pdf);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Some(DocumentType::Docx);
    }
    if bytes.starts_with(b"{\\rtf") {
        return Some(DocumentType::Rtf);
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let trimmed = head.trim_start().to_ascii_lowercase();
    if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
        return Some(DocumentType::Html);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Some(DocumentType::Text);
    }

    None
}

/// Reconcile the declared type with the detected signature.
///
/// Binary signatures (PDF, DOCX zip) are authoritative: a declared
/// binary format that does not carry its signature, or a detected
/// binary format under a different binary declaration, cannot be
/// reconciled. Text-family disagreements (text/html/rtf) resolve to
/// the detected variant.
fn reconcile_format(bytes: &[u8], declared: DocumentType) -> Result<DocumentType> {
    let detected = detect_format(bytes).ok_or_else(|| {
        SemestraError::UnsupportedFormat(format!(
            "binary content does not match any supported format (declared {})",
            declared.as_str()
        ))
    })?;

    if detected == declared {
        return Ok(declared);
    }

    let is_binary = |t: DocumentType| matches!(t, DocumentType::Pdf | DocumentType::Docx);

    if is_binary(declared) || is_binary(detected) {
        return Err(SemestraError::UnsupportedFormat(format!(
            "declared {} but detected {}",
            declared.as_str(),
            detected.as_str()
        )));
    }

    // Both text-family: trust the signature.
    Ok(detected)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| SemestraError::UnsupportedFormat(format!("failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    if is_garbled(&text) {
        return Err(SemestraError::EmptyDocument(
            "PDF contained no usable embedded text".to_string(),
        ));
    }

    Ok(text)
}

/// Minimum characters before the alphanumeric-ratio check applies.
const GARBLE_MIN_CHARS: usize = 50;

/// Minimum percentage of alphanumeric characters for text to count as usable.
const GARBLE_MIN_ALNUM_PERCENT: usize = 10;

/// Embedded PDF text can come out as font-encoding garbage; treat a
/// very low alphanumeric ratio as no text at all.
fn is_garbled(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let total = trimmed.chars().count();
    let alnum = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    total > GARBLE_MIN_CHARS && alnum * 100 < total * GARBLE_MIN_ALNUM_PERCENT
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| SemestraError::UnsupportedFormat(format!("failed to open DOCX: {}", e)))?;

    let mut document_xml = archive.by_name("word/document.xml").map_err(|e| {
        SemestraError::UnsupportedFormat(format!("DOCX missing document.xml: {}", e))
    })?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| SemestraError::UnsupportedFormat(format!("failed to read DOCX XML: {}", e)))?;

    parse_docx_xml(&xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.xml_content().unwrap_or_default();
                    text.push_str(&decoded);
                    text.push(' ');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SemestraError::UnsupportedFormat(format!(
                    "DOCX XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn extract_html(bytes: &[u8]) -> String {
    let html = String::from_utf8_lossy(bytes);
    let mut text = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<&str> = None;

    while let Some((idx, c)) = chars.next() {
        if let Some(closing) = skip_until {
            if c == '<' && html[idx..].to_ascii_lowercase().starts_with(closing) {
                skip_until = None;
                // Consume through the closing '>'
                for (_, inner) in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                }
            }
            continue;
        }

        if c == '<' {
            let rest = html[idx..].to_ascii_lowercase();
            if rest.starts_with("<script") {
                skip_until = Some("</script");
                continue;
            }
            if rest.starts_with("<style") {
                skip_until = Some("</style");
                continue;
            }
            // Block-level boundaries become line breaks
            if rest.starts_with("<p") || rest.starts_with("<br") || rest.starts_with("<div")
                || rest.starts_with("<tr") || rest.starts_with("<li") || rest.starts_with("<h")
            {
                text.push('\n');
            }
            for (_, inner) in chars.by_ref() {
                if inner == '>' {
                    break;
                }
            }
            continue;
        }

        text.push(c);
    }

    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Strip RTF control words and groups, keeping visible text.
fn extract_rtf(bytes: &[u8]) -> String {
    let rtf = String::from_utf8_lossy(bytes);
    let mut text = String::with_capacity(rtf.len() / 2);
    let mut chars = rtf.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {}
            '\\' => {
                match chars.peek() {
                    // Escaped literals
                    Some('\\') | Some('{') | Some('}') => {
                        if let Some(literal) = chars.next() {
                            text.push(literal);
                        }
                    }
                    _ => {
                        // Control word: consume letters, then an optional
                        // numeric parameter and one trailing space
                        let mut word = String::new();
                        while let Some(&next) = chars.peek() {
                            if next.is_ascii_alphabetic() {
                                word.push(next);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        while let Some(&next) = chars.peek() {
                            if next.is_ascii_digit() || next == '-' {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if chars.peek() == Some(&' ') {
                            chars.next();
                        }
                        if word == "par" || word == "line" {
                            text.push('\n');
                        }
                    }
                }
            }
            _ => text.push(c),
        }
    }

    text
}

/// Schedule-domain words the OCR correction pass may repair toward.
const CORRECTION_TERMS: &[&str] = &[
    "syllabus",
    "schedule",
    "assignment",
    "assignments",
    "homework",
    "midterm",
    "final",
    "exam",
    "exams",
    "quiz",
    "quizzes",
    "lecture",
    "lectures",
    "laboratory",
    "instructor",
    "grading",
    "semester",
    "credits",
    "office",
    "hours",
    "project",
    "projects",
    "attendance",
];

/// Normalize extracted text: strip control characters, correct common
/// OCR artifacts, collapse whitespace.
pub fn normalize(raw: &str) -> String {
    // Ligatures show up in embedded PDF text
    let sanitized = raw
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{2019}', "'")
        .replace('\u{2018}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"");

    let filtered: String = sanitized
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '+'
                        | '='
                        | '%'
                        | '#'
                        | '@'
                        | '&'
                        | '\''
                        | '"'
                        | '!'
                        | '?'
                        | '*'
                        | '_'
                        | '\u{2013}'
                        | '\u{2014}'
                )
        })
        .collect();

    filtered
        .lines()
        .map(|line| {
            line.split_whitespace()
                .map(correct_ocr_word)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Repair a word toward a known schedule term when it is one small
/// edit away. Short words and exact matches pass through untouched.
fn correct_ocr_word(word: &str) -> String {
    if word.chars().count() < 5 {
        return word.to_string();
    }

    let lower = word.to_lowercase();
    let stripped: String = lower.chars().filter(|c| c.is_alphanumeric()).collect();
    if stripped.chars().count() < 5 {
        return word.to_string();
    }

    if CORRECTION_TERMS.contains(&stripped.as_str()) {
        return word.to_string();
    }

    for term in CORRECTION_TERMS {
        if term.chars().count().abs_diff(stripped.chars().count()) <= 2
            && crate::util::similarity::edit_distance(&stripped, term) <= 1
        {
            return preserve_case(word, term);
        }
    }

    word.to_string()
}

/// Preserve the original word's capitalization pattern when applying a
/// correction.
fn preserve_case(original: &str, correction: &str) -> String {
    if original.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        return correction.to_uppercase();
    }

    let first_upper = original.chars().next().is_some_and(|c| c.is_uppercase());
    if first_upper {
        let mut chars = correction.chars();
        match chars.next() {
            Some(c) => {
                let mut s = c.to_uppercase().to_string();
                s.extend(chars);
                s
            }
            None => correction.to_string(),
        }
    } else {
        correction.to_string()
    }
}
