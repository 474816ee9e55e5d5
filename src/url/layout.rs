//! Helpers that map URLs and date hints onto the download directory layout

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Section used when a page path has no directory segments
pub const DEFAULT_SECTION: &str = "general";

/// Year bucket used when no year can be found in the date hint
pub const UNKNOWN_YEAR: &str = "unknown";

const FORBIDDEN_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Set of accepted document file extensions, compared case-insensitively
#[derive(Debug, Clone)]
pub struct DocumentTypes {
    extensions: Vec<String>,
}

impl DocumentTypes {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Returns the matching extension if the URL path ends in an accepted document type
    pub fn extension_of(&self, url: &Url) -> Option<&str> {
        let ext = extension(url)?;
        self.extensions
            .iter()
            .find(|accepted| **accepted == ext)
            .map(String::as_str)
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.extension_of(url).is_some()
    }

    /// Returns the accepted extension a response of this media type is stored under
    pub fn extension_for(&self, media_type: &str) -> Option<&str> {
        let ext = extension_for_media_type(media_type)?;
        self.extensions
            .iter()
            .find(|accepted| *accepted == ext)
            .map(String::as_str)
    }
}

/// Conventional file extension of a document media type
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    Some(match media_type {
        "application/pdf" => "pdf",
        "text/html" | "application/xhtml+xml" => "html",
        "text/csv" => "csv",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/msword" => "doc",
        "application/vnd.oasis.opendocument.spreadsheet" => "ods",
        "application/vnd.oasis.opendocument.text" => "odt",
        "application/zip" => "zip",
        _ => return None,
    })
}

/// Lowercase extension of the last path segment, if any
pub fn extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.last()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Derives the section of an originating page from its path
///
/// The directory segments of the path are sanitized and joined with `/`. A final segment
/// that looks like a file name (contains a dot) is not part of the section.
pub fn section_for(page: &Url) -> String {
    let segments: Vec<&str> = page
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let dirs = match segments.split_last() {
        Some((last, rest)) if last.contains('.') => rest,
        _ => &segments[..],
    };

    let section = dirs
        .iter()
        .map(|seg| sanitize_filename(&decode(seg)))
        .filter(|seg| !seg.is_empty() && seg != "." && seg != "..")
        .collect::<Vec<_>>()
        .join("/");

    if section.is_empty() {
        DEFAULT_SECTION.to_string()
    } else {
        section
    }
}

/// Returns the first plausible four-digit year in a free-text date, or `unknown`
pub fn year_bucket(date: Option<&str>) -> String {
    static YEAR: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = YEAR.get_or_init(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").ok());

    date.zip(pattern.as_ref())
        .and_then(|(d, re)| re.captures(d))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string())
}

/// Local file name for an artifact URL: percent-decoded, sanitized last path segment
///
/// Falls back to `document.{ext}` for URLs ending in a slash.
pub fn file_name_for(url: &Url, ext: &str) -> String {
    let raw = url
        .path_segments()
        .and_then(|s| s.filter(|seg| !seg.is_empty()).last())
        .map(decode)
        .unwrap_or_default();

    let name = sanitize_filename(raw.trim());
    if name.is_empty() {
        return format!("document.{}", ext);
    }

    let lower = name.to_lowercase();
    if lower.ends_with(&format!(".{}", ext)) {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

/// Replaces characters that are not allowed in file names with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
