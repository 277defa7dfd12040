//! Page image discovery and natural ordering.
//!
//! Page images are named `page_1.png`, `page_2.png`, … `page_10.png`. A
//! plain string sort puts `page_10` before `page_2`, which would silently
//! scramble the page numbers of every document with ten pages or more. The
//! key built here splits a name into digit and non-digit runs; digit runs
//! compare as integers and the rest compares case-insensitively.

use crate::error::IngestError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

/// Extensions recognised as page images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// One run of a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Digits with leading zeros stripped; compared by length then lexically,
    /// which is numeric order without any overflow limit.
    Number(String),
    Text(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key for natural ordering of a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

pub fn natural_sort_key(name: &str) -> NaturalKey {
    let mut segments = Vec::new();
    let mut last = 0;

    for m in RE_DIGITS.find_iter(name) {
        if m.start() > last {
            segments.push(Segment::Text(name[last..m.start()].to_lowercase()));
        }
        let digits = m.as_str().trim_start_matches('0');
        segments.push(Segment::Number(digits.to_string()));
        last = m.end();
    }
    if last < name.len() {
        segments.push(Segment::Text(name[last..].to_lowercase()));
    }

    NaturalKey(segments)
}

/// Compare two names by natural key, falling back to the raw string.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_sort_key(a)
        .cmp(&natural_sort_key(b))
        .then_with(|| a.cmp(b))
}

/// Sort names in place by natural order.
pub fn sort_page_names(names: &mut [String]) {
    names.sort_by_cached_key(|n| (natural_sort_key(n), n.clone()));
}

/// Whether `name` ends in one of `extensions` (case-insensitive).
pub fn has_image_extension(name: &str, extensions: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List the page images in `dir` in natural order.
pub fn list_page_images(dir: &Path, extensions: &[String]) -> Result<Vec<String>, IngestError> {
    let scratch_err = |source| IngestError::ScratchDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scratch_err)? {
        let entry = entry.map_err(scratch_err)?;
        if !entry.file_type().map_err(scratch_err)?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if has_image_extension(&name, extensions) {
            names.push(name);
        }
    }

    sort_page_names(&mut names);
    debug!("Found {} page images in {}", names.len(), dir.display());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_runs_sort_as_numbers() {
        let mut names = vec![
            "page_2.png".to_string(),
            "page_10.png".to_string(),
            "page_1.png".to_string(),
        ];
        sort_page_names(&mut names);
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
    }

    #[test]
    fn text_runs_ignore_case() {
        assert_ne!(natural_cmp("Page_3.png", "page_3.png"), Ordering::Equal);
        assert_eq!(
            natural_sort_key("Page_3.png"),
            natural_sort_key("page_3.png")
        );
        assert_eq!(natural_cmp("A_1.png", "b_1.png"), Ordering::Less);
    }

    #[test]
    fn leading_zeros_and_huge_numbers() {
        assert_eq!(natural_cmp("page_002.png", "page_10.png"), Ordering::Less);
        assert_eq!(
            natural_cmp("page_99999999999999999999999.png", "page_100000000000000000000000.png"),
            Ordering::Less
        );
        // equal keys, tie broken by the raw string
        assert_ne!(natural_cmp("page_01.png", "page_1.png"), Ordering::Equal);
    }

    #[test]
    fn extension_filter() {
        let e = exts();
        assert!(has_image_extension("page_1.PNG", &e));
        assert!(has_image_extension("scan.jpeg", &e));
        assert!(!has_image_extension("notes.txt", &e));
        assert!(!has_image_extension("png", &e));
    }

    #[test]
    fn lists_only_images_in_page_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page_10.png", "page_2.png", "page_1.png", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("page_3.png")).unwrap();

        let names = list_page_images(dir.path(), &exts()).unwrap();
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
    }

    #[test]
    fn missing_dir_is_a_scratch_error() {
        let err = list_page_images(Path::new("/definitely/not/here"), &exts()).unwrap_err();
        assert!(matches!(err, IngestError::ScratchDir { .. }));
    }
}
