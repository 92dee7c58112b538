//! Bundle manifest and HTTP validator computation.

use sha2::{Digest, Sha256};
use stampcard_render::content_tag;

/// One file of a pass bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BundleFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Canonical manifest: one `name:sha256hex\n` line per file, sorted by name.
pub fn manifest_lines(files: &[BundleFile]) -> String {
    let mut entries: Vec<(&str, String)> = files
        .iter()
        .map(|f| (f.name.as_str(), f.sha256_hex()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .map(|(name, digest)| format!("{name}:{digest}\n"))
        .collect()
}

/// Quoted content tag over the canonical manifest.
pub fn bundle_etag(files: &[BundleFile]) -> String {
    format!("\"{}\"", content_tag(manifest_lines(files).as_bytes()))
}

/// Whether an `If-None-Match` header value matches `etag`.
///
/// Handles comma-separated lists, weak validators and `*`.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.trim_start_matches("W/");
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<BundleFile> {
        vec![
            BundleFile::new("strip@3x.png", b"png".to_vec()),
            BundleFile::new("pass.json", b"{}".to_vec()),
        ]
    }

    #[test]
    fn manifest_is_sorted_by_name() {
        let lines = manifest_lines(&files());
        let names: Vec<&str> = lines
            .lines()
            .map(|l| l.split(':').next().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["pass.json", "strip@3x.png"]);
        assert!(lines.ends_with('\n'));
        assert!(lines.starts_with(
            "pass.json:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a\n"
        ));
    }

    #[test]
    fn etag_ignores_file_order() {
        let mut reversed = files();
        reversed.reverse();
        assert_eq!(bundle_etag(&files()), bundle_etag(&reversed));
    }

    #[test]
    fn etag_is_quoted_16_hex() {
        let etag = bundle_etag(&files());
        assert_eq!(etag.len(), 18);
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert!(etag[1..17].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn etag_changes_with_content() {
        let mut changed = files();
        changed[0].bytes.push(0);
        assert_ne!(bundle_etag(&files()), bundle_etag(&changed));
    }

    #[test]
    fn if_none_match_forms() {
        let etag = "\"abc\"";
        assert!(etag_matches("\"abc\"", etag));
        assert!(etag_matches("W/\"abc\"", etag));
        assert!(etag_matches("\"x\", \"abc\"", etag));
        assert!(etag_matches("*", etag));
        assert!(!etag_matches("\"abd\"", etag));
        assert!(!etag_matches("", etag));
    }
}
