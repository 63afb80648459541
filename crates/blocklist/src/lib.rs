use std::{collections::HashSet, path::Path};

use anyhow::Context;

/// Exact-match set of blocked domain names.
///
/// Built once and never mutated afterwards, so it can be shared between
/// request tasks behind an `Arc` without any locking.
#[derive(Debug, Clone, Default)]
pub struct BlockedSet {
    domains: HashSet<Box<str>>,
}

impl BlockedSet {
    /// Build the set from blocklist lines.
    ///
    /// Lines are trimmed; blank lines and lines starting with `#` or `//` are skipped.
    /// Everything else is inserted verbatim.
    pub fn load<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut domains = HashSet::new();

        for line in lines {
            let entry = line.as_ref().trim();
            if entry.is_empty() || entry.starts_with('#') || entry.starts_with("//") {
                continue;
            }
            domains.insert(Box::from(entry));
        }

        Self { domains }
    }

    /// Read and parse a blocklist file.
    pub fn read_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read blocklist {}", path.display()))?;
        Ok(Self::load(content.lines()))
    }

    /// Load a blocklist file, falling back to an empty set if it cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read_path(path) {
            Ok(set) => {
                tracing::info!(path = %path.display(), entries = set.len(), "loaded blocklist");
                set
            }
            Err(e) => {
                tracing::warn!("{:#}, continuing with an empty blocklist", e);
                Self::default()
            }
        }
    }

    /// Check whether `domain` is blocked. No suffix or wildcard matching.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_skips_comments_and_blanks() {
        let lines = [
            "# ad servers",
            "ads.example.com",
            "",
            "   ",
            "// trackers",
            "  tracker.example.net  ",
            "\tmetrics.example.org\r",
        ];
        let set = BlockedSet::load(lines);

        assert_eq!(set.len(), 3);
        assert!(set.contains("ads.example.com"));
        assert!(set.contains("tracker.example.net"));
        assert!(set.contains("metrics.example.org"));
        assert!(!set.contains("# ad servers"));
        assert!(!set.contains(""));
    }

    #[test]
    fn test_exact_match_only() {
        let set = BlockedSet::load(["example.com", "*.wild.com"]);

        assert!(set.contains("example.com"));
        assert!(!set.contains("sub.example.com"));
        assert!(!set.contains("example.com."));
        assert!(!set.contains("Example.com"));
        assert!(!set.contains("a.wild.com"));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nblocked.com\n\nalso-blocked.com").unwrap();

        let set = BlockedSet::from_path(file.path());
        assert_eq!(set.len(), 2);
        assert!(set.contains("blocked.com"));
        assert!(set.contains("also-blocked.com"));
    }

    #[test]
    fn test_missing_file_is_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");

        assert!(BlockedSet::read_path(&missing).is_err());

        let set = BlockedSet::from_path(&missing);
        assert!(set.is_empty());
        assert!(!set.contains("anything.com"));
    }
}
