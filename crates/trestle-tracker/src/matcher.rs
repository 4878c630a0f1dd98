//! Ant-style include/exclude file matching over a base directory.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::TrackerError;

/// Matches paths under a base directory against include and exclude globs.
///
/// Patterns are relative to the base directory and use `/` separators, with
/// `*` confined to one path segment and `**` crossing segments. An empty
/// include list includes everything; a pattern ending in `/` is shorthand
/// for everything below that directory.
#[derive(Debug)]
pub struct FileMatcher {
    basedir: PathBuf,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl FileMatcher {
    /// Compile a matcher.
    ///
    /// # Errors
    /// Returns [`TrackerError::Pattern`] if a glob fails to compile.
    pub fn new(
        basedir: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Self, TrackerError> {
        Ok(Self {
            basedir: basedir.to_path_buf(),
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Whether `path` lies under the base directory and satisfies the
    /// include/exclude patterns. Paths outside the base directory never
    /// match.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.basedir) else {
            return false;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|p| p.matches_with(&relative, options));
        included
            && !self
                .excludes
                .iter()
                .any(|p| p.matches_with(&relative, options))
    }

    /// The base directory this matcher is anchored at.
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, TrackerError> {
    patterns
        .iter()
        .map(|raw| {
            let normalized = normalize(raw);
            Pattern::new(&normalized).map_err(|source| TrackerError::Pattern {
                pattern: raw.clone(),
                source,
            })
        })
        .collect()
}

/// A trailing `/` means "this directory and everything below it".
fn normalize(pattern: &str) -> String {
    if let Some(prefix) = pattern.strip_suffix('/') {
        format!("{prefix}/**")
    } else {
        pattern.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn matcher(includes: &[&str], excludes: &[&str]) -> FileMatcher {
        let includes: Vec<String> = includes.iter().map(|s| (*s).to_owned()).collect();
        let excludes: Vec<String> = excludes.iter().map(|s| (*s).to_owned()).collect();
        FileMatcher::new(Path::new("/base"), &includes, &excludes).unwrap()
    }

    #[test]
    fn empty_includes_match_everything() {
        let m = matcher(&[], &[]);
        assert!(m.matches(Path::new("/base/src/main.rs")));
        assert!(m.matches(Path::new("/base/top.txt")));
    }

    #[test]
    fn path_outside_basedir_never_matches() {
        let m = matcher(&[], &[]);
        assert!(!m.matches(Path::new("/elsewhere/file.txt")));
    }

    #[test]
    fn star_is_confined_to_one_segment() {
        let m = matcher(&["*.java"], &[]);
        assert!(m.matches(Path::new("/base/Main.java")));
        assert!(!m.matches(Path::new("/base/sub/Main.java")));
    }

    #[test]
    fn double_star_crosses_segments() {
        let m = matcher(&["**/*.java"], &[]);
        assert!(m.matches(Path::new("/base/a/b/Main.java")));
    }

    #[test]
    fn excludes_trump_includes() {
        let m = matcher(&["**/*.java"], &["**/generated/**"]);
        assert!(m.matches(Path::new("/base/src/Main.java")));
        assert!(!m.matches(Path::new("/base/src/generated/Stub.java")));
    }

    #[test]
    fn trailing_slash_means_whole_subtree() {
        let m = matcher(&["resources/"], &[]);
        assert!(m.matches(Path::new("/base/resources/logo.png")));
        assert!(m.matches(Path::new("/base/resources/deep/er/file")));
        assert!(!m.matches(Path::new("/base/src/logo.png")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = FileMatcher::new(Path::new("/base"), &["[".to_owned()], &[]);
        assert!(matches!(err, Err(TrackerError::Pattern { .. })));
    }
}
