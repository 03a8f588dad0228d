//! Union of extended glob patterns over `/`-separated paths.
//!
//! Ported from `internal/file/glob.go`, which wraps `gobwas/glob`; here we
//! use `globset` (the same crate the `ignore`/ripgrep family exposes), which
//! supports the same feature set: `*`, `**`, `?`, character classes, and
//! brace alternation (`{a,b}`).

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{KonvahtiError, Result};

pub struct PathMatcher {
    set: Option<GlobSet>,
}

impl PathMatcher {
    /// An empty or absent pattern list yields a matcher that matches every
    /// path, so an action with no `matchFiles` runs on any change.
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| KonvahtiError::Config(format!("invalid glob {pattern:?}: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| KonvahtiError::Config(format!("failed to compile glob set: {e}")))?;
        Ok(Self { set: Some(set) })
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.set {
            None => true,
            Some(set) => set.is_match(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_list_matches_everything() {
        let m = PathMatcher::new(&[]).unwrap();
        for p in [
            "README.md",
            "assets/README.md",
            "content/index.md",
            "assets/mymodule/mylib/main.js",
        ] {
            assert!(m.matches(p), "expected empty matcher to match {p}");
        }
    }

    #[test]
    fn pattern_union_matches_any() {
        let patterns = vec![
            "content/*.md".to_string(),
            "assets/*.{css,js}".to_string(),
            "assets/**/*.{css,js}".to_string(),
        ];
        let m = PathMatcher::new(&patterns).unwrap();

        let cases = [
            ("README.md", false),
            ("assets/README.md", false),
            ("content/index.md", true),
            ("assets/main.css", true),
            ("assets/index.js", true),
            ("assets/mymodule/mylib/main.js", true),
        ];
        for (path, expected) in cases {
            assert_eq!(m.matches(path), expected, "path={path}");
        }
    }
}
