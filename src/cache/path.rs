//! Resource Paths
//!
//! A resource path names one file in the mirror namespace. The same value is
//! used as the in-flight key, the location under the cache root and the path
//! appended to the origin base URL.

use std::path::{Component, Path, PathBuf};

/// Reasons a request path cannot be mapped into the cache root
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path escapes the cache root: {0}")]
    Traversal(String),

    #[error("Path is not valid UTF-8 after decoding: {0}")]
    Encoding(String),
}

/// A validated, normalized resource path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    /// Decoded path segments, never containing `.`, `..` or empty segments
    segments: Vec<String>,
}

impl ResourcePath {
    /// Parse a request path relative to the mount point
    ///
    /// The input is still percent-encoded. Validation happens on the decoded
    /// segments so encoded traversal (`%2e%2e`) is rejected as well.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let decoded =
            urlencoding::decode(raw).map_err(|_| PathError::Encoding(raw.to_string()))?;

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::Traversal(raw.to_string())),
                _ => {}
            }

            if segment.contains('\0') {
                return Err(PathError::Traversal(raw.to_string()));
            }

            // A lone segment must stay a single normal component on this platform
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => {}
                _ => return Err(PathError::Traversal(raw.to_string())),
            }

            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// Whether this is the mirror root (the repository index)
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Normalized `a/b/c` form, empty for the root
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    /// Final path segment, if any
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Relative filesystem path below the cache root
    pub fn relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Percent-encoded form suitable for appending to a URL
    pub fn url_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_segments() {
        let path = ResourcePath::parse("foo//./bar-1.0.zip").unwrap();
        assert_eq!(path.key(), "foo/bar-1.0.zip");
        assert_eq!(path.file_name(), Some("bar-1.0.zip"));
        assert_eq!(path.relative(), PathBuf::from("foo").join("bar-1.0.zip"));
        assert!(!path.is_root());
    }

    #[test]
    fn test_root_paths() {
        for raw in ["", "/", ".", "./"] {
            let path = ResourcePath::parse(raw).unwrap();
            assert!(path.is_root(), "{raw:?} should be the root");
            assert_eq!(path.key(), "");
            assert_eq!(path.file_name(), None);
        }
    }

    #[test]
    fn test_traversal_rejected() {
        for raw in ["../etc/passwd", "foo/../../bar", "foo/..", "%2e%2e/secret", "a/%2E%2E/b"] {
            assert!(
                matches!(ResourcePath::parse(raw), Err(PathError::Traversal(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_encoded_slash_cannot_smuggle_traversal() {
        assert!(ResourcePath::parse("foo%2F..%2F..%2Fbar").is_err());
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(
            ResourcePath::parse("foo%00bar"),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(
            ResourcePath::parse("foo%FF"),
            Err(PathError::Encoding(_))
        ));
    }

    #[test]
    fn test_url_path_reencodes() {
        let path = ResourcePath::parse("my%20rock/a b-1.0.rockspec").unwrap();
        assert_eq!(path.key(), "my rock/a b-1.0.rockspec");
        assert_eq!(path.url_path(), "my%20rock/a%20b-1.0.rockspec");
        assert_eq!(path.to_string(), "/my rock/a b-1.0.rockspec");
    }
}
