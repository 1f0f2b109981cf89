//! Aegis Utilities - Field Path Helpers
//!
//! Dotted field paths (`address.city`, `groupIds._id`) are used by filters,
//! projections and link storage fields alike.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

/// Split a dotted path into its segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// First segment of a dotted path.
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Join two path fragments with a dot.
pub fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// True if `prefix` equals `path` or is one of its ancestors.
pub fn path_covers(prefix: &str, path: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Make a name usable as a single path segment.
pub fn sanitize_segment(name: &str) -> String {
    name.replace('.', "_")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_root() {
        assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(root_segment("groupIds._id"), "groupIds");
        assert_eq!(root_segment("name"), "name");
    }

    #[test]
    fn test_path_covers() {
        assert!(path_covers("address", "address.city"));
        assert!(path_covers("address", "address"));
        assert!(!path_covers("address", "addresses"));
        assert!(!path_covers("address.city", "address"));
    }

    #[test]
    fn test_join_and_sanitize() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", "b"), "a.b");
        assert_eq!(sanitize_segment("app.users"), "app_users");
    }
}
