//! Path-string utilities.
//!
//! A valid path is absolute, begins and ends with `/`, and consists of
//! nonempty lowercase-ASCII components separated by `/`. `/` alone names
//! the root. Everything here works on borrowed slices of the caller's
//! path; nothing allocates except [`join_names`].

/// Longest accepted component, in bytes.
pub(crate) const MAX_COMPONENT_LEN: usize = 255;

/// Longest accepted path, in bytes.
pub(crate) const MAX_PATH_LEN: usize = 4095;

/// Checks whether `path` is a valid absolute path.
pub(crate) fn is_valid(path: &str) -> bool {
    if path.len() > MAX_PATH_LEN || !path.is_ascii() {
        return false;
    }
    if !path.starts_with('/') || !path.ends_with('/') {
        return false;
    }
    if path == "/" {
        return true;
    }
    path[1..path.len() - 1].split('/').all(|component| {
        !component.is_empty()
            && component.len() <= MAX_COMPONENT_LEN
            && component.bytes().all(|b| b.is_ascii_lowercase())
    })
}

/// The components of a path, in order.
///
/// Also accepts the relative remainders produced by [`strip_prefix`],
/// which lack the leading `/`.
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|component| !component.is_empty())
}

/// Splits a valid non-root path into its parent path and its basename.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    debug_assert!(is_valid(path) && path != "/");
    let trimmed = &path[..path.len() - 1];
    // A valid path always has a '/' before the basename.
    let cut = trimmed.rfind('/').unwrap();
    (&path[..cut + 1], &trimmed[cut + 1..])
}

/// The longest common prefix of two valid paths that is itself a valid
/// path.
pub(crate) fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let mut end = 1;
    let mut a_components = a[1..].split_inclusive('/');
    let mut b_components = b[1..].split_inclusive('/');
    loop {
        match (a_components.next(), b_components.next()) {
            (Some(x), Some(y)) if x == y => end += x.len(),
            _ => return &a[..end],
        }
    }
}

/// The remainder of `path` past `prefix`.
///
/// `prefix` must be a path prefix of `path` at component granularity,
/// as produced by [`common_prefix`].
pub(crate) fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    debug_assert!(path.starts_with(prefix));
    &path[prefix.len()..]
}

/// Whether `path` names a strict descendant of `ancestor`.
pub(crate) fn is_strict_subpath(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len() && path.starts_with(ancestor)
}

/// Serializes child names into the canonical listing form: sorted
/// lexicographically, separated by commas.
pub(crate) fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = names.collect();
    names.sort_unstable();
    names.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity() {
        assert!(is_valid("/"));
        assert!(is_valid("/a/"));
        assert!(is_valid("/foo/bar/baz/"));
        assert!(!is_valid(""));
        assert!(!is_valid("a/"));
        assert!(!is_valid("/a"));
        assert!(!is_valid("//"));
        assert!(!is_valid("/a//b/"));
        assert!(!is_valid("/A/"));
        assert!(!is_valid("/a1/"));
        assert!(!is_valid("/ż/"));
        assert!(!is_valid(&format!("/{}/", "x".repeat(MAX_COMPONENT_LEN + 1))));
        assert!(is_valid(&format!("/{}/", "x".repeat(MAX_COMPONENT_LEN))));
    }

    #[test]
    fn parent_and_basename() {
        assert_eq!(split_parent("/a/"), ("/", "a"));
        assert_eq!(split_parent("/a/b/"), ("/a/", "b"));
        assert_eq!(split_parent("/foo/bar/baz/"), ("/foo/bar/", "baz"));
    }

    #[test]
    fn component_iteration() {
        assert_eq!(components("/").count(), 0);
        assert_eq!(components("/a/b/").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(components("b/c/").collect::<Vec<_>>(), ["b", "c"]);
        assert_eq!(components("").count(), 0);
    }

    #[test]
    fn common_prefixes() {
        assert_eq!(common_prefix("/a/b/", "/a/c/"), "/a/");
        assert_eq!(common_prefix("/a/b/", "/a/b/"), "/a/b/");
        assert_eq!(common_prefix("/a/b/", "/a/b/c/"), "/a/b/");
        assert_eq!(common_prefix("/ab/", "/ac/"), "/");
        assert_eq!(common_prefix("/", "/a/"), "/");
        assert_eq!(strip_prefix("/a/b/c/", "/a/"), "b/c/");
        assert_eq!(strip_prefix("/a/", "/a/"), "");
    }

    #[test]
    fn subpaths() {
        assert!(is_strict_subpath("/a/b/", "/a/"));
        assert!(is_strict_subpath("/a/b/", "/"));
        assert!(!is_strict_subpath("/a/", "/a/"));
        assert!(!is_strict_subpath("/ab/", "/a/"));
        assert!(!is_strict_subpath("/a/", "/a/b/"));
    }

    #[test]
    fn listing_serialization() {
        assert_eq!(join_names(["b", "a", "c"].into_iter()), "a,b,c");
        assert_eq!(join_names(["only"].into_iter()), "only");
        assert_eq!(join_names(std::iter::empty()), "");
    }
}
