//! Symbolic path helpers.
//!
//! Windows keep the path the user typed (the symbolic path) alongside the
//! canonical one. These helpers normalise the symbolic form.

use std::path::{Path, PathBuf};

/// Strips trailing slashes, keeping a lone `/`.
pub fn tidy_sympath(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The parent of a symbolic path and the leaf that was left, or `None`
/// at the root.
pub fn split_parent(sym_path: &str) -> Option<(String, String)> {
    if sym_path == "/" || sym_path.is_empty() {
        return None;
    }
    let path = Path::new(sym_path);
    let leaf = path.file_name()?.to_string_lossy().into_owned();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => "/".to_string(),
    };
    Some((parent, leaf))
}

/// Joins a leaf onto a symbolic directory path.
pub fn make_path(dir: &str, leaf: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{leaf}")
    } else {
        format!("{dir}/{leaf}")
    }
}

/// `true` if `path` is `base` or lies below it.
pub fn is_at_or_below(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

/// Replaces a leading `home` with `~`.
pub fn abbreviate_home(sym_path: &str, home: Option<&Path>) -> String {
    let Some(home) = home.and_then(Path::to_str) else {
        return sym_path.to_string();
    };
    let home = home.trim_end_matches('/');
    if home.is_empty() {
        return sym_path.to_string();
    }
    match sym_path.strip_prefix(home) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{rest}"),
        _ => sym_path.to_string(),
    }
}

/// The canonical path for `sym_path`, or the path itself if it cannot be
/// resolved.
pub fn real_path(sym_path: &str) -> PathBuf {
    std::fs::canonicalize(sym_path).unwrap_or_else(|_| PathBuf::from(sym_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_removes_trailing_slashes() {
        assert_eq!(tidy_sympath("/home/me///"), "/home/me");
        assert_eq!(tidy_sympath("/"), "/");
        assert_eq!(tidy_sympath("///"), "/");
        assert_eq!(tidy_sympath("rel/"), "rel");
    }

    #[test]
    fn split_parent_handles_root() {
        assert_eq!(
            split_parent("/home/me"),
            Some(("/home".to_string(), "me".to_string()))
        );
        assert_eq!(split_parent("/home"), Some(("/".to_string(), "home".to_string())));
        assert_eq!(split_parent("/"), None);
    }

    #[test]
    fn make_path_avoids_double_slash() {
        assert_eq!(make_path("/", "etc"), "/etc");
        assert_eq!(make_path("/home", "me"), "/home/me");
    }

    #[test]
    fn home_abbreviation_needs_separator() {
        let home = Path::new("/home/me");
        assert_eq!(abbreviate_home("/home/me", Some(home)), "~");
        assert_eq!(abbreviate_home("/home/me/src", Some(home)), "~/src");
        assert_eq!(abbreviate_home("/home/meow", Some(home)), "/home/meow");
        assert_eq!(abbreviate_home("/etc", Some(home)), "/etc");
        assert_eq!(abbreviate_home("/etc", None), "/etc");
        assert_eq!(abbreviate_home("/etc", Some(Path::new("/"))), "/etc");
    }

    #[test]
    fn at_or_below() {
        assert!(is_at_or_below(Path::new("/mnt/usb/x"), Path::new("/mnt/usb")));
        assert!(is_at_or_below(Path::new("/mnt/usb"), Path::new("/mnt/usb")));
        assert!(!is_at_or_below(Path::new("/mnt/usb2"), Path::new("/mnt/usb")));
        assert!(is_at_or_below(Path::new("/anything"), Path::new("/")));
    }
}
