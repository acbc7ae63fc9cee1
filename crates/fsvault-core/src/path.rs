//! Mapping of logical keys onto sandboxed filesystem paths.
//!
//! Keys use `/` as their separator and mirror the directory tree under the
//! vault root. Resolution is purely lexical: nothing here touches the disk.

use std::path::PathBuf;

pub const SEPARATOR: char = '/';

/// Resolve `key` to a path confined under `root`.
///
/// `.`, `..` and repeated separators are collapsed; `..` segments that would
/// climb above the root are discarded. An empty root applies no prefix.
pub fn resolve(root: &str, key: &str) -> PathBuf {
    let confined = canonical(key);

    if root.is_empty() {
        if key.starts_with(SEPARATOR) {
            return PathBuf::from(confined);
        }
        let relative = confined.trim_start_matches(SEPARATOR);
        if relative.is_empty() {
            return PathBuf::from(".");
        }
        return PathBuf::from(relative);
    }

    PathBuf::from(clean(&format!("{root}{SEPARATOR}{confined}")))
}

/// Join a listed child name onto the key it was listed under.
pub fn child_key(key: &str, name: &str) -> String {
    if key.is_empty() {
        return clean(name);
    }
    clean(&format!("{key}{SEPARATOR}{name}"))
}

/// Clean `key` as if it were rooted, so no `..` can survive at the front.
/// Every spelling of a key that resolves to the same path maps to one
/// canonical string, which is what locks are keyed on.
pub fn canonical(key: &str) -> String {
    clean(&format!("{SEPARATOR}{key}"))
}

/// Lexical path cleaning: the shortest equivalent form of `path`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with(SEPARATOR);
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("{SEPARATOR}{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
