// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Path safety: every tool path resolves against cwd, and any resolution
//! that escapes cwd fails — including escapes through symlinked ancestors.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Path escapes working directory: {0}")]
    Escape(String),
    #[error("io error for {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Lexically normalize `..` and `.` without touching the filesystem.
/// A leading `..` that would climb above the root of the path is an escape.
fn normalize(p: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Resolve `path_str` against `cwd`, rejecting anything that lands outside.
///
/// The target may not exist yet (write creates files), so the check is
/// lexical first; when the path exists it is additionally canonicalized so a
/// symlink cannot smuggle the result out of the project root.
pub fn resolve_path(cwd: &Path, path_str: &str) -> Result<PathBuf, FsError> {
    let cwd = cwd.canonicalize().map_err(|e| FsError::Io {
        path: cwd.display().to_string(),
        source: e,
    })?;
    let candidate = {
        let p = Path::new(path_str);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            cwd.join(p)
        }
    };
    let normalized =
        normalize(&candidate).ok_or_else(|| FsError::Escape(path_str.to_string()))?;
    if !normalized.starts_with(&cwd) {
        return Err(FsError::Escape(path_str.to_string()));
    }
    if normalized.exists() {
        let real = normalized.canonicalize().map_err(|e| FsError::Io {
            path: normalized.display().to_string(),
            source: e,
        })?;
        if !real.starts_with(&cwd) {
            return Err(FsError::Escape(path_str.to_string()));
        }
        return Ok(real);
    }
    Ok(normalized)
}

pub fn read_text(path: &Path) -> Result<String, FsError> {
    let bytes = std::fs::read(path).map_err(|e| FsError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Compile a path glob (`*`, `?`, `**`) to a regex over `/`-separated
/// relative paths. `*` and `?` do not cross separators; `**` does.
pub fn path_glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // "**/" may match zero directories
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

/// Match a relative path against an include filter. A pattern without `/`
/// matches the file name; a pattern with `/` matches the whole path.
pub fn include_matches(pattern: &str, rel_path: &str) -> bool {
    let target = if pattern.contains('/') {
        rel_path
    } else {
        rel_path.rsplit('/').next().unwrap_or(rel_path)
    };
    path_glob_to_regex(pattern).is_some_and(|re| re.is_match(target))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
