//! Decode the `-`-joined directory names Claude Code and Factory Droid use
//! to encode a project's working directory on disk.
//!
//! A path like `/Users/dev/my-project` is encoded as `-Users-dev-my-project`;
//! the ambiguity is that hyphens already appear inside real directory names,
//! and `--` alone can't tell a scoped package (`@org/pkg`) apart from a
//! hidden directory (`.git`). Resolved the same way a shell resolves a
//! relative path: walk the real directory tree and backtrack on dead ends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Best-effort decode of an encoded project directory name to a real
/// filesystem path. Falls back to a naive `-` → `/` join when no real
/// directory tree matches (e.g. the project was later deleted).
pub fn decode_project_path(encoded: &str) -> PathBuf {
    let segments = tokenize(encoded);
    if segments.is_empty() {
        return PathBuf::from("/");
    }
    dfs_resolve(&PathBuf::from("/"), &segments, 0)
        .unwrap_or_else(|| PathBuf::from(format!("/{}", segments.join("/"))))
}

/// Split on `-`, treating `--` as a path separator followed by an
/// ambiguous prefix character (`@` for scoped packages, `.` for hidden
/// directories — disambiguated later in `build_candidates`).
fn tokenize(encoded: &str) -> Vec<String> {
    let name = encoded.strip_prefix('-').unwrap_or(encoded);
    if name.is_empty() {
        return vec![];
    }
    let normalized = name.replace("--", "\x00/\x00@");
    let mut segments = Vec::new();
    for part in normalized.split('-') {
        for sub in part.split("\x00/") {
            let restored = sub.replace('\x00', "");
            if !restored.is_empty() {
                segments.push(restored);
            }
        }
    }
    segments
}

fn dfs_resolve(base: &Path, segments: &[String], start: usize) -> Option<PathBuf> {
    if start >= segments.len() {
        return if base.exists() { Some(base.to_path_buf()) } else { None };
    }

    let entries: HashSet<String> = match std::fs::read_dir(base) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect(),
        Err(_) => return None,
    };

    let remaining = segments.len() - start;
    for join_count in 1..=remaining {
        let candidates = build_candidates(segments, start, join_count);
        let next_start = start + join_count;

        for candidate in &candidates {
            if candidate.is_empty() || !entries.contains(candidate.as_str()) {
                continue;
            }
            let next_path = base.join(candidate);
            if next_start >= segments.len() {
                return Some(next_path);
            }
            if next_path.is_dir() {
                if let Some(found) = dfs_resolve(&next_path, segments, next_start) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn build_candidates(segments: &[String], start: usize, join_count: usize) -> Vec<String> {
    let has_prefix_marker = segments[start].starts_with('@');
    let parts: Vec<&str> = (0..join_count)
        .map(|i| segments[start + i].strip_prefix('@').unwrap_or(&segments[start + i]))
        .collect();
    let joined = parts.join("-");

    let mut candidates = Vec::with_capacity(4);
    if has_prefix_marker {
        candidates.push(format!("@{joined}"));
        candidates.push(format!(".{joined}"));
    }
    candidates.push(joined.clone());
    if join_count == 2 {
        candidates.push(format!("{}.{}", parts[0], parts[1]));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_name_decodes_to_root() {
        assert_eq!(decode_project_path(""), PathBuf::from("/"));
    }

    #[test]
    fn falls_back_to_naive_join_without_a_real_tree() {
        let decoded = decode_project_path("-tmp-definitely-not-a-real-project-xyz123");
        assert_eq!(decoded, PathBuf::from("/tmp/definitely/not/a/real/project/xyz123"));
    }

    #[test]
    fn resolves_against_a_real_directory_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("my-project");
        fs::create_dir_all(&project).unwrap();

        // Encode tmp/my-project the way Claude Code would, then decode it
        // back against the real tree rooted at "/".
        let tmp_str = tmp.path().to_string_lossy().replace('/', "-");
        let encoded = format!("{tmp_str}-my-project");
        assert_eq!(decode_project_path(&encoded), project);
    }

    #[test]
    fn resolves_scoped_package_style_double_hyphen() {
        let tmp = tempfile::tempdir().unwrap();
        let scope_dir = tmp.path().join("@acme");
        let project = scope_dir.join("widgets");
        fs::create_dir_all(&project).unwrap();

        let tmp_str = tmp.path().to_string_lossy().replace('/', "-");
        let encoded = format!("{tmp_str}--acme-widgets");
        assert_eq!(decode_project_path(&encoded), project);
    }
}
