//! Filename sanitization and recording-path selection.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Replace filesystem-hostile code points in a path component.
///
/// Substitutes are chosen so the result still reads like the original
/// name; the mapping is idempotent because no substitute appears on the
/// left-hand side.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' => '_',
            '/' | '\\' => '-',
            '<' => '(',
            '>' => ')',
            ':' => '=',
            '"' | '|' => '-',
            '?' => '_',
            '*' => '★',
            other => other,
        })
        .collect()
}

/// Pick the recording path `<base>/<date>-<name>[ N].ts`, taking the
/// smallest `N >= 2` that does not collide with an existing file (no
/// suffix for the first recording of the day).
pub fn next_save_path(base: &Path, name: &str, date: NaiveDate) -> PathBuf {
    let stem = format!("{}-{}", date.format("%Y-%m-%d"), name);
    let first = base.join(format!("{stem}.ts"));
    if !first.exists() {
        return first;
    }
    for n in 2.. {
        let candidate = base.join(format!("{stem} {n}.ts"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("save-path numbering is unbounded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_hostile_chars() {
        assert_eq!(sanitize_component("a.b"), "a_b");
        assert_eq!(sanitize_component("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_component("<a>"), "(a)");
        assert_eq!(sanitize_component("a:b"), "a=b");
        assert_eq!(sanitize_component("a\"b|c"), "a-b-c");
        assert_eq!(sanitize_component("who?"), "who_");
        assert_eq!(sanitize_component("star*"), "star★");
        assert_eq!(sanitize_component("まの ちゃん"), "まの ちゃん");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["a.b/c*d?e", "<all>:the|\"chars\"", "already-clean name"] {
            let once = sanitize_component(input);
            assert_eq!(once, sanitize_component(&once), "input: {input}");
        }
    }

    #[test]
    fn save_path_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();

        let first = next_save_path(dir.path(), "mano", date);
        assert_eq!(first, dir.path().join("2024-05-17-mano.ts"));

        std::fs::write(&first, b"").unwrap();
        let second = next_save_path(dir.path(), "mano", date);
        assert_eq!(second, dir.path().join("2024-05-17-mano 2.ts"));

        std::fs::write(&second, b"").unwrap();
        let third = next_save_path(dir.path(), "mano", date);
        assert_eq!(third, dir.path().join("2024-05-17-mano 3.ts"));
    }
}
