//! Wildcard expansion of command arguments.

use crate::parser::CommandLine;
use glob::MatchOptions;
use log::debug;

/// `*`, `?` and `[...]` never match a leading `.`, as with glob(3).
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

fn has_wildcard(word: &str) -> bool {
    word.contains(['*', '?', '['])
}

/// Expands a single word against the filesystem.
///
/// Words without wildcard characters, invalid patterns and patterns that match
/// nothing are returned unchanged.
pub fn expand_word(word: &str) -> Vec<String> {
    if !has_wildcard(word) {
        return vec![word.to_string()];
    }

    match glob::glob_with(word, MATCH_OPTIONS) {
        Ok(paths) => {
            let expanded: Vec<String> = paths
                .filter_map(|p| p.ok())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            if expanded.is_empty() {
                vec![word.to_string()]
            } else {
                expanded
            }
        }
        Err(e) => {
            debug!("not expanding {word:?}: {e}");
            vec![word.to_string()]
        }
    }
}

/// Expands every argument of `cl` in place. The program name is left alone.
pub fn expand_arguments(cl: &mut CommandLine) {
    let Some((program, args)) = cl.argv.split_first() else {
        return;
    };
    let mut argv = vec![program.clone()];
    for arg in args {
        argv.extend(expand_word(arg));
    }
    cl.argv = argv;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "teamshell_expand_{}_{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_plain_word_untouched() {
        assert_eq!(expand_word("hello"), vec!["hello"]);
    }

    #[test]
    fn test_no_match_keeps_literal() {
        let pattern = "/definitely/not/here/*.nothing";
        assert_eq!(expand_word(pattern), vec![pattern]);
    }

    #[test]
    fn test_invalid_pattern_keeps_literal() {
        assert_eq!(expand_word("[unclosed"), vec!["[unclosed"]);
    }

    #[test]
    fn test_expands_matches_in_order() {
        let dir = make_unique_temp_dir();
        for name in ["b.txt", "a.txt", "c.log"] {
            fs::write(dir.join(name), "x").unwrap();
        }

        let pattern = format!("{}/*.txt", dir.display());
        let expanded = expand_word(&pattern);
        assert_eq!(
            expanded,
            vec![
                dir.join("a.txt").to_string_lossy().into_owned(),
                dir.join("b.txt").to_string_lossy().into_owned(),
            ]
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_wildcards_skip_dot_files() {
        let dir = make_unique_temp_dir();
        fs::write(dir.join(".hidden"), "x").unwrap();
        fs::write(dir.join("visible"), "x").unwrap();

        assert_eq!(
            expand_word(&format!("{}/*", dir.display())),
            vec![dir.join("visible").to_string_lossy().into_owned()]
        );
        assert_eq!(
            expand_word(&format!("{}/?hidden", dir.display())),
            vec![format!("{}/?hidden", dir.display())]
        );
        assert_eq!(
            expand_word(&format!("{}/.h*", dir.display())),
            vec![dir.join(".hidden").to_string_lossy().into_owned()]
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_program_name_is_not_expanded() {
        let dir = make_unique_temp_dir();
        fs::write(dir.join("only.txt"), "x").unwrap();

        let program = format!("{}/*", dir.display());
        let arg = format!("{}/*.txt", dir.display());
        let mut cl = CommandLine::new([program.clone(), arg, "plain".to_string()]);
        expand_arguments(&mut cl);

        assert_eq!(
            cl.argv,
            vec![
                program,
                dir.join("only.txt").to_string_lossy().into_owned(),
                "plain".to_string(),
            ]
        );

        let _ = fs::remove_dir_all(dir);
    }
}
