//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Quote and join several paths, e.g. for a single `rm -rf`.
pub fn quote_paths<S: AsRef<str>>(paths: &[S]) -> String {
    paths
        .iter()
        .map(|p| quote_path(p.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Chain commands with `&&` so the first failure stops the chain.
pub fn and_then<S: AsRef<str>>(commands: &[S]) -> String {
    commands
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !c.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_arg_simple() {
        assert_eq!(quote_arg("master"), "master");
        assert_eq!(quote_arg("--upgrade"), "--upgrade");
    }

    #[test]
    fn quote_arg_with_spaces() {
        assert_eq!(quote_arg("my project"), "'my project'");
    }

    #[test]
    fn quote_arg_with_single_quote() {
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn quote_arg_empty() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn quote_path_always_quotes() {
        assert_eq!(quote_path("/var/www"), "'/var/www'");
        assert_eq!(quote_path("/var/www/it's"), "'/var/www/it'\\''s'");
    }

    #[test]
    fn quote_paths_joins_with_spaces() {
        assert_eq!(
            quote_paths(&["/a/releases/1", "/a/releases/2"]),
            "'/a/releases/1' '/a/releases/2'"
        );
    }

    #[test]
    fn and_then_skips_blank_commands() {
        assert_eq!(and_then(&["cd /srv", "", "ls"]), "cd /srv && ls");
    }
}
