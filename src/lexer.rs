//! Lexical analysis for shell input lines.
//!
//! Quoting and escaping are fully resolved here; nothing downstream ever sees a
//! quote character that was used for grouping.

/// Scanner over one pipeline stage.
///
/// A single pass with one pending token buffer and three flags. Malformed input
/// never fails: an unterminated quote simply runs to the end of the line and a
/// trailing backslash is kept literally.
struct Tokenizer {
    tokens: Vec<String>,
    buffer: String,
    in_single: bool,
    in_double: bool,
    escaped: bool,
}

impl Tokenizer {
    fn new() -> Self {
        Tokenizer {
            tokens: Vec::new(),
            buffer: String::new(),
            in_single: false,
            in_double: false,
            escaped: false,
        }
    }

    fn make_tokens(mut self, line: &str) -> Vec<String> {
        for ch in line.chars() {
            if self.escaped {
                self.handle_escaped(ch);
            } else {
                self.handle_char(ch);
            }
        }

        if self.escaped {
            self.buffer.push('\\');
        }
        self.flush();
        self.tokens
    }

    fn handle_escaped(&mut self, ch: char) {
        if self.in_double && !matches!(ch, '"' | '\\' | '$' | '`') {
            self.buffer.push('\\');
        }
        self.buffer.push(ch);
        self.escaped = false;
    }

    fn handle_char(&mut self, ch: char) {
        match ch {
            '\\' if !self.in_single => self.escaped = true,
            '\'' if !self.in_double => self.in_single = !self.in_single,
            '"' if !self.in_single => self.in_double = !self.in_double,
            c if c.is_whitespace() && !self.in_single && !self.in_double => self.flush(),
            c => self.buffer.push(c),
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.tokens.push(std::mem::take(&mut self.buffer));
        }
    }
}

/// Split one stage into its command name and full argv.
///
/// `argv[0]` is the command itself; both are empty when the line holds no tokens.
///
/// ```
/// let (cmd, argv) = minishell::lexer::tokenize("echo 'a b' c");
/// assert_eq!(cmd, "echo");
/// assert_eq!(argv, ["echo", "a b", "c"]);
/// ```
pub fn tokenize(line: &str) -> (String, Vec<String>) {
    let argv = Tokenizer::new().make_tokens(line);
    let command = argv.first().cloned().unwrap_or_default();
    (command, argv)
}

/// Split a raw line into pipeline segments on every unquoted `|`.
///
/// Quotes are tracked with the same toggle rule as [`tokenize`], but escapes are
/// not: the separator check only looks at quote state. The segments keep their
/// quotes so they can be tokenized independently. A trailing empty segment is
/// dropped.
pub fn split_pipeline(line: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let (mut in_single, mut in_double) = (false, false);

    for c in line.chars() {
        if c == '|' && !in_single && !in_double {
            segments.push(std::mem::take(&mut current));
            continue;
        }
        if c == '\'' && !in_double {
            in_single = !in_single;
        }
        if c == '"' && !in_single {
            in_double = !in_double;
        }
        current.push(c);
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        tokenize(line).1
    }

    #[test]
    fn test_single_quotes_group_words() {
        let (cmd, argv) = tokenize("echo 'a b' c");
        assert_eq!(cmd, "echo");
        assert_eq!(argv, vec!["echo", "a b", "c"]);
    }

    #[test]
    fn test_escaped_quote_inside_double_quotes() {
        assert_eq!(argv(r#"echo "a\"b""#), vec!["echo", "a\"b"]);
    }

    #[test]
    fn test_double_quotes_keep_unknown_escapes() {
        assert_eq!(argv(r#"echo "a\nb\\c""#), vec!["echo", r"a\nb\c"]);
    }

    #[test]
    fn test_backslash_is_literal_in_single_quotes() {
        assert_eq!(argv(r"echo 'a\b'"), vec!["echo", r"a\b"]);
    }

    #[test]
    fn test_unquoted_escape_keeps_next_char() {
        assert_eq!(argv(r"echo a\ b \'x\'"), vec!["echo", "a b", "'x'"]);
    }

    #[test]
    fn test_trailing_backslash_is_preserved() {
        assert_eq!(argv(r"echo abc\"), vec!["echo", r"abc\"]);
        assert_eq!(argv("echo \\"), vec!["echo", "\\"]);
    }

    #[test]
    fn test_whitespace_runs_do_not_produce_empty_tokens() {
        assert_eq!(argv("  ls \t  -l   "), vec!["ls", "-l"]);
    }

    #[test]
    fn test_adjacent_quoted_parts_join() {
        assert_eq!(argv(r#"cat "/tmp/a"'b c'd"#), vec!["cat", "/tmp/ab cd"]);
    }

    #[test]
    fn test_empty_line_has_no_tokens() {
        let (cmd, argv) = tokenize("   ");
        assert!(cmd.is_empty());
        assert!(argv.is_empty());
    }

    #[test]
    fn test_quote_free_rejoin_is_idempotent_on_values() {
        let first = argv(r#"echo "hello   world" a\ b 'x'"#);
        let rejoined = first.join(" ");
        let quote_free: Vec<String> = argv(&rejoined);
        let words: Vec<&str> = first.iter().flat_map(|t| t.split_whitespace()).collect();
        assert_eq!(quote_free, words);
    }

    #[test]
    fn test_split_pipeline_respects_quotes() {
        assert_eq!(
            split_pipeline("echo 'a|b' | wc -c"),
            vec!["echo 'a|b' ", " wc -c"]
        );
        assert_eq!(
            split_pipeline(r#"echo "x | y"|cat|wc"#),
            vec![r#"echo "x | y""#, "cat", "wc"]
        );
    }

    #[test]
    fn test_split_pipeline_single_segment() {
        assert_eq!(split_pipeline("ls -la"), vec!["ls -la"]);
        assert!(split_pipeline("").is_empty());
    }

    #[test]
    fn test_split_pipeline_keeps_empty_middle_segment() {
        assert_eq!(split_pipeline("a || b"), vec!["a ", "", " b"]);
    }
}
