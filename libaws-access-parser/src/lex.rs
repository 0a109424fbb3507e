use std::str::CharIndices;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    Bare { start: usize },
    Quoted { start: usize },
    Escaped { start: usize },
    Done,
}

/// Splits an access log line into fields.
///
/// A double-quoted span is a single field with its quotes kept, so request
/// lines and user agents survive their inner spaces. Inside quotes a
/// backslash escapes the following character. Everything else is separated
/// by spaces, tabs, and line breaks.
pub struct Lexer<'input> {
    input: &'input str,
    chars: CharIndices<'input>,
    state: State,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            chars: input.char_indices(),
            state: State::Between,
        }
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

impl<'input> Iterator for Lexer<'input> {
    type Item = &'input str;

    fn next(&mut self) -> Option<Self::Item> {
        use State::{Bare, Between, Done, Escaped, Quoted};

        loop {
            let (state, token) = match (self.state, self.chars.next()) {
                (Done, _) => return None,

                // Unterminated fields run to the end of the line
                (Between, None) => (Done, None),
                (Bare { start } | Quoted { start } | Escaped { start }, None) => {
                    (Done, Some(&self.input[start..]))
                }

                (Between, Some((_, c))) if is_blank(c) => (Between, None),
                (Between, Some((start, '"'))) => (Quoted { start }, None),
                (Between, Some((start, _))) => (Bare { start }, None),

                (Bare { start }, Some((i, c))) if is_blank(c) => {
                    (Between, Some(&self.input[start..i]))
                }
                (bare @ Bare { .. }, Some(_)) => (bare, None),

                (Quoted { start }, Some((i, '"'))) => (Between, Some(&self.input[start..=i])),
                (Quoted { start }, Some((_, '\\'))) => (Escaped { start }, None),
                (quoted @ Quoted { .. }, Some(_)) => (quoted, None),
                (Escaped { start }, Some(_)) => (Quoted { start }, None),
            };

            self.state = state;
            if token.is_some() {
                return token;
            }
        }
    }
}

#[test]
fn test_lexer() {
    fn t<const N: usize>(input: &str, expected: [&str; N]) {
        assert_eq!(Lexer::new(input).collect::<Vec<_>>(), expected)
    }

    t("", []);
    t("   \t ", []);
    t("200", ["200"]);
    t("0.000072 0.004025\t0.000048\r\n", ["0.000072", "0.004025", "0.000048"]);
    t(
        r#"200 "GET https://example.com:443/a HTTP/1.1" "curl/7.38.0" -"#,
        ["200", r#""GET https://example.com:443/a HTTP/1.1""#, r#""curl/7.38.0""#, "-"],
    );
    t(r#"elb"name"#, [r#"elb"name"#]);
    t(r#"ua "Mozilla \"quoted\" 5.0" x"#, ["ua", r#""Mozilla \"quoted\" 5.0""#, "x"]);
    t(r#"ua "truncated agent"#, ["ua", r#""truncated agent"#]);
    t(r#"""  "-""#, [r#""""#, r#""-""#]);
}
