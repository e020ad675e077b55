//! Lexical delimiter balance check.
//!
//! Never builds a tree. Comments, string literals and (for JavaScript and
//! TypeScript) regex literals are skipped using each language's own syntax so
//! that a `{` inside `"..."` or `/\{/` is not counted.

use crate::language::Language;

/// An unmatched or mismatched delimiter at a 1-based line/column
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DelimiterIssue {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Clone, Copy)]
struct Open {
    ch: char,
    line: usize,
    column: usize,
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

pub(crate) fn check(text: &str, language: Language) -> Vec<DelimiterIssue> {
    let chars: Vec<char> = text.chars().collect();
    let line_comment: Vec<char> = language.line_comment().chars().collect();
    let block_comments = language.has_block_comments();
    let regex_literals = matches!(language, Language::JavaScript | Language::TypeScript);

    let mut issues = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut i = 0;
    // Index of the last char outside comments and whitespace.
    let mut last_token: Option<usize> = None;

    // Advance one char, keeping line/column in sync.
    macro_rules! bump {
        () => {{
            if chars[i] == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            i += 1;
        }};
    }

    while i < chars.len() {
        let ch = chars[i];

        if chars[i..].starts_with(&line_comment) {
            while i < chars.len() && chars[i] != '\n' {
                bump!();
            }
            continue;
        }

        if block_comments && ch == '/' && chars.get(i + 1) == Some(&'*') {
            bump!();
            bump!();
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                bump!();
            }
            if i < chars.len() {
                bump!();
                bump!();
            }
            continue;
        }

        if language == Language::Rust {
            if let Some(hashes) = raw_string_hashes(&chars, i) {
                // r##"..."## : skip the prefix, then scan for `"` followed by the same hashes.
                for _ in 0..hashes + 2 {
                    bump!();
                }
                while i < chars.len() {
                    let closes = chars[i] == '"'
                        && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#'));
                    if closes {
                        for _ in 0..=hashes {
                            bump!();
                        }
                        break;
                    }
                    bump!();
                }
                continue;
            }
        }

        if regex_literals && ch == '/' && regex_allowed(&chars, last_token) {
            if let Some(len) = regex_literal_len(&chars[i..]) {
                for _ in 0..len {
                    bump!();
                }
                last_token = Some(i - 1);
                continue;
            }
        }

        if is_string_start(&chars, i, language) {
            let triple = (ch == '"' || ch == '\'')
                && chars.get(i + 1) == Some(&ch)
                && chars.get(i + 2) == Some(&ch)
                && matches!(language, Language::Python | Language::Java);
            let quote = ch;
            if triple {
                bump!();
                bump!();
                bump!();
                while i < chars.len()
                    && !(chars[i] == quote
                        && chars.get(i + 1) == Some(&quote)
                        && chars.get(i + 2) == Some(&quote))
                {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        bump!();
                    }
                    bump!();
                }
                for _ in 0..3 {
                    if i < chars.len() {
                        bump!();
                    }
                }
            } else {
                bump!();
                let multiline = quote == '`' || language == Language::Rust;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\n' && !multiline {
                        break;
                    }
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        bump!();
                    }
                    bump!();
                }
                if i < chars.len() && chars[i] == quote {
                    bump!();
                }
            }
            last_token = Some(i - 1);
            continue;
        }

        match ch {
            '(' | '[' | '{' => stack.push(Open { ch, line, column }),
            ')' | ']' | '}' => match stack.pop() {
                Some(open) if closing_for(open.ch) == ch => {}
                Some(open) => {
                    issues.push(DelimiterIssue {
                        line,
                        column,
                        message: format!(
                            "unbalanced delimiter: `{ch}` closes `{}` opened at {}:{}",
                            open.ch, open.line, open.column
                        ),
                    });
                }
                None => issues.push(DelimiterIssue {
                    line,
                    column,
                    message: format!("unbalanced delimiter: unexpected `{ch}`"),
                }),
            },
            _ => {}
        }
        if !ch.is_whitespace() {
            last_token = Some(i);
        }
        bump!();
    }

    for open in stack {
        issues.push(DelimiterIssue {
            line: open.line,
            column: open.column,
            message: format!(
                "unbalanced delimiter: `{}` is never closed by `{}`",
                open.ch,
                closing_for(open.ch)
            ),
        });
    }

    issues
}

/// Number of `#` in a Rust raw string prefix starting at `i` (`r"`, `r#"`, `br#"`)
fn raw_string_hashes(chars: &[char], i: usize) -> Option<usize> {
    if chars[i] != 'r' {
        return None;
    }
    let prev = i.checked_sub(1).map(|p| chars[p]);
    let prefix_ok = match prev {
        None => true,
        Some('b') => i < 2 || !chars[i - 2].is_alphanumeric() && chars[i - 2] != '_',
        Some(c) => !c.is_alphanumeric() && c != '_',
    };
    if !prefix_ok {
        return None;
    }
    let mut hashes = 0;
    while chars.get(i + 1 + hashes) == Some(&'#') {
        hashes += 1;
    }
    (chars.get(i + 1 + hashes) == Some(&'"')).then_some(hashes)
}

/// Keywords after which `/` starts a regex rather than a division
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Whether a `/` following the token ending at `last` is in expression position
fn regex_allowed(chars: &[char], last: Option<usize>) -> bool {
    let Some(last) = last else {
        return true;
    };
    let prev = chars[last];
    if prev.is_alphanumeric() || prev == '_' || prev == '$' {
        let start = chars[..=last]
            .iter()
            .rposition(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
            .map_or(0, |p| p + 1);
        let word: String = chars[start..=last].iter().collect();
        return REGEX_PREFIX_KEYWORDS.contains(&word.as_str());
    }
    !matches!(prev, ')' | ']' | '}' | '"' | '\'' | '`')
}

/// Length of the regex literal at the start of `chars` (`/.../flags`), if it closes on this line
fn regex_literal_len(chars: &[char]) -> Option<usize> {
    if chars.get(1).is_some_and(|c| *c == '/' || *c == '*') {
        return None;
    }
    let mut in_class = false;
    let mut j = 1;
    while j < chars.len() {
        match chars[j] {
            '\n' => return None,
            '\\' => j += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                j += 1;
                while chars.get(j).is_some_and(|c| c.is_alphanumeric()) {
                    j += 1;
                }
                return Some(j);
            }
            _ => {}
        }
        j += 1;
    }
    None
}

fn is_string_start(chars: &[char], i: usize, language: Language) -> bool {
    match chars[i] {
        '"' => true,
        '`' => matches!(language, Language::JavaScript | Language::TypeScript),
        // Rust lifetimes (`'a`) share the quote; only `'x'` and `'\n'` are literals.
        '\'' if language == Language::Rust => {
            chars.get(i + 1) == Some(&'\\') || chars.get(i + 2) == Some(&'\'')
        }
        '\'' => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_java_is_clean() {
        let code = r#"class A { void f(int[] a) { String s = "})]"; /* ( */ } // {"#;
        assert!(check(code, Language::Java).is_empty());
    }

    #[test]
    fn unclosed_paren_is_reported() {
        let issues = check("public class Invalid { public void method( { } }", Language::Java);
        assert!(!issues.is_empty());
        assert!(issues[0].message.contains("unbalanced delimiter"));
    }

    #[test]
    fn rust_lifetimes_are_not_strings() {
        let code = "fn f<'a>(x: &'a str) -> char { let c = '{'; x.chars().next().unwrap_or(c) }";
        assert!(check(code, Language::Rust).is_empty());
    }

    #[test]
    fn rust_raw_strings_are_skipped() {
        let code = r###"fn f() -> &'static str { r#"a "{" b"# }"###;
        assert!(check(code, Language::Rust).is_empty());
    }

    #[test]
    fn python_comments_and_triple_quotes() {
        let code = "def f():\n    \"\"\"doc ( \"\"\"\n    return [1, 2]  # ]\n";
        assert!(check(code, Language::Python).is_empty());
    }

    #[test]
    fn regex_literals_are_skipped() {
        let code = "const a = /\\(/;\nconst b = x.match(/[)\\]}]+/g);\nfunction f() { return /{/.test(a); }\n";
        assert!(check(code, Language::JavaScript).is_empty());
        assert!(check(code, Language::TypeScript).is_empty());
    }

    #[test]
    fn division_is_not_a_regex() {
        let code = "const r = (a) / 2 / (b);\nconst s = arr[0] / n;\n";
        assert!(check(code, Language::JavaScript).is_empty());
        let issues = check("const r = a / (b / c;\n", Language::JavaScript);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn stray_closer_reports_position() {
        let issues = check("a)\n", Language::JavaScript);
        assert_eq!(issues.len(), 1);
        assert_eq!((issues[0].line, issues[0].column), (1, 2));
    }
}
