//! C1: the lexical preprocessor. Strips comments, case-folds everything
//! outside string literals, and collapses whitespace — line by line, the
//! way the source program does it, with a latching flag carrying a
//! `/* ... */` block comment across lines.

/// Folds everything left of the first `"` to lowercase, leaving the
/// quoted remainder (if any) untouched so string literals survive.
fn fold_case_outside_quotes(line: &str) -> String {
    match line.find('"') {
        Some(idx) => {
            let (head, tail) = line.split_at(idx);
            format!("{}{}", head.to_lowercase(), tail)
        }
        None => line.to_lowercase(),
    }
}

/// Collapses runs of spaces/tabs to a single space and trims the ends.
fn collapse_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for ch in line.trim().chars() {
        if ch == ' ' || ch == '\t' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Runs C1 over a full source file, returning the canonicalized lines.
/// Lines that are pure comments (or interior to a multi-line block comment)
/// are dropped entirely rather than emitted as blank lines.
pub fn preprocess(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_block_comment = false;

    for raw_line in source.lines() {
        let mut line = raw_line;

        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    line = &line[end + 2..];
                    in_block_comment = false;
                }
                None => continue,
            }
        }

        // Single-line block comment: `foo /* bar */ baz`.
        let mut working = String::new();
        let mut rest = line;
        loop {
            match rest.find("/*") {
                Some(start) => match rest[start..].find("*/") {
                    Some(end) => {
                        working.push_str(&rest[..start]);
                        rest = &rest[start + end + 2..];
                    }
                    None => {
                        working.push_str(&rest[..start]);
                        in_block_comment = true;
                        rest = "";
                        break;
                    }
                },
                None => {
                    working.push_str(rest);
                    rest = "";
                    break;
                }
            }
        }
        let _ = rest;

        let without_line_comment = match working.find("//") {
            Some(idx) => &working[..idx],
            None => &working[..],
        };

        let folded = fold_case_outside_quotes(without_line_comment);
        let collapsed = collapse_whitespace(&folded);
        if !collapsed.is_empty() {
            out.push(collapsed);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_line_comment() {
        let lines = preprocess("MOV X0, #1 // load one");
        assert_eq!(lines, vec!["mov x0,#1".to_string()]);
    }

    #[test]
    fn preserves_string_literal_case() {
        let lines = preprocess(r#"MSG:.asciz "Hello World""#);
        assert_eq!(lines, vec!["msg:.asciz \"Hello World\"".to_string()]);
    }

    #[test]
    fn drops_single_line_block_comment() {
        let lines = preprocess("MOV X0, /* comment */ #1");
        assert_eq!(lines, vec!["mov x0, #1".to_string()]);
    }

    #[test]
    fn drops_multiline_block_comment() {
        let lines = preprocess("MOV X0, #1 /* start\nstill a comment\nend */ ADD X0,X0,X1");
        assert_eq!(lines, vec!["mov x0, #1".to_string(), "add x0,x0,x1".to_string()]);
    }

    #[test]
    fn collapses_internal_whitespace() {
        let lines = preprocess("  add   x0,  x0,   x1  ");
        assert_eq!(lines, vec!["add x0, x0, x1".to_string()]);
    }
}
