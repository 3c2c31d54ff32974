//! Statement splitting and classification for ad-hoc SQL.

/// Split a SQL blob into statements on semicolons outside quotes.
///
/// Single and double quotes toggle two independent states unless the previous
/// character is a backslash; a `;` splits only when both are closed. A quote of
/// one kind inside a literal of the other kind still toggles its own state, so
/// `"it's"` leaves a single quote open. A doubled quote (`''`) toggles twice,
/// so the SQL-standard escape survives. Dollar quoting and comments are not
/// recognised: a `;` inside either still ends the statement.
///
/// Returned statements are trimmed and carry no terminator. Blank statements are
/// dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev: Option<char> = None;
    let mut start = 0;

    for (i, ch) in sql.char_indices() {
        let escaped = prev == Some('\\');
        match ch {
            '\'' if !escaped => in_single = !in_single,
            '"' if !escaped => in_double = !in_double,
            ';' if !in_single && !in_double => {
                push_statement(&mut statements, &sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        prev = Some(ch);
    }
    push_statement(&mut statements, &sql[start..]);
    statements
}

fn push_statement(out: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Whether a statement produces rows that should be returned to the caller.
///
/// Leading whitespace, comments and opening parentheses are skipped before the
/// `SELECT` keyword check.
pub fn is_select_like(statement: &str) -> bool {
    let s = strip_sql_prefix(statement);
    starts_with_keyword(s, "SELECT")
        && s[6..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Strip leading whitespace, SQL comments (`--` and `/* */`), and parentheses.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    s.get(0..keyword.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_semicolon_in_string() {
        let out = split_statements("SELECT * FROM t WHERE x = ';'; SELECT 1;");
        assert_eq!(out, vec!["SELECT * FROM t WHERE x = ';'", "SELECT 1"]);
    }

    #[test]
    fn trailing_statement_without_terminator() {
        let out = split_statements("INSERT INTO t VALUES (1); SELECT * FROM t");
        assert_eq!(out, vec!["INSERT INTO t VALUES (1)", "SELECT * FROM t"]);
    }

    #[test]
    fn blank_statements_dropped() {
        assert_eq!(split_statements(" ;; \n ; SELECT 1 ;  "), vec!["SELECT 1"]);
        assert!(split_statements("").is_empty());
        assert!(split_statements("   \n\t").is_empty());
    }

    #[test]
    fn double_quoted_identifier_with_semicolon() {
        let out = split_statements(r#"SELECT "a;b" FROM t; SELECT 2"#);
        assert_eq!(out, vec![r#"SELECT "a;b" FROM t"#, "SELECT 2"]);
    }

    #[test]
    fn backslash_escaped_quote() {
        let out = split_statements(r"SELECT 'it\'s; fine'; SELECT 2");
        assert_eq!(out, vec![r"SELECT 'it\'s; fine'", "SELECT 2"]);
    }

    #[test]
    fn doubled_quote_escape() {
        let out = split_statements("SELECT 'it''s; fine'; SELECT 2");
        assert_eq!(out, vec!["SELECT 'it''s; fine'", "SELECT 2"]);
    }

    #[test]
    fn quote_states_toggle_independently() {
        // The apostrophe opens a single-quote state the double quotes never close.
        let out = split_statements(r#"SELECT "it's"; SELECT 1"#);
        assert_eq!(out, vec![r#"SELECT "it's"; SELECT 1"#]);

        let out = split_statements(r#"SELECT '"'; SELECT 2"#);
        assert_eq!(out, vec![r#"SELECT '"'; SELECT 2"#]);

        // Balanced pairs of both kinds close again.
        let out = split_statements(r#"SELECT '"x"'; SELECT "a'b'"; SELECT 3"#);
        assert_eq!(out, vec![r#"SELECT '"x"'"#, r#"SELECT "a'b'""#, "SELECT 3"]);
    }

    #[test]
    fn segment_count_bounded_by_semicolons() {
        let sql = "a; b ;c;; d";
        let out = split_statements(sql);
        assert!(out.len() <= sql.matches(';').count() + 1);
        assert_eq!(out.join(";"), "a;b;c;d");
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let out = split_statements("SELECT 'héllo;wörld'; SELECT '✓'");
        assert_eq!(out, vec!["SELECT 'héllo;wörld'", "SELECT '✓'"]);
    }

    #[test]
    fn select_classification() {
        assert!(is_select_like("SELECT 1"));
        assert!(is_select_like("  select * from t"));
        assert!(is_select_like("\n-- comment\nSELECT 1"));
        assert!(is_select_like("/* c */ (SELECT 1)"));
        assert!(is_select_like("SELECT"));
        assert!(!is_select_like("INSERT INTO t VALUES (1)"));
        assert!(!is_select_like("SELECTED"));
        assert!(!is_select_like("UPDATE t SET a = 'SELECT'"));
        assert!(!is_select_like("-- only a comment"));
        assert!(!is_select_like(""));
    }
}
