//! Order-insensitive canonical form of a schema dump

/// Reduce a dump to its comparable lines.
///
/// Lines are trimmed, and blank lines and `--` comments are dropped.
/// Trailing commas are then stripped so that column order inside a `CREATE`
/// block does not matter. A line holding only commas is kept as an empty
/// line. The result is sorted.
pub fn normalize(dump: &str) -> Vec<String> {
    let mut lines: Vec<String> = dump
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("--") {
                return None;
            }
            Some(line.trim_end_matches(',').to_string())
        })
        .collect();
    lines.sort();
    lines
}

/// Render normalized lines back to text
pub fn render(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn drops_blanks_and_comments() {
        let dump = "--\n-- PostgreSQL database dump\n--\n\n  \nSET statement_timeout = 0;\n    -- indented comment\n";
        assert_eq!(normalize(dump), vec!["SET statement_timeout = 0;"]);
    }

    #[test]
    fn strips_trailing_commas_and_whitespace() {
        let dump = "CREATE TABLE public.users (\n    id integer,\n    name text\n);\n";
        assert_eq!(
            normalize(dump),
            vec![");", "CREATE TABLE public.users (", "id integer", "name text"]
        );
    }

    #[test]
    fn column_order_does_not_matter() {
        let a = "CREATE TABLE t (\n    a int,\n    b int\n);\n";
        let b = "CREATE TABLE t (\n    b int,\n    a int\n);\n";
        assert_eq!(normalize(a), normalize(b));
    }

    #[test]
    fn comment_marker_only_at_line_start() {
        let dump = "SELECT 1; -- trailing\n";
        assert_eq!(normalize(dump), vec!["SELECT 1; -- trailing"]);
    }

    #[test]
    fn idempotent() {
        let dump = "-- header\nCREATE TABLE b (\n  y int,,\n  x int\n);\n\nCREATE TABLE a (id int);\r\n";
        let once = normalize(dump);
        assert_eq!(normalize(&render(&once)), once);
    }

    #[test]
    fn comma_only_line_still_counts() {
        let clean = "CREATE TABLE t (\n a int\n);";
        let stray = "CREATE TABLE t (\n a int\n,\n);";
        assert_eq!(normalize(stray), vec!["", ");", "CREATE TABLE t (", "a int"]);
        assert_ne!(normalize(clean), normalize(stray));
    }

    #[test]
    fn whitespace_before_comma_is_kept() {
        assert_eq!(normalize("  a int ,\n"), vec!["a int "]);
    }

    #[test]
    fn empty_input() {
        assert!(normalize("").is_empty());
        assert!(normalize("\n\n-- only comments\n").is_empty());
        assert_eq!(render(&[]), "");
    }
}
