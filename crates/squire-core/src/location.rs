//! Source positions inside an executed SQL document

use serde::{Deserialize, Serialize};

/// A 1-indexed line/column pair inside a SQL document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed, counted in characters)
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Convert a PostgreSQL error position into a line/column.
///
/// PostgreSQL reports positions as 1-based *character* offsets into the
/// statement text, not byte offsets, so multi-byte characters count once.
/// A position pointing at a newline resolves to the column just past the
/// end of that line. Returns `None` when the position is outside `src`.
pub fn position_to_line_col(src: &str, position: usize) -> Option<Location> {
    if position == 0 {
        return None;
    }

    let mut line = 1;
    let mut column = 0;

    for (index, c) in src.chars().enumerate() {
        let at = index + 1 == position;

        if c == '\n' {
            if at {
                return Some(Location::new(line, column + 1));
            }
            line += 1;
            column = 0;
            continue;
        }

        column += 1;
        if at {
            return Some(Location::new(line, column));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_character() {
        assert_eq!(position_to_line_col("SELECT 1;", 1), Some(Location::new(1, 1)));
    }

    #[test]
    fn position_on_later_line() {
        let sql = "CREATE TABLE a (\n  id INT,\n);\n";
        // The ')' on line 3 is the 28th character.
        assert_eq!(position_to_line_col(sql, 28), Some(Location::new(3, 1)));
        assert_eq!(position_to_line_col(sql, 20), Some(Location::new(2, 3)));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let sql = "-- héllo\nSELECT x;";
        // 'x' is character 17 but byte 18.
        assert_eq!(position_to_line_col(sql, 17), Some(Location::new(2, 8)));
    }

    #[test]
    fn newline_position_points_past_line_end() {
        assert_eq!(position_to_line_col("ab\ncd", 3), Some(Location::new(1, 3)));
    }

    #[test]
    fn out_of_range() {
        assert_eq!(position_to_line_col("abc", 0), None);
        assert_eq!(position_to_line_col("abc", 4), None);
    }

    #[test]
    fn display() {
        assert_eq!(Location::new(3, 7).to_string(), "line 3, column 7");
    }
}
