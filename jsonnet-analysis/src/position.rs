//! Conversions between the one-indexed AST model and the zero-indexed LSP
//! wire positions, plus the range-containment predicates the finder and
//! resolver rely on. The translation happens exactly here and nowhere else.

use lsp_types::{Position, Range};

use crate::ast::{LocRange, Location};

/// Protocol position (zero-indexed) to AST location (one-indexed).
pub fn position_protocol_to_ast(point: Position) -> Location {
    Location {
        line: point.line as usize + 1,
        column: point.character as usize + 1,
    }
}

/// AST location (one-indexed) to protocol position (zero-indexed).
pub fn position_ast_to_protocol(location: Location) -> Position {
    Position {
        line: location.line.saturating_sub(1) as u32,
        character: location.column.saturating_sub(1) as u32,
    }
}

/// AST range to protocol range. Inverse of [`range_protocol_to_ast`] for
/// ranges with both ends set.
pub fn range_ast_to_protocol(range: &LocRange) -> Range {
    Range {
        start: position_ast_to_protocol(range.begin),
        end: position_ast_to_protocol(range.end),
    }
}

pub fn range_protocol_to_ast(file: &str, range: Range) -> LocRange {
    LocRange {
        file: file.to_string(),
        begin: position_protocol_to_ast(range.start),
        end: position_protocol_to_ast(range.end),
    }
}

pub fn new_protocol_range(
    start_line: u32,
    start_character: u32,
    end_line: u32,
    end_character: u32,
) -> Range {
    Range {
        start: Position {
            line: start_line,
            character: start_character,
        },
        end: Position {
            line: end_line,
            character: end_character,
        },
    }
}

/// Whether `point` falls inside `the_range`. The end column is exclusive.
pub fn in_range(point: Location, the_range: &LocRange) -> bool {
    if point.line == the_range.begin.line && point.column < the_range.begin.column {
        return false;
    }

    if point.line == the_range.end.line && point.column >= the_range.end.column {
        return false;
    }

    if point.line != the_range.begin.line || point.line != the_range.end.line {
        return the_range.begin.line <= point.line && point.line <= the_range.end.line;
    }

    true
}

/// Whether `a` covers at least the span of `b`.
pub fn range_greater_or_equal(a: &LocRange, b: &LocRange) -> bool {
    if a.begin.line > b.begin.line {
        return false;
    }
    if a.end.line < b.end.line {
        return false;
    }
    if a.begin.line == b.begin.line && a.begin.column > b.begin.column {
        return false;
    }
    if a.end.line == b.end.line && a.end.column < b.end.column {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast_range(l1: usize, c1: usize, l2: usize, c2: usize) -> LocRange {
        LocRange::new("t.jsonnet", Location::new(l1, c1), Location::new(l2, c2))
    }

    #[test]
    fn protocol_round_trip() {
        let range = ast_range(3, 7, 4, 2);
        let there = range_ast_to_protocol(&range);
        let back = range_protocol_to_ast("t.jsonnet", there);
        assert_eq!(back, range);
    }

    #[test]
    fn ast_round_trip() {
        let range = new_protocol_range(0, 6, 0, 24);
        let there = range_protocol_to_ast("t.jsonnet", range);
        assert_eq!(range_ast_to_protocol(&there), range);
    }

    #[test]
    fn in_range_single_line() {
        let range = ast_range(1, 5, 1, 10);
        assert!(!in_range(Location::new(1, 4), &range));
        assert!(in_range(Location::new(1, 5), &range));
        assert!(in_range(Location::new(1, 9), &range));
        // end column is exclusive
        assert!(!in_range(Location::new(1, 10), &range));
    }

    #[test]
    fn in_range_multi_line() {
        let range = ast_range(2, 5, 4, 3);
        assert!(in_range(Location::new(3, 1), &range));
        assert!(in_range(Location::new(2, 80), &range));
        assert!(!in_range(Location::new(1, 1), &range));
        assert!(!in_range(Location::new(4, 3), &range));
        assert!(in_range(Location::new(4, 2), &range));
    }

    #[test]
    fn enclosure_check() {
        let outer = ast_range(1, 1, 10, 1);
        let inner = ast_range(2, 3, 4, 5);
        assert!(range_greater_or_equal(&outer, &inner));
        assert!(!range_greater_or_equal(&inner, &outer));
        assert!(range_greater_or_equal(&inner, &inner));
    }
}
