//! Formatting edits computed as a line diff against the formatter output.
//!
//! Sending minimal edits instead of a whole-document replacement keeps the
//! client's cursor and folding state intact.

use similar::{Algorithm, ChangeTag, TextDiff};
use tower_lsp::lsp_types::{Position, Range, TextEdit};

/// Minimal line-based edits turning `original` into `formatted`.
pub fn text_edits(original: &str, formatted: &str) -> Vec<TextEdit> {
    if original == formatted {
        return Vec::new();
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(original, formatted);

    let mut edits = Vec::new();
    let mut builder: Option<EditBuilder> = None;
    let mut cursor = 0u32;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                flush(&mut builder, &mut edits);
                cursor += 1;
            }
            ChangeTag::Delete => {
                let line = cursor;
                cursor += 1;
                match &mut builder {
                    Some(edit) => edit.end_line = line + 1,
                    None => builder = Some(EditBuilder::deletion(line)),
                }
            }
            ChangeTag::Insert => {
                let text = change.value();
                match &mut builder {
                    Some(edit) => edit.new_text.push_str(text),
                    None => builder = Some(EditBuilder::insertion(cursor, text)),
                }
            }
        }
    }

    flush(&mut builder, &mut edits);
    edits
}

fn flush(builder: &mut Option<EditBuilder>, edits: &mut Vec<TextEdit>) {
    if let Some(edit) = builder.take() {
        edits.push(TextEdit {
            range: Range {
                start: Position::new(edit.start_line, 0),
                end: Position::new(edit.end_line, 0),
            },
            new_text: edit.new_text,
        });
    }
}

struct EditBuilder {
    start_line: u32,
    end_line: u32,
    new_text: String,
}

impl EditBuilder {
    fn deletion(line: u32) -> Self {
        Self {
            start_line: line,
            end_line: line + 1,
            new_text: String::new(),
        }
    }

    fn insertion(line: u32, text: &str) -> Self {
        Self {
            start_line: line,
            end_line: line,
            new_text: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(original: &str, edits: &[TextEdit]) -> String {
        let mut lines: Vec<String> = original.split_inclusive('\n').map(str::to_string).collect();
        let mut sorted = edits.to_vec();
        sorted.sort_by_key(|e| e.range.start.line);
        for edit in sorted.into_iter().rev() {
            let start = edit.range.start.line as usize;
            let end = (edit.range.end.line as usize).min(lines.len());
            lines.splice(start..end, [edit.new_text.clone()]);
        }
        lines.concat()
    }

    #[test]
    fn identical_text_needs_no_edits() {
        assert!(text_edits("{ a: 1 }\n", "{ a: 1 }\n").is_empty());
    }

    #[test]
    fn changed_line_is_replaced_in_place() {
        let original = "{\n  a:1,\n  b: 2,\n}\n";
        let formatted = "{\n  a: 1,\n  b: 2,\n}\n";
        let edits = text_edits(original, formatted);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].range.start, Position::new(1, 0));
        assert_eq!(edits[0].range.end, Position::new(2, 0));
        assert_eq!(edits[0].new_text, "  a: 1,\n");
        assert_eq!(apply(original, &edits), formatted);
    }

    #[test]
    fn deleted_blank_lines_collapse() {
        let original = "{\n\n\n  a: 1,\n}\n";
        let formatted = "{\n  a: 1,\n}\n";
        let edits = text_edits(original, formatted);
        assert_eq!(apply(original, &edits), formatted);
    }

    #[test]
    fn inserted_lines_keep_context_untouched() {
        let original = "{\n  b: 2,\n}\n";
        let formatted = "{\n  a: 1,\n  b: 2,\n}\n";
        let edits = text_edits(original, formatted);
        assert_eq!(apply(original, &edits), formatted);
        for edit in &edits {
            assert_eq!(edit.range.start.character, 0);
        }
    }

    #[test]
    fn multiple_disjoint_regions_yield_multiple_edits() {
        let original = "{\n  a :1,\n  keep: 0,\n  b :2,\n}\n";
        let formatted = "{\n  a: 1,\n  keep: 0,\n  b: 2,\n}\n";
        let edits = text_edits(original, formatted);
        assert_eq!(edits.len(), 2);
        assert_eq!(apply(original, &edits), formatted);
    }
}
