// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span-based text edits.

use serde::Serialize;

use crate::error::InjectError;

/// Replace `start..end` of the source with `replacement`.
///
/// Insertions have `start == end`. Edits sharing an offset apply in `rank`
/// order, lowest first in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    /// Id of the injection point this edit realises.
    pub edit_id: usize,
    pub start: usize,
    pub end: usize,
    pub replacement: String,
    pub rank: u8,
}

impl TextEdit {
    pub fn insert(edit_id: usize, offset: usize, text: impl Into<String>, rank: u8) -> Self {
        Self {
            edit_id,
            start: offset,
            end: offset,
            replacement: text.into(),
            rank,
        }
    }

    pub fn replace(edit_id: usize, start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            edit_id,
            start,
            end,
            replacement: text.into(),
            rank: 0,
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

/// Apply `edits` to `source` bottom-to-top.
///
/// Every span refers to the unedited `source`; applying from the end of the
/// file backwards keeps the spans above each applied edit valid. Overlapping
/// replacements are rejected.
pub fn apply_edits(source: &str, edits: &[TextEdit]) -> Result<String, InjectError> {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.start, e.rank, e.edit_id));

    for edit in &ordered {
        if edit.start > edit.end
            || edit.end > source.len()
            || !source.is_char_boundary(edit.start)
            || !source.is_char_boundary(edit.end)
        {
            return Err(InjectError::Inapplicable {
                edit_id: edit.edit_id,
                message: format!("span {}..{} is outside the source", edit.start, edit.end),
            });
        }
    }
    for pair in ordered.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(InjectError::Inapplicable {
                edit_id: pair[1].edit_id,
                message: format!("overlaps edit {}", pair[0].edit_id),
            });
        }
    }

    let mut text = source.to_string();
    for edit in ordered.iter().rev() {
        text.replace_range(edit.start..edit.end, &edit.replacement);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_in_reverse_order() {
        let source = "import os\nx = f(a)\n";
        let edits = vec![
            TextEdit::insert(0, 9, "\nimport json", 0),
            TextEdit::insert(2, 17, ", b=1", 2),
            TextEdit::insert(1, 9, "\n\nsetup()", 1),
        ];
        let text = apply_edits(source, &edits).unwrap();
        assert_eq!(text, "import os\nimport json\n\nsetup()\nx = f(a, b=1)\n");
    }

    #[test]
    fn test_replacement() {
        let source = "f(cb=handlers)";
        let edits = vec![TextEdit::replace(0, 5, 13, "[*handlers, h]")];
        assert_eq!(apply_edits(source, &edits).unwrap(), "f(cb=[*handlers, h])");
    }

    #[test]
    fn test_overlap_rejected() {
        let source = "abcdef";
        let edits = vec![TextEdit::replace(0, 1, 4, "x"), TextEdit::replace(1, 3, 5, "y")];
        let err = apply_edits(source, &edits).unwrap_err();
        assert!(matches!(err, InjectError::Inapplicable { edit_id: 1, .. }));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = apply_edits("abc", &[TextEdit::insert(7, 10, "x", 0)]).unwrap_err();
        assert!(matches!(err, InjectError::Inapplicable { edit_id: 7, .. }));

        let err = apply_edits("é", &[TextEdit::insert(3, 1, "x", 0)]).unwrap_err();
        assert!(matches!(err, InjectError::Inapplicable { edit_id: 3, .. }));
    }

    #[test]
    fn test_no_edits_is_identity() {
        assert_eq!(apply_edits("x = 1\n", &[]).unwrap(), "x = 1\n");
    }
}
