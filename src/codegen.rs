//! Formatting-preserving code generation.
//!
//! Passes never print an AST. They record byte-span edits against the source
//! they parsed and `emit` splices those edits in, so untouched code keeps its
//! exact formatting and comments.

use serde::{Deserialize, Serialize};

use crate::error::GenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub start: u32,
    pub end: u32,
    pub replacement: String,
}

impl TextEdit {
    pub fn insert(at: u32, text: impl Into<String>) -> Self {
        TextEdit {
            start: at,
            end: at,
            replacement: text.into(),
        }
    }

    pub fn replace(start: u32, end: u32, text: impl Into<String>) -> Self {
        TextEdit {
            start,
            end,
            replacement: text.into(),
        }
    }

    pub fn remove(start: u32, end: u32) -> Self {
        TextEdit {
            start,
            end,
            replacement: String::new(),
        }
    }

    /// Removes `start..end`, widening to the whole line when nothing else
    /// but whitespace shares it.
    pub fn remove_line_aware(source: &str, start: u32, end: u32) -> Self {
        let (s, e) = (start as usize, end as usize);
        let line_start = source[..s].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[e..].find('\n').map_or(source.len(), |i| e + i);
        let before = &source[line_start..s];
        let after = &source[e..line_end];

        if before.trim().is_empty() && after.trim().is_empty() {
            let through = if line_end < source.len() {
                line_end + 1
            } else {
                line_end
            };
            return TextEdit::remove(line_start as u32, through as u32);
        }
        TextEdit::remove(start, end)
    }

    fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

/// One original range and where it ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedSpan {
    pub original_start: u32,
    pub original_end: u32,
    pub generated_start: u32,
    pub generated_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emitted {
    pub code: String,
    pub source_map: Vec<MappedSpan>,
}

/// Applies `edits` to `source`.
///
/// Edits are ordered by position; insertions at the same offset keep the
/// order they were recorded in. Any overlap, out-of-range span or span that
/// splits a UTF-8 sequence rejects the whole set.
pub fn emit(source: &str, mut edits: Vec<TextEdit>) -> Result<Emitted, GenError> {
    for edit in &edits {
        if edit.start > edit.end || edit.end as usize > source.len() {
            return Err(GenError::OutOfBounds {
                start: edit.start,
                end: edit.end,
                len: source.len(),
            });
        }
        for offset in [edit.start, edit.end] {
            if !source.is_char_boundary(offset as usize) {
                return Err(GenError::NotCharBoundary { offset });
            }
        }
    }

    // Stable: equal keys keep recording order.
    edits.sort_by_key(|e| (e.start, !e.is_insertion(), e.end));

    let mut code = String::with_capacity(source.len() + 64);
    let mut source_map = Vec::new();
    let mut cursor: u32 = 0;

    for edit in &edits {
        if edit.start < cursor {
            return Err(GenError::Overlap {
                start: edit.start,
                end: edit.end,
                previous_end: cursor,
            });
        }

        if edit.start > cursor {
            let generated_start = code.len() as u32;
            code.push_str(&source[cursor as usize..edit.start as usize]);
            source_map.push(MappedSpan {
                original_start: cursor,
                original_end: edit.start,
                generated_start,
                generated_end: code.len() as u32,
            });
        }

        let generated_start = code.len() as u32;
        code.push_str(&edit.replacement);
        source_map.push(MappedSpan {
            original_start: edit.start,
            original_end: edit.end,
            generated_start,
            generated_end: code.len() as u32,
        });
        cursor = edit.end;
    }

    if (cursor as usize) < source.len() {
        let generated_start = code.len() as u32;
        code.push_str(&source[cursor as usize..]);
        source_map.push(MappedSpan {
            original_start: cursor,
            original_end: source.len() as u32,
            generated_start,
            generated_end: code.len() as u32,
        });
    }

    Ok(Emitted { code, source_map })
}

/// 1-based line of a byte offset.
pub fn line_of(source: &str, offset: u32) -> u32 {
    let end = (offset as usize).min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u32 + 1
}
