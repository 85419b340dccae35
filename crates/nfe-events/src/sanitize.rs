//! # Text Sanitation
//!
//! Free-text fields (justifications, correction text) pass through two
//! steps before they are measured:
//!
//! 1. [`sanitize_text`] strips characters XML cannot carry and control
//!    characters, collapses whitespace runs into one space, trims, and caps
//!    the length.
//! 2. [`validated_text`] enforces the length bounds and the authority's
//!    content pattern: every character in the printable Latin-1 range
//!    `U+0020..=U+00FF`, outside the C1 control block.
//!
//! Lengths are counted in characters, not bytes.

use crate::error::EventError;

/// Strip illegal characters, collapse whitespace, trim, and cap at
/// `max_chars` characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 2));
    let mut pending_space = false;
    let mut count = 0usize;

    for c in input.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !is_xml_content_char(c) || c.is_control() {
            continue;
        }
        if pending_space {
            if count + 1 >= max_chars {
                break;
            }
            out.push(' ');
            count += 1;
            pending_space = false;
        }
        if count >= max_chars {
            break;
        }
        out.push(c);
        count += 1;
    }

    out
}

/// Sanitize `input` and check it against `[min, max]` and the content
/// pattern.
///
/// # Errors
///
/// - [`EventError::JustificationTooShort`] / [`EventError::JustificationTooLong`]
///   on length.
/// - [`EventError::InvalidText`] when a character is outside the printable
///   range.
pub fn validated_text(
    field: &'static str,
    input: &str,
    min: usize,
    max: usize,
) -> Result<String, EventError> {
    // One character of headroom so an over-long input is reported, not cut.
    let text = sanitize_text(input, max + 1);
    let len = text.chars().count();
    if len < min {
        return Err(EventError::JustificationTooShort {
            field,
            min,
            actual: len,
        });
    }
    if len > max {
        return Err(EventError::JustificationTooLong { field, max });
    }
    if let Some(bad) = text.chars().find(|c| !is_printable(*c)) {
        return Err(EventError::InvalidText {
            field,
            reason: format!("character {bad:?} (U+{:04X}) outside the printable range", bad as u32),
        });
    }
    Ok(text)
}

/// XML 1.0 `Char` production, minus the whitespace controls that
/// [`sanitize_text`] handles separately.
fn is_xml_content_char(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

fn is_printable(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{7E}' | '\u{A0}'..='\u{FF}')
}
