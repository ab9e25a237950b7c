// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line preprocessor: equate (textual macro) expansion.
//!
//! Walks one source line character by character, copying numeric literals
//! and quoted strings verbatim and substituting identifiers that name an
//! EQUATE already defined in the current pass. Returns the trailing comment,
//! if any, so the caller can hand it to the listing writer.

use crate::core::error::AsmError;
use crate::core::symbol_table::{LabelKind, SymbolTable};
use crate::core::text_utils::{is_ident_char, is_ident_start};

/// Expand `src` into `dst`. `scope` and `pass` drive the symbol lookup.
pub fn expand_line(
    symbols: &mut SymbolTable,
    scope: u32,
    pass: u32,
    src: &str,
    dst: &mut String,
) -> Result<Option<String>, AsmError> {
    let bytes = src.as_bytes();
    let mut i = 0;
    let mut skip_def = false;

    while i < bytes.len() {
        let c = bytes[i];

        if c == b'$' || c.is_ascii_digit() {
            // Numeric literal: copy the hex-capable tail verbatim so digits
            // never get mistaken for identifiers.
            dst.push(c as char);
            i += 1;
            while i < bytes.len() && matches!(bytes[i], b'0'..=b'9' | b'A'..=b'H' | b'a'..=b'h') {
                dst.push(bytes[i] as char);
                i += 1;
            }
        } else if c == b'"' || c == b'\'' {
            dst.push(c as char);
            i += 1;
            while i < bytes.len() {
                let c2 = bytes[i];
                dst.push(c2 as char);
                i += 1;
                if c2 == b'\\' {
                    if i < bytes.len() {
                        dst.push(bytes[i] as char);
                        i += 1;
                    }
                } else if c2 == c {
                    break;
                }
            }
        } else if is_ident_start(c) {
            // A leading dot is dropped: .ORG and ORG are the same word.
            let start = if c == b'.' { i + 1 } else { i };
            i += 1;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            let word = &src[start..i];

            let mut equate = None;
            if !skip_def {
                if word.eq_ignore_ascii_case("IFDEF") || word.eq_ignore_ascii_case("IFNDEF") {
                    // The identifier that follows is the name under test,
                    // not a value to expand.
                    skip_def = true;
                } else if let Some(id) = symbols.find(word, scope, pass) {
                    let label = symbols.get(id);
                    if label.kind == LabelKind::Equate && label.pass == pass {
                        if label.expanding {
                            return Err(AsmError::RecursiveEquate);
                        }
                        equate = Some(id);
                    }
                }
            }

            match equate {
                Some(id) => {
                    let text = match &symbols.get(id).value {
                        crate::core::symbol_table::LabelValue::Equate(text) => text.clone(),
                        _ => String::new(),
                    };
                    symbols.get_mut(id).expanding = true;
                    let result = expand_line(symbols, scope, pass, &text, dst);
                    symbols.get_mut(id).expanding = false;
                    result?;
                }
                None => dst.push_str(word),
            }
        } else if c == b';' {
            return Ok(Some(src[i..].to_string()));
        } else {
            dst.push(c as char);
            i += 1;
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::{Label, LabelValue, SymbolTable};

    fn equate(name: &str, text: &str, pass: u32) -> Label {
        Label {
            name: name.to_string(),
            kind: LabelKind::Equate,
            value: LabelValue::Equate(text.to_string()),
            pass,
            scope: 0,
            known: true,
            expanding: false,
        }
    }

    fn expand(symbols: &mut SymbolTable, src: &str) -> Result<(String, Option<String>), AsmError> {
        let mut dst = String::new();
        let comment = expand_line(symbols, 1, 1, src, &mut dst)?;
        Ok((dst, comment))
    }

    #[test]
    fn substitutes_current_pass_equates() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("count", "5", 1));
        let (dst, _) = expand(&mut symbols, " DB count").unwrap();
        assert_eq!(dst, " DB 5");
    }

    #[test]
    fn stale_equates_are_left_alone() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("count", "5", 0));
        let (dst, _) = expand(&mut symbols, " DB count").unwrap();
        assert_eq!(dst, " DB count");
    }

    #[test]
    fn expansion_recurses_through_equates() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("a", "b+1", 1));
        symbols.define(equate("b", "2", 1));
        let (dst, _) = expand(&mut symbols, " DB a").unwrap();
        assert_eq!(dst, " DB 2+1");
    }

    #[test]
    fn cyclic_equates_fail() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("a", "b", 1));
        symbols.define(equate("b", "a", 1));
        assert_eq!(
            expand(&mut symbols, " DB a").unwrap_err(),
            AsmError::RecursiveEquate
        );
        // The guard must be restored so a later line can try again.
        let err = expand(&mut symbols, " DB b").unwrap_err();
        assert_eq!(err, AsmError::RecursiveEquate);
    }

    #[test]
    fn comment_is_split_off() {
        let mut symbols = SymbolTable::new();
        let (dst, comment) = expand(&mut symbols, " RTS ; done").unwrap();
        assert_eq!(dst, " RTS ");
        assert_eq!(comment.as_deref(), Some("; done"));
    }

    #[test]
    fn strings_and_numbers_are_verbatim() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("abc", "1", 1));
        let (dst, _) = expand(&mut symbols, " DB \"abc\", 'a', $abc, 10").unwrap();
        assert_eq!(dst, " DB \"abc\", 'a', $abc, 10");
    }

    #[test]
    fn name_after_ifdef_is_not_expanded() {
        let mut symbols = SymbolTable::new();
        symbols.define(equate("flag", "1", 1));
        let (dst, _) = expand(&mut symbols, " IFDEF flag").unwrap();
        assert_eq!(dst, " IFDEF flag");
    }

    #[test]
    fn leading_dot_is_stripped() {
        let mut symbols = SymbolTable::new();
        let (dst, _) = expand(&mut symbols, " .ORG $8000").unwrap();
        assert_eq!(dst, " ORG $8000");
    }
}
