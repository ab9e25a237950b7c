// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Shared text utilities: character classes, a byte cursor over one source
//! line, and the word scanner used by the label/directive/value readers.

/// Whitespace as the line scanner sees it. `:` is a statement separator and
/// counts as whitespace everywhere except inside strings.
#[inline]
pub fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b':')
}

/// Characters that terminate a word when math cropping is requested.
#[inline]
pub fn is_math(c: u8) -> bool {
    matches!(
        c,
        b'!' | b'^'
            | b'&'
            | b'|'
            | b'+'
            | b'-'
            | b'*'
            | b'/'
            | b'%'
            | b'('
            | b')'
            | b'<'
            | b'>'
            | b'='
            | b','
    )
}

/// Identifier start character (letters, `_`, `.`, and the local prefix `@`).
#[inline]
pub fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'.' || c == b'@'
}

/// Identifier continuation character.
#[inline]
pub fn is_ident_char(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// A position cursor over one immutable source line. Parse helpers advance
/// the position; callers copy the cursor to try alternatives and commit by
/// assignment.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn advance(&mut self) {
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    /// Remaining text from the current position.
    pub fn rest(&self) -> &'a str {
        std::str::from_utf8(&self.bytes[self.pos..]).unwrap_or("")
    }

    pub fn consume_all(&mut self) {
        self.pos = self.bytes.len();
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn eat_ws(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.pos += 1;
        }
    }

    /// Skip whitespace and consume `c` if it is next.
    pub fn eat_char(&mut self, c: u8) -> bool {
        self.eat_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Case-insensitive variant of [`eat_char`](Self::eat_char).
    pub fn eat_char_ci(&mut self, c: u8) -> bool {
        self.eat_ws();
        match self.peek() {
            Some(next) if next.eq_ignore_ascii_case(&c) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }
}

/// Grab the next word. A word runs to the next whitespace; with `mcheck` it
/// is additionally cropped at the first math character that follows a
/// leading run of math characters (so `+5` and `--` survive intact while
/// `2+3` yields `2`). A trailing `:` after the word is swallowed.
pub fn get_word(cur: &mut Cursor<'_>, mcheck: bool) -> String {
    cur.eat_ws();
    let start = cur.pos();
    let mut scan = *cur;
    while scan.peek().is_some_and(|c| !is_space(c)) {
        scan.advance();
    }
    let mut word = &cur.rest().as_bytes()[..scan.pos() - start];

    if mcheck {
        let mut lead = 0;
        while lead < word.len() && is_math(word[lead]) {
            lead += 1;
        }
        let mut end = lead;
        while end < word.len() && !is_math(word[end]) {
            end += 1;
        }
        word = &word[..end];
    }

    let text = String::from_utf8_lossy(word).into_owned();
    for _ in 0..word.len() {
        cur.advance();
    }
    if cur.peek() == Some(b':') {
        cur.advance();
    }
    text
}

/// Read a file name: either quoted, or everything up to the next comma.
/// Paths may contain `:` and spaces, so the word scanner is bypassed.
pub fn get_filename(cur: &mut Cursor<'_>) -> String {
    cur.eat_ws();
    match cur.peek() {
        Some(quote @ (b'"' | b'\'')) => {
            cur.advance();
            let mut name = String::new();
            while let Some(c) = cur.peek() {
                cur.advance();
                if c == quote {
                    break;
                }
                name.push(c as char);
            }
            name
        }
        _ => {
            let mut name = String::new();
            while let Some(c) = cur.peek() {
                if c == b',' {
                    break;
                }
                name.push(c as char);
                cur.advance();
            }
            name.trim_end().to_string()
        }
    }
}
