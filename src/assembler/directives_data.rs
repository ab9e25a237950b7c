// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Data-emission directives: DB/DW families, fills, raw hex and binary
//! includes.

use std::fs;

use crate::core::error::AsmError;
use crate::core::text_utils::{get_filename, get_word, Cursor};

use super::eval::Prec;
use super::Assembler;

impl Assembler {
    /// DB and friends: one byte per expression. A quoted string emits each
    /// character; an expression trailing the closing quote is added to
    /// every character, so `DB "ABC"+1` shifts the whole string.
    pub(crate) fn dir_db(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        loop {
            s.eat_ws();
            if matches!(s.peek(), Some(b'"') | Some(b'\'')) {
                let chars = read_string(s)?;
                let offset = self.eval_string_offset(s)?;
                for c in &chars {
                    let val = (*c as i32).wrapping_add(offset);
                    if !self.dependant && !(-128..=255).contains(&val) {
                        return Err(AsmError::OutOfRange);
                    }
                    self.output(&[(val & 0xff) as u8])?;
                }
            } else {
                self.dependant = false;
                let val = self.eval(s, Prec::WholeExp)?;
                if !self.dependant && !(-128..=255).contains(&val) {
                    return Err(AsmError::OutOfRange);
                }
                self.output(&[(val & 0xff) as u8])?;
            }
            if !s.eat_char(b',') {
                return Ok(());
            }
        }
    }

    /// DW and friends: one little-endian word per expression.
    pub(crate) fn dir_dw(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        loop {
            self.dependant = false;
            let val = self.eval(s, Prec::WholeExp)?;
            if !self.dependant && !(-32768..=65535).contains(&val) {
                return Err(AsmError::OutOfRange);
            }
            self.output(&[(val & 0xff) as u8, ((val >> 8) & 0xff) as u8])?;
            if !s.eat_char(b',') {
                return Ok(());
            }
        }
    }

    /// DL/DH: low or high byte of each expression.
    pub(crate) fn dir_dl(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.emit_halves(s, 0)
    }

    pub(crate) fn dir_dh(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.emit_halves(s, 8)
    }

    fn emit_halves(&mut self, s: &mut Cursor, shift: u32) -> Result<(), AsmError> {
        loop {
            self.dependant = false;
            let val = self.eval(s, Prec::WholeExp)?;
            self.output(&[((val >> shift) & 0xff) as u8])?;
            if !s.eat_char(b',') {
                return Ok(());
            }
        }
    }

    /// DSB: reserve `n` fill bytes.
    pub(crate) fn dir_dsb(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let count = self.eval(s, Prec::WholeExp)?;
        if !self.dependant && count < 0 {
            return Err(AsmError::OutOfRange);
        }
        let count = if self.dependant { 0 } else { count };
        self.filler(count, s)
    }

    /// DSW: reserve `n` fill words.
    pub(crate) fn dir_dsw(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let count = self.eval(s, Prec::WholeExp)?;
        if !self.dependant && count < 0 {
            return Err(AsmError::OutOfRange);
        }
        let count = if self.dependant { 0 } else { count };

        let mut fill = self.default_filler as i32;
        if s.eat_char(b',') {
            self.dependant = false;
            fill = self.eval(s, Prec::WholeExp)?;
            if !self.dependant && !(-32768..=65535).contains(&fill) {
                return Err(AsmError::OutOfRange);
            }
        }
        let word = [(fill & 0xff) as u8, ((fill >> 8) & 0xff) as u8];
        for _ in 0..count {
            self.output(&word)?;
        }
        Ok(())
    }

    /// HEX: raw bytes from hex digit pairs; an odd trailing digit in a word
    /// becomes its own byte.
    pub(crate) fn dir_hex(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let mut word = get_word(s, false);
        if word.is_empty() {
            return Err(AsmError::MissingOperand);
        }
        while !word.is_empty() {
            let digits = word
                .chars()
                .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(AsmError::NotANumber))
                .collect::<Result<Vec<_>, _>>()?;
            let mut i = 0;
            while i < digits.len() {
                let byte = if i + 1 < digits.len() {
                    (digits[i] << 4) | digits[i + 1]
                } else {
                    digits[i]
                };
                self.output(&[byte])?;
                i += 2;
            }
            word = get_word(s, false);
        }
        Ok(())
    }

    /// INCBIN: copy a slice of an external binary into the output.
    pub(crate) fn dir_incbin(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let name = get_filename(s);
        let data = fs::read(&name).map_err(|err| AsmError::CantOpenFile(err.to_string()))?;
        let filesize = data.len() as i32;

        let mut seek = 0i32;
        if s.eat_char(b',') {
            self.dependant = false;
            seek = self.eval(s, Prec::WholeExp)?;
            if self.dependant {
                seek = 0;
            } else if !(0..=filesize).contains(&seek) {
                return Err(AsmError::SeekOutOfRange);
            }
        }

        let mut size = filesize - seek;
        if s.eat_char(b',') {
            self.dependant = false;
            size = self.eval(s, Prec::WholeExp)?;
            if self.dependant {
                size = 0;
            } else if !(0..=filesize - seek).contains(&size) {
                return Err(AsmError::BadIncbinSize);
            }
        }

        self.output(&data[seek as usize..(seek + size) as usize])
    }

    /// Expression glued to a closing string quote: evaluated as if the
    /// quote were a zero, so a bare string contributes no offset.
    fn eval_string_offset(&mut self, s: &mut Cursor) -> Result<i32, AsmError> {
        let tail = format!("0{}", s.rest());
        let mut t = Cursor::new(&tail);
        self.dependant = false;
        let offset = self.eval(&mut t, Prec::WholeExp)?;
        let consumed = t.pos().saturating_sub(1);
        for _ in 0..consumed {
            s.advance();
        }
        Ok(offset)
    }
}

fn read_string(s: &mut Cursor) -> Result<Vec<u8>, AsmError> {
    let quote = s.peek().unwrap_or(b'"');
    s.advance();
    let mut chars = Vec::new();
    loop {
        let Some(c) = s.peek() else {
            return Err(AsmError::IncompleteExpression);
        };
        s.advance();
        if c == quote {
            return Ok(chars);
        }
        if c == b'\\' {
            let Some(escaped) = s.peek() else {
                return Err(AsmError::IncompleteExpression);
            };
            s.advance();
            chars.push(escaped);
        } else {
            chars.push(c);
        }
    }
}
