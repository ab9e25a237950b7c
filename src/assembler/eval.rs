// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Recursive-descent expression evaluation with precedence climbing.
//!
//! The evaluator works on a scratch copy of the caller's cursor and commits
//! consumed text back before reading each operator, so an operator that does
//! not bind at the current precedence is left for the enclosing level.
//! Unresolved symbols set the assembler's dependant flag instead of failing
//! until the last-chance pass.

use crate::core::error::AsmError;
use crate::core::symbol_table::LabelKind;
use crate::core::text_utils::{get_word, Cursor};

use super::Assembler;

/// Binding strengths, weakest first. `WholeExp` accepts any operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Prec {
    WholeExp,
    OrOr,
    AndAnd,
    Or,
    Xor,
    And,
    EqCompare,
    Compare,
    Shift,
    PlusMinus,
    MulDiv,
    Unary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Noop,
    Equal,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    And,
    Xor,
    Or,
    AndAnd,
    OrOr,
    LeftShift,
    RightShift,
}

impl Operator {
    fn prec(self) -> Prec {
        match self {
            Operator::Noop => Prec::WholeExp,
            Operator::Equal | Operator::NotEqual => Prec::EqCompare,
            Operator::Greater | Operator::GreaterEq | Operator::Less | Operator::LessEq => {
                Prec::Compare
            }
            Operator::Plus | Operator::Minus => Prec::PlusMinus,
            Operator::Mul | Operator::Div | Operator::Mod => Prec::MulDiv,
            Operator::And => Prec::And,
            Operator::Xor => Prec::Xor,
            Operator::Or => Prec::Or,
            Operator::AndAnd => Prec::AndAnd,
            Operator::OrOr => Prec::OrOr,
            Operator::LeftShift | Operator::RightShift => Prec::Shift,
        }
    }
}

fn apply_binary(op: Operator, l: i32, r: i32) -> Result<i32, AsmError> {
    Ok(match op {
        Operator::Noop => l,
        Operator::Plus => l.wrapping_add(r),
        Operator::Minus => l.wrapping_sub(r),
        Operator::Mul => l.wrapping_mul(r),
        Operator::Div => {
            if r == 0 {
                return Err(AsmError::DivideByZero);
            }
            l.wrapping_div(r)
        }
        Operator::Mod => {
            if r == 0 {
                return Err(AsmError::DivideByZero);
            }
            l.wrapping_rem(r)
        }
        Operator::And => l & r,
        Operator::Xor => l ^ r,
        Operator::Or => l | r,
        Operator::AndAnd => ((l != 0) && (r != 0)) as i32,
        Operator::OrOr => ((l != 0) || (r != 0)) as i32,
        Operator::Equal => (l == r) as i32,
        Operator::NotEqual => (l != r) as i32,
        Operator::Greater => (l > r) as i32,
        Operator::GreaterEq => (l >= r) as i32,
        Operator::Less => (l < r) as i32,
        Operator::LessEq => (l <= r) as i32,
        Operator::LeftShift => l.wrapping_shl(r as u32),
        Operator::RightShift => l.wrapping_shr(r as u32),
    })
}

fn parse_radix(text: &str, radix: u32) -> Result<i32, AsmError> {
    if text.is_empty() {
        return Err(AsmError::NotANumber);
    }
    let mut acc: i64 = 0;
    for c in text.chars() {
        let digit = c.to_digit(radix).ok_or(AsmError::NotANumber)?;
        acc = acc.wrapping_mul(radix as i64).wrapping_add(digit as i64);
    }
    Ok(acc as i32)
}

/// Digit-leading literal: decimal, or binary/hex with a trailing b/h marker.
fn parse_number(word: &str) -> Result<i32, AsmError> {
    if word.bytes().all(|c| c.is_ascii_digit()) {
        return parse_radix(word, 10);
    }
    let (body, suffix) = word.split_at(word.len() - 1);
    match suffix.bytes().next() {
        Some(b'b') | Some(b'B') => parse_radix(body, 2),
        Some(b'h') | Some(b'H') => parse_radix(body, 16),
        _ => Err(AsmError::NotANumber),
    }
}

/// Char literal `'c'` or `"c"` with a `\`-escape of the quoted character.
fn parse_char_literal(bytes: &[u8]) -> Result<i32, AsmError> {
    let quote = bytes[0];
    let mut i = 1;
    if bytes.get(i) == Some(&b'\\') {
        i += 1;
    }
    let Some(&value) = bytes.get(i) else {
        return Err(AsmError::NotANumber);
    };
    if bytes.get(i + 1) != Some(&quote) || bytes.len() != i + 2 {
        return Err(AsmError::NotANumber);
    }
    Ok(value as i32)
}

impl Assembler {
    /// Evaluate an expression at the given minimum precedence, leaving the
    /// cursor at the first unconsumed character.
    pub(crate) fn eval(&mut self, cur: &mut Cursor, prec: Prec) -> Result<i32, AsmError> {
        let mut s = *cur;
        s.eat_ws();
        let unary = s.peek().unwrap_or(0);

        let mut ret = match unary {
            b'(' => {
                s.advance();
                let val = self.eval(&mut s, Prec::WholeExp)?;
                s.eat_ws();
                if s.peek() != Some(b')') {
                    return Err(AsmError::IncompleteExpression);
                }
                s.advance();
                val
            }
            b'#' => {
                // Immediate marker, meaningless to the math itself.
                s.advance();
                self.eval(&mut s, Prec::WholeExp)?
            }
            b'~' => {
                s.advance();
                !self.eval(&mut s, Prec::Unary)?
            }
            b'!' => {
                s.advance();
                (self.eval(&mut s, Prec::Unary)? == 0) as i32
            }
            b'<' => {
                s.advance();
                let outer = self.dependant;
                self.dependant = false;
                let val = self.eval(&mut s, Prec::Unary)?;
                // The low byte resolves on its own; don't let it widen the
                // addressing mode.
                self.dependant = outer;
                val & 0xff
            }
            b'>' => {
                s.advance();
                let outer = self.dependant;
                self.dependant = false;
                let val = self.eval(&mut s, Prec::Unary)?;
                self.dependant = outer;
                (val >> 8) & 0xff
            }
            b'+' | b'-' => {
                // Might be a sign, might be an anonymous label reference.
                // Try the whole word as a value first; fall back to unary
                // with the saved flags when that left a dependency behind.
                let mut with_sign = s;
                s.advance();
                let saved_dependant = self.dependant;
                let saved_nap = self.need_another_pass;
                self.dependant = false;
                let mut val = match self.get_value(&mut with_sign) {
                    Ok(v) => v,
                    Err(AsmError::UnknownLabel) => 0,
                    Err(err) => return Err(err),
                };
                if !self.dependant || with_sign.pos() == s.pos() {
                    s = with_sign;
                    self.dependant |= saved_dependant;
                } else {
                    self.dependant = saved_dependant;
                    self.need_another_pass = saved_nap;
                    val = self.eval(&mut s, Prec::Unary)?;
                    if unary == b'-' {
                        val = val.wrapping_neg();
                    }
                }
                val
            }
            _ => self.get_value(&mut s)?,
        };

        loop {
            *cur = s;
            let op = self.get_operator(&mut s);
            if op == Operator::Noop || prec >= op.prec() {
                break;
            }
            let rhs = self.eval(&mut s, op.prec())?;
            if self.dependant {
                // Result is garbage this pass anyway; keep it inert so
                // division by an unresolved zero can't fire.
                ret = 0;
            } else {
                ret = apply_binary(op, ret, rhs)?;
            }
        }
        Ok(ret)
    }

    /// Parse one atom: a literal, the PC, or a symbol reference.
    pub(crate) fn get_value(&mut self, s: &mut Cursor) -> Result<i32, AsmError> {
        let word = get_word(s, true);
        if word.is_empty() {
            return Err(AsmError::MissingOperand);
        }
        let bytes = word.as_bytes();
        match bytes[0] {
            b'$' => {
                if word.len() == 1 {
                    Ok(self.pc)
                } else {
                    parse_radix(&word[1..], 16)
                }
            }
            b'%' => parse_radix(&word[1..], 2),
            b'\'' | b'"' => parse_char_literal(bytes),
            b'0'..=b'9' => parse_number(&word),
            _ => self.symbol_value(&word),
        }
    }

    fn symbol_value(&mut self, name: &str) -> Result<i32, AsmError> {
        let Some(id) = self.symbols.find(name, self.scope, self.pass) else {
            self.dependant = true;
            self.need_another_pass = true;
            if self.last_chance {
                return Err(AsmError::UnknownLabel);
            }
            return Ok(0);
        };

        let (kind, known, value) = {
            let label = self.symbols.get(id);
            (label.kind, label.known, label.num())
        };
        match kind {
            LabelKind::Label | LabelKind::Value => {
                if !known {
                    self.dependant = true;
                    self.need_another_pass = true;
                    if self.last_chance {
                        return Err(AsmError::CantDetermineAddress);
                    }
                }
                Ok(value)
            }
            _ => Err(AsmError::UnknownLabel),
        }
    }

    fn get_operator(&mut self, s: &mut Cursor) -> Operator {
        s.eat_ws();
        let Some(c) = s.peek() else {
            return Operator::Noop;
        };
        match c {
            b'&' => {
                s.advance();
                if s.peek() == Some(b'&') {
                    s.advance();
                    Operator::AndAnd
                } else {
                    Operator::And
                }
            }
            b'|' => {
                s.advance();
                if s.peek() == Some(b'|') {
                    s.advance();
                    Operator::OrOr
                } else {
                    Operator::Or
                }
            }
            b'^' => {
                s.advance();
                Operator::Xor
            }
            b'+' => {
                s.advance();
                Operator::Plus
            }
            b'-' => {
                s.advance();
                Operator::Minus
            }
            b'*' => {
                s.advance();
                Operator::Mul
            }
            b'/' => {
                s.advance();
                Operator::Div
            }
            b'%' => {
                s.advance();
                Operator::Mod
            }
            b'=' => {
                s.advance();
                if s.peek() == Some(b'=') {
                    s.advance();
                }
                Operator::Equal
            }
            b'!' => {
                let mut ahead = *s;
                ahead.advance();
                if ahead.peek() == Some(b'=') {
                    ahead.advance();
                    *s = ahead;
                    Operator::NotEqual
                } else {
                    Operator::Noop
                }
            }
            b'<' => {
                s.advance();
                match s.peek() {
                    Some(b'=') => {
                        s.advance();
                        Operator::LessEq
                    }
                    Some(b'<') => {
                        s.advance();
                        Operator::LeftShift
                    }
                    Some(b'>') => {
                        s.advance();
                        Operator::NotEqual
                    }
                    _ => Operator::Less,
                }
            }
            b'>' => {
                s.advance();
                match s.peek() {
                    Some(b'=') => {
                        s.advance();
                        Operator::GreaterEq
                    }
                    Some(b'>') => {
                        s.advance();
                        Operator::RightShift
                    }
                    _ => Operator::Greater,
                }
            }
            _ => Operator::Noop,
        }
    }
}
