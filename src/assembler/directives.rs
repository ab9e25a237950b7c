// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Layout and definition directives: origin control, padding, symbol
//! binding, enum regions, file inclusion and user errors.

use std::path::Path;

use crate::core::error::AsmError;
use crate::core::symbol_table::{LabelKind, LabelValue};
use crate::core::text_utils::{get_filename, Cursor};

use super::eval::Prec;
use super::Assembler;

impl Assembler {
    /// ORG: the first one pins the PC, later ones pad forward to the new
    /// address.
    pub(crate) fn dir_org(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        if self.pc < 0 {
            self.dir_base(s)
        } else {
            self.dir_pad(s)
        }
    }

    /// BASE: move the logical PC without touching the output position.
    pub(crate) fn dir_base(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let val = self.eval(s, Prec::WholeExp)?;
        if self.dependant || val < 0 {
            return Err(AsmError::CantDetermineAddress);
        }
        self.pc = val;
        Ok(())
    }

    pub(crate) fn dir_pad(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        if self.pc < 0 {
            return Err(AsmError::UndefinedPC);
        }
        self.dependant = false;
        let target = self.eval(s, Prec::WholeExp)?;
        let count = if self.dependant { 0 } else { target - self.pc };
        self.filler(count, s)
    }

    pub(crate) fn dir_align(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        if self.pc < 0 {
            return Err(AsmError::UndefinedPC);
        }
        self.dependant = false;
        let unit = self.eval(s, Prec::WholeExp)?;
        let count = if self.dependant || unit <= 0 {
            0
        } else {
            match self.pc % unit {
                0 => 0,
                rem => unit - rem,
            }
        };
        self.filler(count, s)
    }

    pub(crate) fn dir_fillvalue(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let val = self.eval(s, Prec::WholeExp)?;
        if !self.dependant && !(0..=255).contains(&val) {
            return Err(AsmError::OutOfRange);
        }
        self.default_filler = (val & 0xff) as u8;
        Ok(())
    }

    /// `=`: bind a re-assignable VALUE to the pending label.
    pub(crate) fn dir_equal(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let Some(id) = self.label_here else {
            return Err(AsmError::NeedName);
        };
        self.dependant = false;
        let val = self.eval(s, Prec::WholeExp)?;
        let known = !self.dependant;
        let label = self.symbols.get_mut(id);
        label.kind = LabelKind::Value;
        label.value = LabelValue::Num(val);
        label.known = known;
        Ok(())
    }

    /// EQU: capture the rest of the line as substitution text. The text is
    /// captured on first sight and never changes on later passes.
    pub(crate) fn dir_equ(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let Some(id) = self.label_here else {
            return Err(AsmError::NeedName);
        };
        s.eat_ws();
        let text = s.rest().trim_end().to_string();
        s.consume_all();

        let label = self.symbols.get_mut(id);
        match label.kind {
            LabelKind::Label => {
                label.kind = LabelKind::Equate;
                label.value = LabelValue::Equate(text);
                label.known = true;
            }
            LabelKind::Equate => {}
            _ => return Err(AsmError::LabelAlreadyDefined),
        }
        Ok(())
    }

    /// ENUM: park the PC at a counter value and suppress output until ENDE.
    pub(crate) fn dir_enum(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let val = self.eval(s, Prec::WholeExp)?;
        self.enum_saved_pc = Some(self.pc);
        self.pc = if self.dependant { 0 } else { val };
        self.out.set_suppressed(true);
        Ok(())
    }

    pub(crate) fn dir_ende(&mut self) -> Result<(), AsmError> {
        match self.enum_saved_pc.take() {
            Some(saved) => {
                self.pc = saved;
                self.out.set_suppressed(false);
                Ok(())
            }
            None => Err(AsmError::ExtraEndE),
        }
    }

    pub(crate) fn dir_include(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let name = get_filename(s);
        self.process_file(Path::new(&name))
    }

    pub(crate) fn dir_error(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        s.eat_ws();
        let mut message = s.rest().trim_end().to_string();
        s.consume_all();
        for quote in ['"', '\''] {
            if message.len() >= 2 && message.starts_with(quote) && message.ends_with(quote) {
                message = message[1..message.len() - 1].to_string();
                break;
            }
        }
        Err(AsmError::Custom(message))
    }
}
