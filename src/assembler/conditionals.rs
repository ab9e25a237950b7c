// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! IF-family directive handlers.
//!
//! These run even while a region is being skipped, so the nesting stays
//! balanced. A condition whose branch is dead either way is still parsed
//! (stray text gets diagnosed identically) but the dependency flags are
//! restored afterwards: an undefined symbol inside a skipped branch must
//! not force extra passes.

use crate::core::error::AsmError;
use crate::core::symbol_table::{Directive, LabelId, LabelValue};
use crate::core::text_utils::{get_word, Cursor};

use super::eval::Prec;
use super::Assembler;

impl Assembler {
    pub(crate) fn is_if_family(&self, id: LabelId) -> bool {
        matches!(
            self.symbols.get(id).value,
            LabelValue::Directive(
                Directive::If
                    | Directive::IfDef
                    | Directive::IfNDef
                    | Directive::ElseIf
                    | Directive::Else
                    | Directive::EndIf
            )
        )
    }

    pub(crate) fn dir_if(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let live = !self.cond.skipping();
        let cond = self.parse_condition(s, live)?;
        self.cond.push(cond)
    }

    pub(crate) fn dir_elseif(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        let live = self.cond.elseif_live();
        let cond = self.parse_condition(s, live)?;
        self.cond.else_if(cond)
    }

    pub(crate) fn dir_ifdef(&mut self, s: &mut Cursor, negate: bool) -> Result<(), AsmError> {
        let word = get_word(s, true);
        let defined = self.symbols.find(&word, self.scope, self.pass).is_some();
        self.cond.push(defined != negate)
    }

    fn parse_condition(&mut self, s: &mut Cursor, live: bool) -> Result<bool, AsmError> {
        if live {
            self.dependant = false;
            let val = self.eval(s, Prec::WholeExp)?;
            Ok(val != 0)
        } else {
            let dependant = self.dependant;
            let nap = self.need_another_pass;
            if self.eval(s, Prec::WholeExp).is_err() {
                s.consume_all();
            }
            self.dependant = dependant;
            self.need_another_pass = nap;
            Ok(false)
        }
    }
}
