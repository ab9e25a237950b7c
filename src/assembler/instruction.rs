// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Addressing-mode selection and instruction encoding.
//!
//! Candidates are tried in table order; the first variant whose syntax
//! matches and whose operand fits wins. Tables list zero-page forms before
//! absolute ones, so a resolvable small operand takes the short encoding
//! while an unresolved forward reference defers to the wide form and lets
//! the next pass shrink it.

use crate::core::error::AsmError;
use crate::core::text_utils::Cursor;
use crate::mos6502::table::OpcodeEntry;
use crate::mos6502::AddrMode;

use super::eval::Prec;
use super::Assembler;

impl Assembler {
    pub(crate) fn encode_instruction(
        &mut self,
        table: &'static [OpcodeEntry],
        s: &mut Cursor,
    ) -> Result<(), AsmError> {
        let entry_nap = self.need_another_pass;
        let mut deferred: Option<AsmError> = None;
        let mut size_mismatch = false;

        for (index, entry) in table.iter().enumerate() {
            self.need_another_pass = entry_nap;
            self.dependant = false;
            let mut t = *s;
            let mode = entry.mode;

            if let Some(head) = mode.head() {
                if !t.eat_char(head) {
                    continue;
                }
            }

            let mut val = 0i32;
            if mode.size() > 0 {
                val = match self.eval(&mut t, Prec::WholeExp) {
                    Ok(v) => v,
                    Err(err) => {
                        // Another variant may still match syntactically;
                        // keep the failure in case none does.
                        deferred.get_or_insert(err);
                        continue;
                    }
                };
            }

            let mut tail_ok = true;
            for &c in mode.tail() {
                if !t.eat_char_ci(c) {
                    tail_ok = false;
                    break;
                }
            }
            if !tail_ok {
                continue;
            }
            t.eat_ws();
            if !t.at_end() {
                continue;
            }

            match mode.size() {
                0 => {}
                1 if mode == AddrMode::Rel => {
                    if self.dependant {
                        val = 0;
                    } else {
                        val -= self.pc + 2;
                        if !(-128..=127).contains(&val) {
                            // Give labels a pass to sort themselves out.
                            self.need_another_pass = true;
                            if self.last_chance {
                                return Err(AsmError::OutOfRange);
                            }
                        }
                    }
                }
                1 => {
                    if !self.dependant {
                        if !(-128..=255).contains(&val) {
                            size_mismatch = true;
                            continue;
                        }
                    } else if mode != AddrMode::Imm && wider_variant_follows(table, index, mode) {
                        // Unresolved: assume the wide form until the value
                        // proves it fits zero page.
                        continue;
                    }
                }
                _ => {
                    if !self.dependant && !(-32768..=65535).contains(&val) {
                        return Err(AsmError::OutOfRange);
                    }
                }
            }

            *s = t;
            let bytes = [
                entry.opcode,
                (val & 0xff) as u8,
                ((val >> 8) & 0xff) as u8,
            ];
            return self.output(&bytes[..1 + mode.size()]);
        }

        if let Some(err) = deferred {
            return Err(err);
        }
        if size_mismatch {
            return Err(AsmError::OutOfRange);
        }
        Err(AsmError::IllegalInstruction)
    }
}

/// Whether a two-byte variant with the same operand syntax appears later in
/// the table (ZP→ABS, ZP,X→ABS,X, ZP,Y→ABS,Y).
fn wider_variant_follows(table: &[OpcodeEntry], index: usize, mode: AddrMode) -> bool {
    table[index + 1..].iter().any(|entry| {
        entry.mode.size() == 2
            && entry.mode.head() == mode.head()
            && entry.mode.tail() == mode.tail()
    })
}
