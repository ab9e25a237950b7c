// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembly engine and entry point.
//!
//! The [`Assembler`] owns all process-wide state: the symbol table, the
//! output sink, the program counter, the conditional stack and the
//! macro/repeat capture machinery. The pass driver walks the root source
//! file repeatedly until the symbol table reaches a fixpoint; the final
//! pass runs with `last_chance` set, turning unresolved references into
//! hard errors so assembly always terminates.

pub mod cli;
mod conditionals;
mod directives;
mod directives_data;
mod eval;
mod instruction;
mod macros;
#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use clap::Parser;

use crate::core::conditional::ConditionalStack;
use crate::core::error::AsmError;
use crate::core::listing::ListingWriter;
use crate::core::output::OutputSink;
use crate::core::preprocess;
use crate::core::symbol_table::{
    Directive, Label, LabelId, LabelKind, LabelValue, SymbolTable,
};
use crate::core::text_utils::{get_word, Cursor};
use crate::mos6502::table::MNEMONICS;

use self::eval::Prec;
use self::macros::Capture;

pub use self::cli::VERSION;

/// Program counter value meaning "no ORG seen yet". A nice even number so
/// aligning works before the origin is defined.
pub const NOORIGIN: i32 = -0x4000_0000;

/// Number of tries before giving up on convergence.
const MAXPASSES: u32 = 7;

/// Reserved directive words. Dispatch tags live in the symbol table next to
/// the opcode tables, so one lookup classifies any statement word.
const DIRECTIVES: &[(&str, Directive)] = &[
    ("", Directive::Nothing),
    ("IF", Directive::If),
    ("ELSEIF", Directive::ElseIf),
    ("ELSE", Directive::Else),
    ("ENDIF", Directive::EndIf),
    ("IFDEF", Directive::IfDef),
    ("IFNDEF", Directive::IfNDef),
    ("=", Directive::Equal),
    ("EQU", Directive::Equ),
    ("ORG", Directive::Org),
    ("BASE", Directive::Base),
    ("PAD", Directive::Pad),
    ("INCLUDE", Directive::Include),
    ("INCSRC", Directive::Include),
    ("INCBIN", Directive::IncBin),
    ("BIN", Directive::IncBin),
    ("HEX", Directive::Hex),
    ("WORD", Directive::Dw),
    ("DW", Directive::Dw),
    ("DCW", Directive::Dw),
    ("DC.W", Directive::Dw),
    ("BYTE", Directive::Db),
    ("DB", Directive::Db),
    ("DCB", Directive::Db),
    ("DC.B", Directive::Db),
    ("DSW", Directive::Dsw),
    ("DS.W", Directive::Dsw),
    ("DSB", Directive::Dsb),
    ("DS.B", Directive::Dsb),
    ("ALIGN", Directive::Align),
    ("MACRO", Directive::Macro),
    ("REPT", Directive::Rept),
    ("ENDM", Directive::EndM),
    ("ENDR", Directive::EndR),
    ("ENUM", Directive::Enum),
    ("ENDE", Directive::EndE),
    ("FILLVALUE", Directive::FillValue),
    ("DL", Directive::Dl),
    ("DH", Directive::Dh),
    ("ERROR", Directive::Error),
];

/// Run the assembler with command-line arguments.
pub fn run() -> Result<(), AsmError> {
    let cli = cli::Cli::parse();
    let config = cli::validate_cli(&cli)?;

    let mut asm = Assembler::new();
    asm.verbose = !cli.quiet;
    asm.verbose_listing = cli.verbose_listing;
    asm.listing_enabled = config.list.is_some();
    for (name, value) in &config.defines {
        asm.predefine(name, *value);
    }

    asm.compile(&config.source)?;

    asm.out.write_to_file(&config.output).map_err(|err| {
        AsmError::Custom(format!(
            "Can't write {}: {err}",
            config.output.display()
        ))
    })?;
    if let Some(list_path) = &config.list {
        fs::write(list_path, asm.listing_text()).map_err(|err| {
            AsmError::Custom(format!("Can't write {}: {err}", list_path.display()))
        })?;
    }
    Ok(())
}

/// Process-wide assembler state, threaded through every operation.
pub struct Assembler {
    symbols: SymbolTable,
    out: OutputSink,
    listing: ListingWriter,
    cond: ConditionalStack,

    pass: u32,
    pc: i32,
    scope: u32,
    next_scope: u32,
    last_chance: bool,
    need_another_pass: bool,
    /// Set when the current expression referenced a symbol that is not
    /// resolved this pass.
    dependant: bool,
    default_filler: u8,

    nested_includes: u32,
    inside_macro: u32,
    capture: Option<Capture>,
    enum_saved_pc: Option<i32>,
    label_here: Option<LabelId>,

    verbose: bool,
    listing_enabled: bool,
    verbose_listing: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        let mut asm = Self {
            symbols: SymbolTable::new(),
            out: OutputSink::new(),
            listing: ListingWriter::new(),
            cond: ConditionalStack::new(),
            pass: 0,
            pc: NOORIGIN,
            scope: 1,
            next_scope: 2,
            last_chance: false,
            need_another_pass: false,
            dependant: false,
            default_filler: 0,
            nested_includes: 0,
            inside_macro: 0,
            capture: None,
            enum_saved_pc: None,
            label_here: None,
            verbose: false,
            listing_enabled: false,
            verbose_listing: false,
        };
        asm.init_reserved();
        asm
    }

    fn init_reserved(&mut self) {
        for mnemonic in MNEMONICS {
            self.reserve(mnemonic.name, LabelValue::Opcode(mnemonic.ops));
        }
        for (name, directive) in DIRECTIVES {
            self.reserve(name, LabelValue::Directive(*directive));
        }
    }

    fn reserve(&mut self, name: &str, value: LabelValue) {
        self.symbols.define(Label {
            name: name.to_string(),
            kind: LabelKind::Reserved,
            value,
            pass: 0,
            scope: 0,
            known: true,
            expanding: false,
        });
    }

    /// Pre-register a VALUE symbol (the `-d` option).
    pub fn predefine(&mut self, name: &str, value: i32) {
        self.symbols.define(Label {
            name: name.to_string(),
            kind: LabelKind::Value,
            value: LabelValue::Num(value),
            pass: 0,
            scope: 0,
            known: true,
            expanding: false,
        });
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.verbose = !quiet;
    }

    pub fn enable_listing(&mut self, verbose: bool) {
        self.listing_enabled = true;
        self.verbose_listing = verbose;
    }

    #[must_use]
    pub fn output_bytes(&self) -> &[u8] {
        self.out.bytes()
    }

    pub fn listing_text(&mut self) -> String {
        self.listing.text().to_string()
    }

    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Run passes over the root source file until the symbol table stops
    /// changing, or fail.
    pub fn compile(&mut self, path: &Path) -> Result<(), AsmError> {
        let mut prev_created: Option<usize> = None;

        loop {
            self.pass += 1;
            if self.pass == MAXPASSES || prev_created == Some(self.symbols.created()) {
                self.last_chance = true;
                if self.verbose {
                    println!("last try..");
                }
            } else if self.verbose {
                println!("pass {}..", self.pass);
            }

            self.need_another_pass = false;
            self.dependant = false;
            self.cond.clear();
            self.scope = 1;
            self.next_scope = 2;
            self.default_filler = 0;
            self.pc = NOORIGIN;
            self.nested_includes = 0;
            self.inside_macro = 0;
            self.capture = None;
            self.enum_saved_pc = None;
            self.label_here = None;
            self.out.reset();
            self.listing.reset();
            if self.listing_enabled {
                self.listing
                    .header(&format!("asm65 6502 Assembler v{VERSION}"));
            }
            prev_created = Some(self.symbols.created());

            self.process_file(path)?;

            if self.last_chance || !self.need_another_pass {
                break;
            }
        }

        if self.listing_enabled {
            let total = self.out.len();
            self.listing.footer(&self.symbols, total);
        }
        Ok(())
    }

    /// Walk one source file line by line. INCLUDE reenters here; the depth
    /// counter tells us when the outermost file ends so unclosed blocks can
    /// be reported.
    pub(crate) fn process_file(&mut self, path: &Path) -> Result<(), AsmError> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let text = fs::read_to_string(path)
            .map_err(|err| AsmError::CantOpenFile(err.to_string()).at(&name, 0))?;

        self.nested_includes += 1;
        let mut nline = 0u32;
        let mut result = Ok(());
        for line in text.lines() {
            nline += 1;
            if let Err(err) = self.process_line(line, &name, nline) {
                result = Err(err.at(&name, nline));
                break;
            }
        }
        self.nested_includes -= 1;
        result?;

        if self.nested_includes == 0 {
            if !self.cond.is_empty() {
                return Err(AsmError::MissingEndIf.at(&name, nline));
            }
            match &self.capture {
                Some(Capture::Macro { .. }) => {
                    return Err(AsmError::MissingEndM.at(&name, nline))
                }
                Some(Capture::Rept { .. }) => {
                    return Err(AsmError::MissingEndR.at(&name, nline))
                }
                None => {}
            }
            if self.out.is_suppressed() {
                return Err(AsmError::MissingEndE.at(&name, nline));
            }
        }
        Ok(())
    }

    /// One line through the pipeline: equate expansion, capture, optional
    /// label binding, then directive/opcode/macro dispatch.
    pub(crate) fn process_line(
        &mut self,
        src: &str,
        filename: &str,
        line_no: u32,
    ) -> Result<(), AsmError> {
        let mut expanded = String::new();
        let comment =
            preprocess::expand_line(&mut self.symbols, self.scope, self.pass, src, &mut expanded)?;

        if self.listing_enabled && (self.inside_macro == 0 || self.verbose_listing) {
            self.listing
                .list_line(self.pc, &expanded, comment.as_deref());
        }

        if self.capture.is_some() {
            return self.capture_line(src, &expanded, filename, line_no);
        }

        self.label_here = None;
        let mut s = Cursor::new(&expanded);
        let pristine = s;
        let mut reserved = self.get_reserved(&mut s).ok();

        if self.cond.skipping() {
            let id = match reserved {
                Some(id) => id,
                None => match self.get_reserved(&mut s) {
                    Ok(id) => id,
                    Err(_) => return Ok(()),
                },
            };
            if !self.is_if_family(id) {
                return Ok(());
            }
            reserved = Some(id);
        }

        let id = match reserved {
            Some(id) => id,
            None => {
                let mut label_cursor = pristine;
                let word = self.get_label(&mut label_cursor)?;
                self.add_label(&word, self.inside_macro > 0)?;
                self.get_reserved(&mut s)?
            }
        };

        let label = self.symbols.get(id);
        match (label.kind, label.value.clone()) {
            (LabelKind::Macro, LabelValue::Macro(body)) => {
                self.expand_macro(id, body, &mut s, filename, line_no)?;
            }
            (_, LabelValue::Opcode(table)) => self.encode_instruction(table, &mut s)?,
            (_, LabelValue::Directive(directive)) => self.dispatch_directive(directive, &mut s)?,
            _ => return Err(AsmError::IllegalInstruction),
        }

        s.eat_ws();
        if !s.at_end() {
            return Err(AsmError::ExtraCharsOnLine);
        }
        Ok(())
    }

    fn dispatch_directive(&mut self, directive: Directive, s: &mut Cursor) -> Result<(), AsmError> {
        match directive {
            Directive::Nothing => Ok(()),
            Directive::If => self.dir_if(s),
            Directive::ElseIf => self.dir_elseif(s),
            Directive::Else => self.cond.else_branch(),
            Directive::EndIf => self.cond.pop(),
            Directive::IfDef => self.dir_ifdef(s, false),
            Directive::IfNDef => self.dir_ifdef(s, true),
            Directive::Equal => self.dir_equal(s),
            Directive::Equ => self.dir_equ(s),
            Directive::Org => self.dir_org(s),
            Directive::Base => self.dir_base(s),
            Directive::Pad => self.dir_pad(s),
            Directive::Include => self.dir_include(s),
            Directive::IncBin => self.dir_incbin(s),
            Directive::Hex => self.dir_hex(s),
            Directive::Dw => self.dir_dw(s),
            Directive::Db => self.dir_db(s),
            Directive::Dsw => self.dir_dsw(s),
            Directive::Dsb => self.dir_dsb(s),
            Directive::Align => self.dir_align(s),
            Directive::Macro => self.dir_macro(s),
            Directive::Rept => self.dir_rept(s),
            Directive::EndM => Err(AsmError::ExtraEndM),
            Directive::EndR => Err(AsmError::ExtraEndR),
            Directive::Enum => self.dir_enum(s),
            Directive::EndE => self.dir_ende(),
            Directive::FillValue => self.dir_fillvalue(s),
            Directive::Dl => self.dir_dl(s),
            Directive::Dh => self.dir_dh(s),
            Directive::Error => self.dir_error(s),
        }
    }

    /// Read the statement word and classify it. A leading `.` is stripped,
    /// a bare `=` is the assignment directive, lookup is tried uppercased
    /// first then verbatim. Macros count only once defined this pass.
    pub(crate) fn get_reserved(&mut self, s: &mut Cursor) -> Result<LabelId, AsmError> {
        s.eat_ws();
        let word = if s.peek() == Some(b'=') {
            s.advance();
            "=".to_string()
        } else {
            if s.peek() == Some(b'.') {
                s.advance();
            }
            get_word(s, true)
        };

        let upper = word.to_ascii_uppercase();
        let mut id = self
            .symbols
            .find(&upper, self.scope, self.pass)
            .or_else(|| self.symbols.find(&word, self.scope, self.pass));

        if let Some(found) = id {
            let label = self.symbols.get(found);
            match label.kind {
                LabelKind::Macro => {
                    if label.pass != self.pass {
                        id = None;
                    }
                }
                LabelKind::Reserved => {}
                _ => id = None,
            }
        }
        id.ok_or(AsmError::IllegalInstruction)
    }

    pub(crate) fn as_directive(&self, id: LabelId) -> Option<Directive> {
        match self.symbols.get(id).value {
            LabelValue::Directive(directive) => Some(directive),
            _ => None,
        }
    }

    /// Validate a word in label position. Anonymous labels are runs of `+`
    /// or `-`, optionally prefixing a normal name.
    fn get_label(&mut self, s: &mut Cursor) -> Result<String, AsmError> {
        let word = get_word(s, true);
        if word.is_empty() {
            return Err(AsmError::IllegalInstruction);
        }
        if word == "$" {
            return Ok(word);
        }

        let bytes = word.as_bytes();
        let first = bytes[0];
        let mut rest = bytes;
        if first == b'+' || first == b'-' {
            while !rest.is_empty() && rest[0] == first {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return Ok(word);
            }
        }
        let c = rest[0];
        if c == b'@' || c == b'_' || c.is_ascii_alphabetic() {
            Ok(word)
        } else {
            Err(AsmError::IllegalInstruction)
        }
    }

    /// Bind a label at the current PC. New globals open a fresh scope;
    /// `@`-names and labels born inside macro expansions attach to the
    /// current one. Address changes between passes request another pass,
    /// except for `-` names which are redefined freely.
    fn add_label(&mut self, word: &str, local: bool) -> Result<(), AsmError> {
        let mut found = self.symbols.find(word, self.scope, self.pass);
        if let Some(id) = found {
            let label = self.symbols.get(id);
            if local && label.scope == 0 && label.kind != LabelKind::Value {
                found = None;
            }
        }

        let first = word.as_bytes()[0];
        if first != b'@' && !local {
            self.scope = self.next_scope;
            self.next_scope += 1;
        }

        match found {
            None => {
                let scope = if first == b'@' || local { self.scope } else { 0 };
                let id = self.symbols.define(Label {
                    name: word.to_string(),
                    kind: LabelKind::Label,
                    value: LabelValue::Num(self.pc),
                    pass: self.pass,
                    scope,
                    known: self.pc >= 0,
                    expanding: false,
                });
                self.label_here = Some(id);
            }
            Some(id) => {
                self.label_here = Some(id);
                let (old_pass, kind, old_value) = {
                    let label = self.symbols.get(id);
                    (label.pass, label.kind, label.num())
                };

                if old_pass == self.pass && first != b'-' {
                    if kind != LabelKind::Value {
                        return Err(AsmError::LabelAlreadyDefined);
                    }
                } else {
                    if kind == LabelKind::Label {
                        if old_value != self.pc && first != b'-' {
                            self.need_another_pass = true;
                            if self.last_chance {
                                return Err(AsmError::CantDetermineAddress);
                            }
                        }
                        if self.last_chance && self.pc < 0 {
                            return Err(AsmError::CantDetermineAddress);
                        }
                    }
                    let pass = self.pass;
                    let pc = self.pc;
                    let label = self.symbols.get_mut(id);
                    label.pass = pass;
                    if label.kind == LabelKind::Label {
                        label.value = LabelValue::Num(pc);
                        label.known = pc >= 0;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit bytes at the current PC. The PC always advances; the bytes only
    /// reach the buffer outside ENUM regions.
    pub(crate) fn output(&mut self, bytes: &[u8]) -> Result<(), AsmError> {
        if self.pc < 0 {
            return Err(AsmError::UndefinedPC);
        }
        self.pc = self.pc.wrapping_add(bytes.len() as i32);
        self.out.push_slice(bytes);
        if self.listing_enabled && !self.out.is_suppressed() {
            self.listing.emit_bytes(bytes);
        }
        Ok(())
    }

    /// Emit `count` fill bytes, reading an optional `,value` override.
    pub(crate) fn filler(&mut self, count: i32, s: &mut Cursor) -> Result<(), AsmError> {
        let mut fill = self.default_filler as i32;
        if s.eat_char(b',') {
            self.dependant = false;
            fill = self.eval(s, Prec::WholeExp)?;
            if !self.dependant && !(0..=255).contains(&fill) {
                return Err(AsmError::OutOfRange);
            }
        }
        if !(0..=0x100000).contains(&count) {
            return Err(AsmError::OutOfRange);
        }
        if count > 0 {
            let block = vec![(fill & 0xff) as u8; count as usize];
            self.output(&block)?;
        }
        Ok(())
    }
}
