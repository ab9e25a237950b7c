// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol table: labels, values, equates, macros and reserved words.
//!
//! Labels sharing a name form an ordered stack, newest first. Lookup prefers
//! the innermost local entry for the current scope and falls back to the
//! oldest surviving global, which is what makes forward anonymous labels
//! (`+`, `++`, ...) resolve to their next occurrence in source order.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::mos6502::table::OpcodeEntry;

pub type LabelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Label,
    Value,
    Equate,
    Macro,
    Reserved,
}

/// Handler tag for reserved directive words. Dispatch is a match on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Nothing,
    If,
    ElseIf,
    Else,
    EndIf,
    IfDef,
    IfNDef,
    Equal,
    Equ,
    Org,
    Base,
    Pad,
    Include,
    IncBin,
    Hex,
    Dw,
    Db,
    Dsw,
    Dsb,
    Align,
    Macro,
    Rept,
    EndM,
    EndR,
    Enum,
    EndE,
    FillValue,
    Dl,
    Dh,
    Error,
}

/// Captured MACRO body. Parameter names have already been rewritten to
/// positional `\N` markers, so only the lines survive.
#[derive(Debug, Clone, Default)]
pub struct MacroBody {
    pub lines: Vec<String>,
}

/// Payload of a label, one case per kind of reserved or user entry.
#[derive(Debug, Clone)]
pub enum LabelValue {
    Num(i32),
    Equate(String),
    Macro(MacroBody),
    Opcode(&'static [OpcodeEntry]),
    Directive(Directive),
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub kind: LabelKind,
    pub value: LabelValue,
    /// Last pass in which this label received a definition.
    pub pass: u32,
    /// 0 for global; the owning scope id for local labels.
    pub scope: u32,
    /// Whether the numeric value is pinned this pass. Labels defined before
    /// ORG, or values computed from unresolved expressions, are not.
    pub known: bool,
    /// Guard flipped around equate expansion to detect cycles.
    pub expanding: bool,
}

impl Label {
    pub fn num(&self) -> i32 {
        match &self.value {
            LabelValue::Num(v) => *v,
            _ => 0,
        }
    }
}

#[derive(Default)]
pub struct SymbolTable {
    labels: Vec<Label>,
    index: HashMap<String, Vec<LabelId>>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new label, shadowing older entries of the same name.
    pub fn define(&mut self, label: Label) -> LabelId {
        let id = self.labels.len();
        let name = label.name.clone();
        self.labels.push(label);
        self.index.entry(name).or_default().insert(0, id);
        id
    }

    /// Scope- and pass-aware lookup. Names beginning with `+` are forward
    /// references: entries already defined in `pass` are invisible so the
    /// next occurrence (the oldest surviving entry) is found instead.
    #[must_use]
    pub fn find(&self, name: &str, scope: u32, pass: u32) -> Option<LabelId> {
        let ids = self.index.get(name)?;
        let forward = name.starts_with('+');
        let visible = |id: &&LabelId| !forward || self.labels[**id].pass != pass;

        if let Some(&id) = ids
            .iter()
            .filter(visible)
            .find(|&&id| self.labels[id].scope == scope)
        {
            return Some(id);
        }
        ids.iter()
            .filter(visible)
            .filter(|&&id| self.labels[id].scope == 0)
            .last()
            .copied()
    }

    #[must_use]
    pub fn get(&self, id: LabelId) -> &Label {
        &self.labels[id]
    }

    pub fn get_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id]
    }

    /// Total number of labels ever created. The pass driver compares this
    /// across passes to detect that the defined-label frontier has settled.
    #[must_use]
    pub fn created(&self) -> usize {
        self.labels.len()
    }

    /// Dump user-visible symbols (LABEL and VALUE kinds) for the listing
    /// footer.
    pub fn dump<W: Write>(&self, mut out: W) -> io::Result<()> {
        for label in &self.labels {
            if matches!(label.kind, LabelKind::Label | LabelKind::Value) {
                writeln!(
                    out,
                    "{:<16}: {:04X} ({})",
                    label.name,
                    label.num() & 0xffff,
                    label.num()
                )?;
            }
        }
        Ok(())
    }
}
