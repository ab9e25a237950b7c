// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types and source-location reporting for the assembler.
//!
//! Every failure carries one of the canonical messages below. Fatal errors
//! are wrapped with the file name and line number where they surfaced; a
//! failing nested include produces a chain of such wrappers.

use thiserror::Error;

/// Assembler failure with its canonical message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("Value out of range.")]
    OutOfRange,
    #[error("Not a number.")]
    NotANumber,
    #[error("Unknown label.")]
    UnknownLabel,
    #[error("Illegal instruction.")]
    IllegalInstruction,
    #[error("Incomplete expression.")]
    IncompleteExpression,
    #[error("Label already defined.")]
    LabelAlreadyDefined,
    #[error("Missing operand.")]
    MissingOperand,
    #[error("Divide by zero.")]
    DivideByZero,
    #[error("Can't determine address.")]
    CantDetermineAddress,
    #[error("Need a name.")]
    NeedName,
    #[error("Can't open or read file - {0}")]
    CantOpenFile(String),
    #[error("ENDM without MACRO.")]
    ExtraEndM,
    #[error("ENDR without REPT.")]
    ExtraEndR,
    #[error("ENDE without ENUM.")]
    ExtraEndE,
    #[error("ELSEIF without IF.")]
    ExtraElseIf,
    #[error("ELSE without IF.")]
    ExtraElse,
    #[error("ENDIF without IF.")]
    ExtraEndIf,
    #[error("Recursive MACRO not allowed.")]
    RecursiveMacro,
    #[error("Recursive EQU not allowed.")]
    RecursiveEquate,
    #[error("Missing ENDIF.")]
    MissingEndIf,
    #[error("Missing ENDM.")]
    MissingEndM,
    #[error("Missing ENDR.")]
    MissingEndR,
    #[error("Missing ENDE.")]
    MissingEndE,
    #[error("Too many nested IFs.")]
    IfNestLimit,
    #[error("PC is undefined (use ORG first)")]
    UndefinedPC,
    #[error("INCBIN size is out of range.")]
    BadIncbinSize,
    #[error("Seek position out of range.")]
    SeekOutOfRange,
    #[error("Extra characters on line.")]
    ExtraCharsOnLine,
    /// Message from the ERROR directive or an I/O failure outside the
    /// line pipeline.
    #[error("{0}")]
    Custom(String),
    /// An inner error already annotated with a source location.
    #[error("{0}")]
    Context(Box<SourceContext>),
}

/// A failure pinned to a file and line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}({line}): {inner}")]
pub struct SourceContext {
    pub file: String,
    pub line: u32,
    pub inner: AsmError,
}

impl AsmError {
    /// Wrap this error with a source location. Applied once per include
    /// level, so errors escaping a nested include accumulate a chain of
    /// locations, innermost last.
    pub fn at(self, file: &str, line: u32) -> AsmError {
        AsmError::Context(Box::new(SourceContext {
            file: file.to_string(),
            line,
            inner: self,
        }))
    }

    /// The innermost error, stripped of location wrappers.
    pub fn root(&self) -> &AsmError {
        match self {
            AsmError::Context(ctx) => ctx.inner.root(),
            other => other,
        }
    }
}
