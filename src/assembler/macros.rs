// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! MACRO and REPT: capture a body of raw source lines, then replay it with
//! positional substitution (macros) or a plain repeat count (REPT).
//!
//! Parameter names are rewritten to `\N` markers when the body is captured,
//! so invocation is a single textual substitution pass. Each macro
//! expansion runs in a fresh scope, restored afterwards, which keeps
//! `@`-locals inside the body from colliding across invocations.

use crate::core::error::AsmError;
use crate::core::symbol_table::{Directive, Label, LabelId, LabelKind, LabelValue, MacroBody};
use crate::core::text_utils::{get_word, is_ident_char, is_ident_start, Cursor};

use super::eval::Prec;
use super::Assembler;

/// Active capture state between MACRO/ENDM or REPT/ENDR.
pub(crate) enum Capture {
    Macro {
        id: LabelId,
        params: Vec<String>,
        lines: Vec<String>,
        /// False when the macro was already captured in an earlier pass;
        /// the body lines are still swallowed but not stored again.
        store: bool,
    },
    Rept {
        count: i32,
        nest: u32,
        lines: Vec<String>,
    },
}

impl Assembler {
    pub(crate) fn dir_macro(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.label_here = None;
        let name = get_word(s, true);
        if name.is_empty() {
            return Err(AsmError::NeedName);
        }

        let mut params = Vec::new();
        loop {
            s.eat_char(b',');
            let param = get_word(s, true);
            if param.is_empty() {
                break;
            }
            params.push(param);
        }

        let (id, store) = match self.symbols.find(&name, self.scope, self.pass) {
            Some(id) => {
                let label = self.symbols.get(id);
                if label.kind == LabelKind::Macro && label.pass != self.pass {
                    let pass = self.pass;
                    self.symbols.get_mut(id).pass = pass;
                    (id, false)
                } else {
                    return Err(AsmError::LabelAlreadyDefined);
                }
            }
            None => {
                let id = self.symbols.define(Label {
                    name,
                    kind: LabelKind::Macro,
                    value: LabelValue::Macro(MacroBody::default()),
                    pass: self.pass,
                    scope: 0,
                    known: true,
                    expanding: false,
                });
                (id, true)
            }
        };

        self.capture = Some(Capture::Macro {
            id,
            params,
            lines: Vec::new(),
            store,
        });
        Ok(())
    }

    pub(crate) fn dir_rept(&mut self, s: &mut Cursor) -> Result<(), AsmError> {
        self.dependant = false;
        let count = self.eval(s, Prec::WholeExp)?;
        let count = if self.dependant || count < 0 { 0 } else { count };
        self.capture = Some(Capture::Rept {
            count,
            nest: 0,
            lines: Vec::new(),
        });
        Ok(())
    }

    /// Called for every line while a capture is open. Raw source is stored
    /// so equates expand at replay time, not capture time; the expanded
    /// form is only inspected to find the closing directive (a leading
    /// label before ENDM/ENDR is allowed).
    pub(crate) fn capture_line(
        &mut self,
        raw: &str,
        expanded: &str,
        filename: &str,
        line_no: u32,
    ) -> Result<(), AsmError> {
        let mut s = Cursor::new(expanded);
        let directive = match self.get_reserved(&mut s) {
            Ok(id) => self.as_directive(id),
            Err(_) => match self.get_reserved(&mut s) {
                Ok(id) => self.as_directive(id),
                Err(_) => None,
            },
        };

        if matches!(self.capture, Some(Capture::Macro { .. })) {
            if directive == Some(Directive::EndM) {
                let Some(Capture::Macro {
                    id,
                    params,
                    lines,
                    store,
                }) = self.capture.take()
                else {
                    unreachable!();
                };
                if store {
                    let body = MacroBody {
                        lines: lines
                            .iter()
                            .map(|line| rewrite_params(line, &params))
                            .collect(),
                    };
                    self.symbols.get_mut(id).value = LabelValue::Macro(body);
                }
                return Ok(());
            }
            if let Some(Capture::Macro { lines, .. }) = self.capture.as_mut() {
                lines.push(raw.to_string());
            }
            return Ok(());
        }

        match directive {
            Some(Directive::Rept) => {
                if let Some(Capture::Rept { nest, lines, .. }) = self.capture.as_mut() {
                    *nest += 1;
                    lines.push(raw.to_string());
                }
                Ok(())
            }
            Some(Directive::EndR) => {
                let nested = matches!(self.capture, Some(Capture::Rept { nest, .. }) if nest > 0);
                if nested {
                    if let Some(Capture::Rept { nest, lines, .. }) = self.capture.as_mut() {
                        *nest -= 1;
                        lines.push(raw.to_string());
                    }
                    return Ok(());
                }
                let Some(Capture::Rept { count, lines, .. }) = self.capture.take() else {
                    unreachable!();
                };
                self.replay_rept(&lines, count, filename, line_no)
            }
            _ => {
                if let Some(Capture::Rept { lines, .. }) = self.capture.as_mut() {
                    lines.push(raw.to_string());
                }
                Ok(())
            }
        }
    }

    /// Invoke a captured macro: split the arguments, substitute the `\N`
    /// sites and feed the body back through the line pipeline in a fresh
    /// scope.
    pub(crate) fn expand_macro(
        &mut self,
        id: LabelId,
        body: MacroBody,
        s: &mut Cursor,
        filename: &str,
        line_no: u32,
    ) -> Result<(), AsmError> {
        if self.symbols.get(id).expanding {
            return Err(AsmError::RecursiveMacro);
        }
        let args = split_args(s.rest());
        s.consume_all();

        let old_scope = self.scope;
        self.scope = self.next_scope;
        self.next_scope += 1;
        self.inside_macro += 1;
        self.symbols.get_mut(id).expanding = true;

        let mut result = Ok(());
        for line in &body.lines {
            let line = substitute_args(line, &args);
            if let Err(err) = self.process_line(&line, filename, line_no) {
                result = Err(err);
                break;
            }
        }

        self.symbols.get_mut(id).expanding = false;
        self.inside_macro -= 1;
        self.scope = old_scope;
        result
    }

    fn replay_rept(
        &mut self,
        lines: &[String],
        count: i32,
        filename: &str,
        line_no: u32,
    ) -> Result<(), AsmError> {
        self.inside_macro += 1;
        let mut result = Ok(());
        'replay: for _ in 0..count {
            for line in lines {
                if let Err(err) = self.process_line(line, filename, line_no) {
                    result = Err(err);
                    break 'replay;
                }
            }
        }
        self.inside_macro -= 1;
        result
    }
}

/// Split a macro argument list at top-level commas, respecting quotes.
fn split_args(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                current.push(c as char);
                if c == b'\\' && i + 1 < bytes.len() {
                    i += 1;
                    current.push(bytes[i] as char);
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => {
                    quote = Some(c);
                    current.push(c as char);
                }
                b',' => {
                    args.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c as char),
            },
        }
        i += 1;
    }
    args.push(current.trim().to_string());
    args
}

/// Replace `\N` sites with the matching argument (empty when absent).
fn substitute_args(line: &str, args: &[String]) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            out.push(c as char);
            if c == b'\\' && i + 1 < bytes.len() {
                i += 1;
                out.push(bytes[i] as char);
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                quote = Some(c);
                out.push(c as char);
                i += 1;
            }
            b';' => {
                out.push_str(&line[i..]);
                break;
            }
            b'\\' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() => {
                let mut j = i + 1;
                let mut index = 0usize;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    index = index * 10 + usize::from(bytes[j] - b'0');
                    j += 1;
                }
                if index >= 1 && index <= args.len() {
                    out.push_str(&args[index - 1]);
                }
                i = j;
            }
            _ => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    out
}

/// Turn declared parameter names into positional `\N` markers so the body
/// becomes a plain template.
fn rewrite_params(line: &str, params: &[String]) -> String {
    if params.is_empty() {
        return line.to_string();
    }
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            out.push(c as char);
            if c == b'\\' && i + 1 < bytes.len() {
                i += 1;
                out.push(bytes[i] as char);
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                quote = Some(c);
                out.push(c as char);
                i += 1;
            }
            b';' => {
                out.push_str(&line[i..]);
                break;
            }
            _ if is_ident_start(c) => {
                let start = i;
                i += 1;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let word = &line[start..i];
                match params.iter().position(|p| p == word) {
                    Some(pos) => out.push_str(&format!("\\{}", pos + 1)),
                    None => out.push_str(word),
                }
            }
            _ => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    out
}
