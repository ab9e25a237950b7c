// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly tests: whole sources in, bytes out.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::error::AsmError;

use super::Assembler;

static TEST_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path(ext: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    let counter = TEST_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!("asm65-test-{pid}-{nanos}-{counter}.{ext}"));
    path
}

fn assemble_with(
    src: &str,
    setup: impl FnOnce(&mut Assembler),
) -> (Assembler, Result<(), AsmError>) {
    let path = temp_path("asm");
    fs::write(&path, src).expect("test source");
    let mut asm = Assembler::new();
    setup(&mut asm);
    let result = asm.compile(&path);
    let _ = fs::remove_file(&path);
    (asm, result)
}

fn assemble(src: &str) -> Result<Vec<u8>, AsmError> {
    let (asm, result) = assemble_with(src, |_| {});
    result.map(|()| asm.output_bytes().to_vec())
}

fn assemble_ok(src: &str) -> Vec<u8> {
    assemble(src).expect("assembly should succeed")
}

fn assemble_err(src: &str) -> AsmError {
    assemble(src).expect_err("assembly should fail").root().clone()
}

#[test]
fn immediate_and_implied() {
    assert_eq!(
        assemble_ok("ORG $8000\nLDA #$42\nRTS"),
        vec![0xa9, 0x42, 0x60]
    );
}

#[test]
fn zero_page_chosen_over_absolute() {
    assert_eq!(
        assemble_ok("ORG $0000\nfoo: LDA foo\nLDA $1234"),
        vec![0xa5, 0x00, 0xad, 0x34, 0x12]
    );
}

#[test]
fn branch_to_self() {
    assert_eq!(assemble_ok("ORG $8000\nstart: BNE start"), vec![0xd0, 0xfe]);
}

#[test]
fn if_else_endif() {
    assert_eq!(
        assemble_ok("ORG $8000\nIF 1\n DB $AA\nELSE\n DB $BB\nENDIF\n DB $CC"),
        vec![0xaa, 0xcc]
    );
}

#[test]
fn macro_with_positional_substitution() {
    assert_eq!(
        assemble_ok("ORG $0000\nMACRO two x\n DB \\1\n DB \\1\nENDM\n two $77"),
        vec![0x77, 0x77]
    );
}

#[test]
fn rept_replays_body() {
    assert_eq!(
        assemble_ok("ORG $1000\nREPT 3\n DB $90\nENDR"),
        vec![0x90, 0x90, 0x90]
    );
}

#[test]
fn assembly_is_deterministic() {
    let src = "ORG $8000\nloop: LDX #8\n DEX\n BNE loop\n JMP loop\n DB \"hi\",0";
    assert_eq!(assemble_ok(src), assemble_ok(src));
}

#[test]
fn forward_reference_takes_one_extra_pass() {
    let (asm, result) = assemble_with("ORG $0000\n JMP fwd\nfwd: RTS", |_| {});
    result.unwrap();
    assert_eq!(asm.output_bytes(), &[0x4c, 0x03, 0x00, 0x60]);
    assert_eq!(asm.pass, 2);
}

#[test]
fn forward_zero_page_reference_shrinks_and_converges() {
    assert_eq!(
        assemble_ok("ORG $0000\n LDA fwd\nfwd: RTS"),
        vec![0xa5, 0x02, 0x60]
    );
}

#[test]
fn forward_indexed_store_without_wide_form() {
    assert_eq!(
        assemble_ok("ORG $0000\n STY fwd,X\nfwd: RTS"),
        vec![0x94, 0x02, 0x60]
    );
}

#[test]
fn backward_anonymous_label() {
    assert_eq!(
        assemble_ok("ORG $8000\n- NOP\n BNE -"),
        vec![0xea, 0xd0, 0xfd]
    );
}

#[test]
fn forward_anonymous_label() {
    assert_eq!(
        assemble_ok("ORG $8000\n BNE +\n NOP\n+ RTS"),
        vec![0xd0, 0x01, 0xea, 0x60]
    );
}

#[test]
fn double_plus_skips_nearer_target() {
    assert_eq!(
        assemble_ok("ORG $8000\n BNE ++\n+ NOP\n++ RTS"),
        vec![0xd0, 0x01, 0xea, 0x60]
    );
}

#[test]
fn branch_reaches_forward_limit() {
    let bytes = assemble_ok("ORG $8000\n BNE fwd\n PAD $8081\nfwd: NOP");
    assert_eq!(&bytes[..2], &[0xd0, 0x7f]);
    assert_eq!(*bytes.last().unwrap(), 0xea);
}

#[test]
fn branch_past_forward_limit_fails() {
    assert_eq!(
        assemble_err("ORG $8000\n BNE fwd\n PAD $8082\nfwd: NOP"),
        AsmError::OutOfRange
    );
}

#[test]
fn branch_reaches_backward_limit() {
    let bytes = assemble_ok("ORG $8000\nback: PAD $8000+126\n BNE back");
    assert_eq!(&bytes[bytes.len() - 2..], &[0xd0, 0x80]);
}

#[test]
fn branch_past_backward_limit_fails() {
    assert_eq!(
        assemble_err("ORG $8000\nback: PAD $8000+127\n BNE back"),
        AsmError::OutOfRange
    );
}

#[test]
fn equates_substitute_text() {
    assert_eq!(
        assemble_ok("five EQU 5\nORG $0000\n DB five, five+1"),
        vec![0x05, 0x06]
    );
}

#[test]
fn recursive_equates_fail() {
    assert_eq!(
        assemble_err("a EQU b\nb EQU a\nORG $0000\n DB a"),
        AsmError::RecursiveEquate
    );
}

#[test]
fn value_labels_are_reassignable() {
    assert_eq!(assemble_ok("x = 1\nx = 2\nORG $0000\n DB x"), vec![0x02]);
}

#[test]
fn forward_value_resolves_next_pass() {
    assert_eq!(assemble_ok("ORG $0000\n DB val\nval = 5"), vec![0x05]);
}

#[test]
fn unknown_label_fails_on_last_chance() {
    assert_eq!(assemble_err("ORG $0000\n LDA missing"), AsmError::UnknownLabel);
}

#[test]
fn elseif_chain_takes_first_true_branch() {
    let src = "ORG $0000\nIF 0\n DB 1\nELSEIF 1\n DB 2\nELSEIF 1\n DB 3\nELSE\n DB 4\nENDIF";
    assert_eq!(assemble_ok(src), vec![0x02]);
}

#[test]
fn ifdef_with_predefined_symbol() {
    let src = "ORG $0000\nIFDEF flag\n DB 1\nELSE\n DB 2\nENDIF\nIFNDEF flag\n DB 3\nENDIF";
    assert_eq!(assemble_ok(src), vec![0x02, 0x03]);

    let (asm, result) = assemble_with(src, |asm| asm.predefine("flag", 1));
    result.unwrap();
    assert_eq!(asm.output_bytes(), &[0x01]);
}

#[test]
fn skipped_regions_do_not_define_labels() {
    let src = "ORG $0000\nIF 0\ndead: DB 1\nENDIF\ndead: DB 2";
    assert_eq!(assemble_ok(src), vec![0x02]);
}

#[test]
fn skipped_regions_tolerate_unknown_symbols() {
    let src = "ORG $0000\nIF 0\nIF whatever\n DB 1\nENDIF\n LDA nowhere\nENDIF\n DB 2";
    assert_eq!(assemble_ok(src), vec![0x02]);
}

#[test]
fn enum_defines_without_output() {
    let src = "ENUM $200\nfoo: DSB 2\nbar: DSB 1\nENDE\nORG $0000\n DW foo\n DW bar";
    assert_eq!(assemble_ok(src), vec![0x00, 0x02, 0x02, 0x02]);
}

#[test]
fn base_decouples_pc_from_output_position() {
    let src = "ORG $0000\n DB 1\nBASE $8000\nlbl: DB 2\n DW lbl";
    assert_eq!(assemble_ok(src), vec![0x01, 0x02, 0x00, 0x80]);
}

#[test]
fn second_org_pads_forward() {
    assert_eq!(
        assemble_ok("ORG $0000\n DB 1\nORG $0004\n DB 2"),
        vec![0x01, 0x00, 0x00, 0x00, 0x02]
    );
}

#[test]
fn org_backward_fails() {
    assert_eq!(
        assemble_err("ORG $0010\n DB 1\nORG $0000\n DB 2"),
        AsmError::OutOfRange
    );
}

#[test]
fn pad_uses_fill_byte() {
    assert_eq!(
        assemble_ok("ORG $0000\nFILLVALUE $EE\n DB 1\nPAD $3\n DB 2"),
        vec![0x01, 0xee, 0xee, 0x02]
    );
}

#[test]
fn align_pads_to_boundary() {
    assert_eq!(
        assemble_ok("ORG $0000\n DB 1\nALIGN 4,$FF\n DB 2"),
        vec![0x01, 0xff, 0xff, 0xff, 0x02]
    );
}

#[test]
fn dsb_and_dsw_reserve_fills() {
    assert_eq!(assemble_ok("ORG $0000\n DSB 3,$AA"), vec![0xaa, 0xaa, 0xaa]);
    assert_eq!(
        assemble_ok("ORG $0000\n DSW 2,$1234"),
        vec![0x34, 0x12, 0x34, 0x12]
    );
}

#[test]
fn low_and_high_byte_tables() {
    assert_eq!(
        assemble_ok("ORG $0000\n DL $1234, $5678\n DH $1234"),
        vec![0x34, 0x78, 0x12]
    );
}

#[test]
fn hex_emits_exact_bytes() {
    assert_eq!(
        assemble_ok("ORG $0000\nHEX 0123 45 6"),
        vec![0x01, 0x23, 0x45, 0x06]
    );
    assert_eq!(assemble_err("ORG $0000\nHEX zz"), AsmError::NotANumber);
}

#[test]
fn db_strings_with_offset_expression() {
    assert_eq!(
        assemble_ok("ORG $0000\n DB \"AB\"+1, 0"),
        vec![0x42, 0x43, 0x00]
    );
    assert_eq!(assemble_ok("ORG $0000\n DB 'a', \"a\""), vec![0x61, 0x61]);
}

#[test]
fn word_directive_is_little_endian() {
    assert_eq!(
        assemble_ok("ORG $8000\nvec: DW vec, $1234"),
        vec![0x00, 0x80, 0x34, 0x12]
    );
    assert_eq!(assemble_err("ORG $0000\n DW $10000"), AsmError::OutOfRange);
}

#[test]
fn byte_range_is_checked() {
    assert_eq!(assemble_ok("ORG $0000\n DB 255, -128"), vec![0xff, 0x80]);
    assert_eq!(assemble_err("ORG $0000\n DB 256"), AsmError::OutOfRange);
}

#[test]
fn pc_dollar_in_expressions() {
    assert_eq!(assemble_ok("ORG $8000\n DW $"), vec![0x00, 0x80]);
}

#[test]
fn indirect_addressing_modes() {
    assert_eq!(
        assemble_ok("ORG $0000\n LDA ($10,X)\n LDA ($20),Y\n JMP ($1234)"),
        vec![0xa1, 0x10, 0xb1, 0x20, 0x6c, 0x34, 0x12]
    );
}

#[test]
fn accumulator_and_implied_shift() {
    assert_eq!(
        assemble_ok("ORG $0000\n ASL A\n ASL $10\n ASL"),
        vec![0x0a, 0x06, 0x10, 0x0a]
    );
}

#[test]
fn mnemonics_are_case_insensitive() {
    assert_eq!(
        assemble_ok("org $8000\n lda #$01\n sta $0200,x\n rts"),
        vec![0xa9, 0x01, 0x9d, 0x00, 0x02, 0x60]
    );
}

#[test]
fn comments_and_colons_are_ignored() {
    assert_eq!(
        assemble_ok("ORG $8000 ; set origin\nstart: LDA #1 ; load\n RTS"),
        vec![0xa9, 0x01, 0x60]
    );
}

#[test]
fn locals_reset_per_global_label() {
    let src = "ORG $0000\nfirst:\n@v: DB 1\nsecond:\n@v: DB 2\n DB 3";
    assert_eq!(assemble_ok(src), vec![0x01, 0x02, 0x03]);
}

#[test]
fn local_value_labels() {
    assert_eq!(assemble_ok("ORG $0000\nglob:\n@x = 5\n DB @x"), vec![0x05]);
}

#[test]
fn macro_locals_are_hygienic() {
    let src = "ORG $0000\nMACRO waits\n@l: DEX\n BNE @l\nENDM\n waits\n waits";
    assert_eq!(
        assemble_ok(src),
        vec![0xca, 0xd0, 0xfd, 0xca, 0xd0, 0xfd]
    );
}

#[test]
fn macro_named_parameters() {
    assert_eq!(
        assemble_ok("ORG $0000\nMACRO load val\n LDA #val\nENDM\n load $42"),
        vec![0xa9, 0x42]
    );
}

#[test]
fn macro_multiple_arguments() {
    let src = "ORG $0000\nMACRO store val, addr\n LDA #val\n STA addr\nENDM\n store 1, $0200";
    assert_eq!(assemble_ok(src), vec![0xa9, 0x01, 0x8d, 0x00, 0x02]);
}

#[test]
fn recursive_macro_invocation_fails() {
    assert_eq!(
        assemble_err("MACRO m\n m\nENDM\nORG $0000\n m"),
        AsmError::RecursiveMacro
    );
}

#[test]
fn nested_rept_blocks() {
    let src = "ORG $0000\nREPT 2\n DB 1\nREPT 2\n DB 2\nENDR\nENDR";
    assert_eq!(assemble_ok(src), vec![0x01, 0x02, 0x02, 0x01, 0x02, 0x02]);
}

#[test]
fn rept_zero_emits_nothing() {
    assert_eq!(assemble_ok("ORG $0000\nREPT 0\n DB 1\nENDR\n DB 2"), vec![0x02]);
}

#[test]
fn stray_block_closers_fail() {
    assert_eq!(assemble_err("ORG $0000\nENDM"), AsmError::ExtraEndM);
    assert_eq!(assemble_err("ORG $0000\nENDR"), AsmError::ExtraEndR);
    assert_eq!(assemble_err("ORG $0000\nENDE"), AsmError::ExtraEndE);
    assert_eq!(assemble_err("ORG $0000\nENDIF"), AsmError::ExtraEndIf);
}

#[test]
fn unterminated_blocks_fail() {
    assert_eq!(assemble_err("ORG $0000\nIF 1\n DB 1"), AsmError::MissingEndIf);
    assert_eq!(assemble_err("MACRO m\n DB 1"), AsmError::MissingEndM);
    assert_eq!(assemble_err("ORG $0000\nREPT 2\n DB 1"), AsmError::MissingEndR);
    assert_eq!(assemble_err("ORG $0000\nENUM 0\nx: DSB 1"), AsmError::MissingEndE);
}

#[test]
fn if_nesting_is_capped() {
    let mut src = String::from("ORG $0000\n");
    for _ in 0..32 {
        src.push_str("IF 1\n");
    }
    assert_eq!(assemble_err(&src), AsmError::IfNestLimit);
}

#[test]
fn emission_before_org_fails() {
    assert_eq!(assemble_err(" DB 1"), AsmError::UndefinedPC);
}

#[test]
fn divide_by_zero_fails() {
    assert_eq!(assemble_err("ORG $0000\n DB 1/0"), AsmError::DivideByZero);
}

#[test]
fn duplicate_labels_fail() {
    assert_eq!(
        assemble_err("ORG $0000\nfoo: DB 1\nfoo: DB 2"),
        AsmError::LabelAlreadyDefined
    );
}

#[test]
fn malformed_label_fails() {
    assert_eq!(assemble_err("ORG $0000\n1abc"), AsmError::IllegalInstruction);
}

#[test]
fn trailing_garbage_fails() {
    assert_eq!(
        assemble_err("ORG $0000 junk"),
        AsmError::ExtraCharsOnLine
    );
}

#[test]
fn error_directive_reports_message() {
    let err = assemble("ORG $0000\nERROR \"custom failure\"").unwrap_err();
    assert_eq!(*err.root(), AsmError::Custom("custom failure".to_string()));
    assert!(err.to_string().ends_with("(2): custom failure"));
}

#[test]
fn bare_word_defines_a_label() {
    assert_eq!(
        assemble_ok("ORG $8000\nvname\n DW vname"),
        vec![0x00, 0x80]
    );
}

#[test]
fn include_splices_files() {
    let inner = temp_path("asm");
    fs::write(&inner, " DB $22\n").unwrap();
    let src = format!("ORG $0000\n DB $11\nINCLUDE {}\n DB $33", inner.display());
    let bytes = assemble_ok(&src);
    let _ = fs::remove_file(&inner);
    assert_eq!(bytes, vec![0x11, 0x22, 0x33]);
}

#[test]
fn include_errors_carry_both_locations() {
    let inner = temp_path("asm");
    fs::write(&inner, " DB 1/0\n").unwrap();
    let src = format!("ORG $0000\nINCLUDE {}", inner.display());
    let err = assemble(&src).unwrap_err();
    let _ = fs::remove_file(&inner);
    assert_eq!(*err.root(), AsmError::DivideByZero);
    let text = err.to_string();
    assert!(text.contains("(2): "));
    assert!(text.contains("(1): "));
}

#[test]
fn missing_include_fails() {
    assert!(matches!(
        assemble_err("ORG $0000\nINCLUDE no-such-file.asm"),
        AsmError::CantOpenFile(_)
    ));
}

#[test]
fn incbin_copies_slices() {
    let bin = temp_path("bin");
    fs::write(&bin, [0x10u8, 0x20, 0x30, 0x40]).unwrap();
    let display = bin.display().to_string();

    let bytes = assemble_ok(&format!("ORG $0000\nINCBIN {display}"));
    assert_eq!(bytes, vec![0x10, 0x20, 0x30, 0x40]);

    let bytes = assemble_ok(&format!("ORG $0000\nINCBIN {display}, 1, 2"));
    assert_eq!(bytes, vec![0x20, 0x30]);

    let err = assemble(&format!("ORG $0000\nINCBIN {display}, 5"));
    assert_eq!(*err.unwrap_err().root(), AsmError::SeekOutOfRange);

    let err = assemble(&format!("ORG $0000\nINCBIN {display}, 1, 4"));
    assert_eq!(*err.unwrap_err().root(), AsmError::BadIncbinSize);

    let _ = fs::remove_file(&bin);
}

#[test]
fn dotted_directives_are_accepted() {
    assert_eq!(
        assemble_ok(".ORG $0000\n .DB 1\n .DC.B 2\n .BYTE 3"),
        vec![0x01, 0x02, 0x03]
    );
}

#[test]
fn output_length_matches_pc_span() {
    let bytes = assemble_ok("ORG $8000\n LDX #0\n DSB 5\n DW $, $\n PAD $8010");
    assert_eq!(bytes.len(), 0x10);
}

#[test]
fn listing_records_addresses_and_bytes() {
    let (mut asm, result) = assemble_with("ORG $8000\nstart: LDA #$42\n RTS", |asm| {
        asm.enable_listing(false);
    });
    result.unwrap();
    let text = asm.listing_text();
    assert!(text.contains("8000    A9 42"));
    assert!(text.contains("start: LDA #$42"));
    assert!(text.contains("SYMBOL TABLE"));
    assert!(text.contains("start"));
}

#[test]
fn listing_hides_macro_bodies_unless_verbose() {
    let src = "ORG $0000\nMACRO two\n DB 1\n DB 2\nENDM\n two";
    let (mut asm, result) = assemble_with(src, |asm| asm.enable_listing(false));
    result.unwrap();
    let text = asm.listing_text();
    // The invocation line carries the expansion's bytes.
    assert!(text.contains("01 02"));

    let (mut asm, result) = assemble_with(src, |asm| asm.enable_listing(true));
    result.unwrap();
    let verbose = asm.listing_text();
    assert!(verbose.len() > text.len());
}
