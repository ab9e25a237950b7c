// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for asm65.

fn main() {
    if let Err(err) = asm65::assembler::run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
