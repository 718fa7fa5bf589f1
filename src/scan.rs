//! # `gost::scan`
//!
//! Top-level orchestration: locate the string blob, run both analyzers, reconcile their
//! candidates, and return finished results. This is the one function a caller (the CLI, or any
//! embedder of this crate) actually needs to call.
//!

use crate::analysis::{direct, indirect};
use crate::error::Result;
use crate::exe::Executable;
use crate::linetable::LineTable;
use crate::reconcile::{self, ScanResult};
use crate::strtable::{self, StringTablePolicy};

/// Tunables for a single scan. `Default` matches the CLI's own defaults: guess the string
/// table only if explicitly asked to, and reject strings containing embedded nulls.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub string_table_policy: StringTablePolicy,
    pub reject_nulls: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { string_table_policy: StringTablePolicy::RequireSymbol, reject_nulls: true }
    }
}

/// Runs a full scan against `exe`, using `line_table` to annotate references with source
/// positions.
pub fn run(exe: &dyn Executable, line_table: &dyn LineTable, opts: &ScanOptions) -> Result<Vec<ScanResult>> {
    let blob_range = strtable::locate(exe, opts.string_table_policy)?;

    let mut candidates = direct::find_direct_references(exe, blob_range)?;
    candidates.extend(indirect::find_indirect_references(exe, blob_range)?);

    reconcile::build_results(candidates, exe, line_table, opts.reject_nulls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Range;
    use crate::exe::fake::FakeExecutable;
    use crate::exe::Section;
    use crate::linetable::NullLineTable;

    fn build_first_arg_rax(text_start: u64, blob_addr: u64, length: u32) -> Vec<u8> {
        let mut bytes = vec![0x48, 0x8d, 0x05, 0, 0, 0, 0, 0x48, 0x89, 0x04, 0x24, 0x48, 0xc7, 0x44, 0x24, 0x08, 0, 0, 0, 0];
        let rel_pc = text_start + 7;
        let disp = (blob_addr as i64 - rel_pc as i64) as i32;
        bytes[3..7].copy_from_slice(&disp.to_le_bytes());
        bytes[16..20].copy_from_slice(&length.to_le_bytes());
        bytes
    }

    #[test]
    fn end_to_end_scan_with_ignored_string_table_finds_direct_reference() {
        let text_start = 0x1000;
        let rodata_start = 0x5000;
        let blob_addr = rodata_start + 4;
        let code = build_first_arg_rax(text_start, blob_addr, 5);

        let mut rodata_bytes = vec![0u8; 0x100];
        rodata_bytes[4..9].copy_from_slice(b"hello");

        let text = Section::new("__text", Range::new(text_start, text_start + code.len() as u64), code);
        let rodata = Section::new("__rodata", Range::new(rodata_start, rodata_start + rodata_bytes.len() as u64), rodata_bytes);
        let pclntab = Section::new("__gopclntab", Range::new(0, 0), vec![]);
        let exe = FakeExecutable::new(text, rodata, pclntab, vec![]);

        let opts = ScanOptions { string_table_policy: StringTablePolicy::Ignore, reject_nulls: true };
        let results = run(&exe, &NullLineTable, &opts).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, b"hello");
        assert_eq!(results[0].refs.len(), 1);
    }

    #[test]
    fn scan_fails_fast_when_symbol_required_but_missing() {
        let text = Section::new("__text", Range::new(0, 0), vec![]);
        let rodata = Section::new("__rodata", Range::new(0, 0), vec![]);
        let pclntab = Section::new("__gopclntab", Range::new(0, 0), vec![]);
        let exe = FakeExecutable::new(text, rodata, pclntab, vec![]);

        let opts = ScanOptions::default();
        assert!(run(&exe, &NullLineTable, &opts).is_err());
    }
}
