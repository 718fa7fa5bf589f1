//! # `gost::strtable`
//!
//! Locates the address range of the toolchain's packed string blob, preferring the
//! `go.string.*` symbol and falling back to a heuristic ASCII-run scan of `.rodata` when
//! asked to.
//!

use tracing::{debug, warn};

use crate::address::Range;
use crate::exe::Executable;
use crate::error::{GostError, Result};

/// Gap (in bytes) below which two adjacent ASCII-like runs are merged into one during the
/// heuristic scan. Fixed by design — see the spec's "Open Questions": this is tunable only by
/// a code change, not by `ScanOptions`.
const MERGE_GAP: u64 = 16;

const BLOB_SYMBOL: &str = "go.string.*";

/// Policy controlling how the string blob is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringTablePolicy {
    /// Require the `go.string.*` symbol; fail if it's absent
    RequireSymbol,
    /// Prefer the symbol, falling back to the heuristic ASCII-run scan
    Guess,
    /// Skip locating the blob entirely; downstream analyzers treat containment checks as
    /// always-true
    Ignore,
}

/// Locates the string blob per `policy`. Returns `None` only for `Ignore`.
pub fn locate(exe: &dyn Executable, policy: StringTablePolicy) -> Result<Option<Range>> {
    match policy {
        StringTablePolicy::RequireSymbol => {
            let sym = exe.symbol(BLOB_SYMBOL).map_err(|_| {
                GostError::SymbolMissing(BLOB_SYMBOL.to_string())
            })?;
            debug!(range = %sym.addr_range, "located string blob via symbol");
            Ok(Some(sym.addr_range))
        }
        StringTablePolicy::Guess => {
            if let Ok(sym) = exe.symbol(BLOB_SYMBOL) {
                debug!(range = %sym.addr_range, "located string blob via symbol");
                return Ok(Some(sym.addr_range));
            }
            warn!("{BLOB_SYMBOL} symbol absent, falling back to heuristic ASCII scan");
            let range = guess(exe)?;
            debug!(range = %range, "located string blob via heuristic scan");
            Ok(Some(range))
        }
        StringTablePolicy::Ignore => Ok(None),
    }
}

/// Scans `.rodata` for the largest contiguous (after merging) run of ASCII-like bytes
fn guess(exe: &dyn Executable) -> Result<Range> {
    let rodata = exe.rodata_section()?;
    let data = rodata.data();

    let mut runs: Vec<Range> = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &b) in data.iter().enumerate() {
        if is_ascii_like(b) {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            runs.push(Range::new(
                rodata.addr_range.start + start as u64,
                rodata.addr_range.start + i as u64,
            ));
        }
    }
    if let Some(start) = run_start {
        runs.push(Range::new(
            rodata.addr_range.start + start as u64,
            rodata.addr_range.start + data.len() as u64,
        ));
    }

    if runs.is_empty() {
        return Err(GostError::StringBlobNotDetected);
    }

    merge_runs(&runs, MERGE_GAP)
        .into_iter()
        .max_by_key(|r| r.size())
        .ok_or(GostError::StringBlobNotDetected)
}

fn is_ascii_like(b: u8) -> bool {
    (0x20..=0x7E).contains(&b) || b == 0x09 || b == 0x0A
}

/// Merges adjacent ranges whose gap is strictly less than `max_gap`. `ranges` must already be
/// ordered by `start`.
fn merge_runs(ranges: &[Range], max_gap: u64) -> Vec<Range> {
    if ranges.len() <= 1 {
        return ranges.to_vec();
    }

    let mut merged = Vec::new();
    let mut current = ranges[0];

    for &next in &ranges[1..] {
        if next.start - current.end < max_gap {
            current.end = next.end;
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exe::fake::FakeExecutable;
    use crate::exe::{Section, Symbol};

    fn exe_with_rodata(data: Vec<u8>) -> FakeExecutable {
        let rodata = Section::new("__rodata", Range::new(1000, 1000 + data.len() as u64), data);
        let text = Section::new("__text", Range::new(0, 0), vec![]);
        let pclntab = Section::new("__gopclntab", Range::new(0, 0), vec![]);
        FakeExecutable::new(text, rodata, pclntab, vec![])
    }

    #[test]
    fn require_symbol_uses_symbol_range_when_present() {
        let mut exe = exe_with_rodata(vec![]);
        exe.symbols.push(Symbol { name: BLOB_SYMBOL.to_string(), addr_range: Range::new(10, 20) });
        let range = locate(&exe, StringTablePolicy::RequireSymbol).unwrap();
        assert_eq!(range, Some(Range::new(10, 20)));
    }

    #[test]
    fn require_symbol_fails_when_symbol_absent() {
        let exe = exe_with_rodata(vec![]);
        let err = locate(&exe, StringTablePolicy::RequireSymbol).unwrap_err();
        assert!(matches!(err, GostError::SymbolMissing(_)));
    }

    #[test]
    fn ignore_returns_none() {
        let exe = exe_with_rodata(vec![]);
        assert_eq!(locate(&exe, StringTablePolicy::Ignore).unwrap(), None);
    }

    #[test]
    fn guess_merges_runs_within_gap_and_picks_largest() {
        // run 1: "hi" (2 bytes) at offset 0
        // gap: 5 non-ascii bytes (< 16) -> merges with run 2
        // run 2: "hello world" (11 bytes)
        let mut data = b"hi".to_vec();
        data.extend([0x00; 5]);
        data.extend(b"hello world");
        // a second, smaller, unmerged run far away
        data.extend([0x00; 50]);
        data.extend(b"x");

        let exe = exe_with_rodata(data);
        let range = locate(&exe, StringTablePolicy::Guess).unwrap().unwrap();

        // merged run spans from start of "hi" through end of "hello world"
        assert_eq!(range.start, 1000);
        assert_eq!(range.end, 1000 + 2 + 5 + 11);
    }

    #[test]
    fn guess_fails_when_no_ascii_runs_exist() {
        let exe = exe_with_rodata(vec![0x00, 0x01, 0x02]);
        let err = locate(&exe, StringTablePolicy::Guess).unwrap_err();
        assert!(matches!(err, GostError::StringBlobNotDetected));
    }

    #[test]
    fn guess_prefers_symbol_when_available() {
        let mut exe = exe_with_rodata(b"some ascii text here".to_vec());
        exe.symbols.push(Symbol { name: BLOB_SYMBOL.to_string(), addr_range: Range::new(5, 9) });
        let range = locate(&exe, StringTablePolicy::Guess).unwrap();
        assert_eq!(range, Some(Range::new(5, 9)));
    }
}
