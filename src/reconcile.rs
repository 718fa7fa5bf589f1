//! # `gost::reconcile`
//!
//! Turns raw [`Candidate`](crate::analysis::Candidate)s from the two analyzers into the final,
//! deduplicated, symbol- and line-annotated results a caller actually wants.
//!

use std::collections::HashMap;

use tracing::warn;

use crate::analysis::Candidate;
use crate::error::Result;
use crate::exe::Executable;
use crate::linetable::LineTable;

/// A single located string and every place in the binary that references it. `value` is the raw
/// bytes read out of `.rodata` at `addr..addr+length` — never decoded or null-trimmed, so
/// `value.len()` always equals the candidate's recovered length even when the bytes aren't valid
/// UTF-8. Rendering to text is a presentation concern left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub addr: u64,
    pub value: Vec<u8>,
    pub refs: Vec<Reference>,
}

/// One instruction address that references a [`ScanResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub addr: u64,
    pub symbol_name: Option<String>,
    pub symbol_offset: i64,
    pub file: String,
    pub line: u32,
}

/// Merges candidates sharing the same address, unioning their `ref_addrs`. The first candidate
/// seen for a given address wins on `length` — if a later candidate disagrees, it's logged and
/// dropped rather than overwriting. This mirrors the upstream analyzer's own dedup behaviour,
/// quirks included.
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut order: Vec<u64> = Vec::new();
    let mut by_addr: HashMap<u64, Candidate> = HashMap::new();

    for c in candidates {
        match by_addr.get_mut(&c.addr) {
            Some(existing) => {
                if existing.length != c.length {
                    warn!(
                        addr = %format!("0x{:x}", c.addr),
                        kept = existing.length,
                        seen = c.length,
                        "candidate length disagreement at address, keeping first-seen"
                    );
                }
                existing.ref_addrs.extend(c.ref_addrs);
            }
            None => {
                order.push(c.addr);
                by_addr.insert(c.addr, c);
            }
        }
    }

    order.into_iter().filter_map(|addr| by_addr.remove(&addr)).collect()
}

/// Resolves candidates into final results: filters out anything that doesn't land inside
/// `.rodata`, has zero length, or (per `reject_nulls`) contains an embedded null byte; then
/// attaches source location and symbol information to every reference.
pub fn build_results(
    candidates: Vec<Candidate>,
    exe: &dyn Executable,
    line_table: &dyn LineTable,
    reject_nulls: bool,
) -> Result<Vec<ScanResult>> {
    let deduped = dedupe_candidates(candidates);
    let rodata = exe.rodata_section()?;

    let mut results = Vec::with_capacity(deduped.len());
    for candidate in deduped {
        if candidate.length == 0 {
            continue;
        }
        if !rodata.addr_range.contains(candidate.addr) || !rodata.addr_range.contains(candidate.addr + candidate.length) {
            continue;
        }

        let offset = (candidate.addr - rodata.addr_range.start) as usize;
        let buf = rodata.read_at(offset, candidate.length as usize)?;

        if reject_nulls && buf.contains(&0x00) {
            continue;
        }

        let value = buf.to_vec();
        let refs = candidate
            .ref_addrs
            .iter()
            .map(|&addr| {
                let (file, line) = line_table.lookup(addr);
                Reference { addr, symbol_name: None, symbol_offset: 0, file, line }
            })
            .collect();

        results.push(ScanResult { addr: candidate.addr, value, refs });
    }

    results.sort_by_key(|r| r.addr);
    enrich_with_symbols(&mut results, exe);

    Ok(results)
}

/// Resolves the enclosing symbol (and offset within it) for every reference address across all
/// results, via a single batched lookup rather than one call per address.
fn enrich_with_symbols(results: &mut [ScanResult], exe: &dyn Executable) {
    let addrs: Vec<u64> = results.iter().flat_map(|r| r.refs.iter().map(|rf| rf.addr)).collect();
    let symbols = exe.symbols_for_addresses(&addrs);

    for result in results.iter_mut() {
        for r in result.refs.iter_mut() {
            if let Some(sym) = symbols.get(&r.addr) {
                r.symbol_name = Some(sym.name.clone());
                r.symbol_offset = r.addr as i64 - sym.addr_range.start as i64;
            }
        }
    }
}
