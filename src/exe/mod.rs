//! # `gost::exe`
//!
//! The executable facade: an abstract view over a parsed object file that the rest of the
//! engine depends on instead of talking to Mach-O/ELF directly. A concrete adapter built on
//! the `object` crate lives in [`object_adapter`]; tests exercise the core against a small
//! in-memory [`FakeExecutable`] double instead of real files.
//!

pub mod object_adapter;

use std::collections::HashMap;
use std::sync::Arc;

use crate::address::Range;
use crate::error::{GostError, Result};

/// Byte order of the parsed object file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Reads an unsigned integer of `width` bytes (1, 2, 4, or 8) from the start of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `width` isn't one of `{1, 2, 4, 8}` or `buf` is shorter than `width` — both
    /// are catalogue-consistency bugs, not runtime conditions (see `GostError::CatalogueInconsistency`'s
    /// design rationale).
    pub fn read_uint(&self, buf: &[u8], width: usize) -> u64 {
        let bytes = &buf[..width];
        match (self, width) {
            (_, 1) => bytes[0] as u64,
            (ByteOrder::Little, 2) => u16::from_le_bytes(bytes.try_into().unwrap()) as u64,
            (ByteOrder::Big, 2) => u16::from_be_bytes(bytes.try_into().unwrap()) as u64,
            (ByteOrder::Little, 4) => u32::from_le_bytes(bytes.try_into().unwrap()) as u64,
            (ByteOrder::Big, 4) => u32::from_be_bytes(bytes.try_into().unwrap()) as u64,
            (ByteOrder::Little, 8) => u64::from_le_bytes(bytes.try_into().unwrap()),
            (ByteOrder::Big, 8) => u64::from_be_bytes(bytes.try_into().unwrap()),
            _ => panic!("catalogue inconsistency: unsupported integer width {width}"),
        }
    }

    /// Reads a 32-bit two's-complement signed displacement, sign-extended to `i64`
    pub fn read_i32(&self, buf: &[u8]) -> i64 {
        let bytes: [u8; 4] = buf[..4].try_into().unwrap();
        (match self {
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        }) as i64
    }
}

/// A named, contiguous region of loaded memory backed by file bytes
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub addr_range: Range,
    data: Arc<[u8]>,
}

impl Section {
    pub fn new(name: impl Into<String>, addr_range: Range, data: Vec<u8>) -> Self {
        Self { name: name.into(), addr_range, data: data.into() }
    }

    /// All bytes backing this section. Zero-size sections return an empty slice rather than
    /// erroring.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reads `len` bytes starting at byte offset `offset` from the start of the section
    pub fn read_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.get(offset..offset + len).ok_or_else(|| {
            GostError::ReadFailure(format!(
                "section {} has no {len} bytes at offset {offset} (size {})",
                self.name,
                self.data.len()
            ))
        })
    }
}

/// A named range, as reported by the object file's symbol table (after size synthesis)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub addr_range: Range,
}

/// A symbol as read directly off the object file, before size synthesis. `size == 0` is the
/// signal that this symbol's end address must be derived from its neighbours.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

/// Synthesises end addresses for zero-size symbols.
///
/// Symbols are sorted by start address. Any symbol carrying an explicit non-zero size is
/// emitted with `end = addr + size - 1` and otherwise left alone. Zero-size symbols are
/// buffered; once a strictly greater start address is seen (from any following symbol,
/// synthesized or not), every buffered symbol receives `end = next.addr - 1`. Symbols sharing
/// the same start address are buffered together and receive the same synthesized end.
/// Zero-size symbols left buffered at the end of the table collapse to `end = addr`.
pub fn synthesize_symbol_sizes(mut raw: Vec<RawSymbol>) -> Vec<Symbol> {
    raw.sort_by_key(|s| s.addr);

    let mut result = Vec::with_capacity(raw.len());
    let mut buffered: Vec<usize> = Vec::new();
    let mut anchor: u64 = 0;

    for (i, s) in raw.iter().enumerate() {
        if !buffered.is_empty() && s.addr > anchor {
            for &bi in &buffered {
                let b = &raw[bi];
                result.push(Symbol {
                    name: b.name.clone(),
                    addr_range: Range::new(b.addr, s.addr - 1),
                });
            }
            buffered.clear();
        }

        if s.size > 0 {
            result.push(Symbol {
                name: s.name.clone(),
                addr_range: Range::new(s.addr, s.addr + s.size - 1),
            });
        } else {
            buffered.push(i);
        }

        anchor = s.addr;
    }

    for &bi in &buffered {
        let b = &raw[bi];
        result.push(Symbol { name: b.name.clone(), addr_range: Range::new(b.addr, b.addr) });
    }

    result
}

/// Abstract view over a parsed object file. The engine depends only on this trait, never on
/// Mach-O/ELF concretely.
pub trait Executable {
    fn byte_order(&self) -> ByteOrder;

    fn text_section(&self) -> Result<Section>;
    fn rodata_section(&self) -> Result<Section>;
    fn pclntab_section(&self) -> Result<Section>;

    /// Returns the section that fully contains `range`, both endpoints inclusive
    fn section_containing_range(&self, range: Range) -> Result<Section>;

    fn symbol(&self, name: &str) -> Result<Symbol>;

    /// Symbols sorted by start address, after size synthesis. Implementors compute this once.
    fn symbols_sorted(&self) -> &[Symbol];

    /// Resolves each address in `addrs` to its innermost enclosing symbol, via a single linear
    /// sweep through [`symbols_sorted`]. Addresses with no enclosing symbol are absent from the
    /// returned map.
    fn symbols_for_addresses(&self, addrs: &[u64]) -> HashMap<u64, Symbol> {
        let mut sorted = addrs.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let symbols = self.symbols_sorted();
        let mut result = HashMap::new();
        let mut sym_idx = 0;

        for addr in sorted {
            while sym_idx < symbols.len() && symbols[sym_idx].addr_range.end < addr {
                sym_idx += 1;
            }
            if sym_idx < symbols.len() && symbols[sym_idx].addr_range.contains(addr) {
                result.insert(addr, symbols[sym_idx].clone());
            }
        }

        result
    }
}

#[cfg(test)]
pub mod fake {
    //! A minimal in-memory [`Executable`] double used to exercise the analysis core without
    //! going through real Mach-O/ELF bytes.

    use super::*;
    use std::cell::OnceCell;

    pub struct FakeExecutable {
        pub byte_order: ByteOrder,
        pub text: Section,
        pub rodata: Section,
        pub pclntab: Section,
        pub symbols: Vec<Symbol>,
        sorted_cache: OnceCell<Vec<Symbol>>,
    }

    impl FakeExecutable {
        pub fn new(
            text: Section,
            rodata: Section,
            pclntab: Section,
            symbols: Vec<Symbol>,
        ) -> Self {
            Self {
                byte_order: ByteOrder::Little,
                text,
                rodata,
                pclntab,
                symbols,
                sorted_cache: OnceCell::new(),
            }
        }
    }

    impl Executable for FakeExecutable {
        fn byte_order(&self) -> ByteOrder {
            self.byte_order
        }

        fn text_section(&self) -> Result<Section> {
            Ok(self.text.clone())
        }

        fn rodata_section(&self) -> Result<Section> {
            Ok(self.rodata.clone())
        }

        fn pclntab_section(&self) -> Result<Section> {
            Ok(self.pclntab.clone())
        }

        fn section_containing_range(&self, range: Range) -> Result<Section> {
            for s in [&self.text, &self.rodata, &self.pclntab] {
                if s.addr_range.contains_range(range) {
                    return Ok(s.clone());
                }
            }
            Err(GostError::SectionMissing(format!("containing {range}")))
        }

        fn symbol(&self, name: &str) -> Result<Symbol> {
            self.symbols
                .iter()
                .find(|s| s.name == name)
                .cloned()
                .ok_or_else(|| GostError::SymbolMissing(name.to_string()))
        }

        fn symbols_sorted(&self) -> &[Symbol] {
            self.sorted_cache.get_or_init(|| {
                let mut s = self.symbols.clone();
                s.sort_by_key(|sym| sym.addr_range.start);
                s
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, addr: u64, size: u64) -> RawSymbol {
        RawSymbol { name: name.to_string(), addr, size }
    }

    #[test]
    fn zero_size_symbol_ends_before_next_start() {
        let result = synthesize_symbol_sizes(vec![raw("a", 100, 0), raw("b", 200, 0)]);
        assert_eq!(result[0].addr_range, Range::new(100, 199));
        assert_eq!(result[1].addr_range, Range::new(200, 200));
    }

    #[test]
    fn explicit_size_is_preserved() {
        let result = synthesize_symbol_sizes(vec![raw("a", 100, 50)]);
        assert_eq!(result[0].addr_range, Range::new(100, 149));
    }

    #[test]
    fn equal_addressed_symbols_are_buffered_together() {
        let result = synthesize_symbol_sizes(vec![
            raw("a", 100, 0),
            raw("b", 100, 0),
            raw("c", 150, 0),
        ]);
        assert_eq!(result.len(), 3);
        assert!(result[0..2].iter().all(|s| s.addr_range == Range::new(100, 149)));
        assert_eq!(result[2].addr_range, Range::new(150, 150));
    }

    #[test]
    fn trailing_zero_size_symbol_collapses_to_start() {
        let result = synthesize_symbol_sizes(vec![raw("only", 100, 0)]);
        assert_eq!(result[0].addr_range, Range::new(100, 100));
    }

    #[test]
    fn unsorted_input_is_sorted_before_synthesis() {
        let result = synthesize_symbol_sizes(vec![raw("b", 200, 0), raw("a", 100, 0)]);
        assert_eq!(result[0].name, "a");
        assert_eq!(result[0].addr_range, Range::new(100, 199));
        assert_eq!(result[1].name, "b");
    }

    #[test]
    fn sized_symbol_still_terminates_preceding_buffered_run() {
        let result = synthesize_symbol_sizes(vec![raw("a", 100, 0), raw("b", 200, 20)]);
        assert_eq!(result[0].addr_range, Range::new(100, 199));
        assert_eq!(result[1].addr_range, Range::new(200, 219));
    }
}
