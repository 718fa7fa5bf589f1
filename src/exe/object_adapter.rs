//! # `gost::exe::object_adapter`
//!
//! Concrete [`Executable`] backed by the `object` crate, the same crate this tool's teacher
//! lineage uses for its own section/symbol enumeration, with the file mapped into memory via
//! `memmap2` rather than read into a heap buffer up front.
//!

use std::path::Path;

use memmap2::Mmap;
use object::{Object, ObjectSection, ObjectSymbol};

use super::{synthesize_symbol_sizes, ByteOrder, Executable, RawSymbol, Section, Symbol};
use crate::address::Range;
use crate::error::{GostError, Result};

const TEXT_NAMES: &[&str] = &["__text", ".text"];
const RODATA_NAMES: &[&str] = &["__rodata", ".rodata"];
const PCLNTAB_NAMES: &[&str] = &["__gopclntab", ".gopclntab"];

/// An executable backed by a memory-mapped Mach-O or ELF file
#[derive(Debug)]
pub struct ObjectExecutable {
    byte_order: ByteOrder,
    sections: Vec<Section>,
    symbols_sorted: Vec<Symbol>,
    // kept alive for the lifetime of the adapter; sections above hold their own owned copies
    // of the bytes they need, so this is not read again after construction.
    _mmap: Mmap,
}

impl ObjectExecutable {
    /// Opens and parses the file at `path`. Dispatches on the magic bytes described in the
    /// external interfaces section of the spec this tool implements; any other prefix is
    /// `UnknownExecutableFormat`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if !is_recognized_format(&mmap) {
            return Err(GostError::UnknownExecutableFormat);
        }

        let obj = object::File::parse(&*mmap)
            .map_err(|e| GostError::ObjectParse(e.to_string()))?;

        let byte_order = if obj.is_little_endian() { ByteOrder::Little } else { ByteOrder::Big };

        let sections = obj
            .sections()
            .filter_map(|s| {
                let name = s.name().ok()?.to_string();
                let data = s.data().ok()?.to_vec();
                Some(Section::new(name, Range::new(s.address(), s.address() + s.size()), data))
            })
            .collect();

        let raw_symbols: Vec<RawSymbol> = obj
            .symbols()
            .filter(|s| s.is_definition())
            .map(|s| RawSymbol {
                name: s.name().unwrap_or("?").to_string(),
                addr: s.address(),
                size: s.size(),
            })
            .collect();

        let symbols_sorted = synthesize_symbol_sizes(raw_symbols);

        Ok(Self { byte_order, sections, symbols_sorted, _mmap: mmap })
    }

    fn section_by_names(&self, names: &[&str]) -> Result<Section> {
        self.sections
            .iter()
            .find(|s| names.contains(&s.name.as_str()))
            .cloned()
            .ok_or_else(|| GostError::SectionMissing(names.join("/")))
    }
}

fn is_recognized_format(data: &[u8]) -> bool {
    matches!(
        data.get(0..4),
        Some([0xCF, 0xFA, 0xED, 0xFE])
            | Some([0xFE, 0xED, 0xFA, 0xCF])
            | Some([0x7F, 0x45, 0x4C, 0x46])
    )
}

impl Executable for ObjectExecutable {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn text_section(&self) -> Result<Section> {
        self.section_by_names(TEXT_NAMES)
    }

    fn rodata_section(&self) -> Result<Section> {
        self.section_by_names(RODATA_NAMES)
    }

    fn pclntab_section(&self) -> Result<Section> {
        self.section_by_names(PCLNTAB_NAMES)
    }

    fn section_containing_range(&self, range: Range) -> Result<Section> {
        self.sections
            .iter()
            .find(|s| s.addr_range.contains_range(range))
            .cloned()
            .ok_or_else(|| GostError::SectionMissing(format!("containing {range}")))
    }

    fn symbol(&self, name: &str) -> Result<Symbol> {
        self.symbols_sorted
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| GostError::SymbolMissing(name.to_string()))
    }

    fn symbols_sorted(&self) -> &[Symbol] {
        &self.symbols_sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_elf_magic() {
        assert!(is_recognized_format(&[0x7F, 0x45, 0x4C, 0x46, 0x02]));
    }

    #[test]
    fn recognizes_macho_le_and_be_magic() {
        assert!(is_recognized_format(&[0xCF, 0xFA, 0xED, 0xFE]));
        assert!(is_recognized_format(&[0xFE, 0xED, 0xFA, 0xCF]));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(!is_recognized_format(&[0x00, 0x01, 0x02, 0x03]));
        assert!(!is_recognized_format(&[]));
    }

    #[test]
    fn open_rejects_unknown_format_without_invoking_object_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-binary");
        std::fs::write(&path, b"not an executable at all").unwrap();

        let err = ObjectExecutable::open(&path).unwrap_err();
        assert!(matches!(err, GostError::UnknownExecutableFormat));
    }
}
