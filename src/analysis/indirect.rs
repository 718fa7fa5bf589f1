//! # `gost::analysis::indirect`
//!
//! The indirect-reference catalogue: instruction sequences that build a two-word interface
//! value (`(*type, *value)`) rather than a bare string header. A candidate only survives if the
//! type descriptor's kind byte says "string" and the value header it points at resolves into
//! the blob.
//!

use tracing::trace;

use super::Candidate;
use crate::address::Range;
use crate::error::Result;
use crate::exe::Executable;
use crate::pattern::{match_bytes, WILDCARD as W};

/// Offset of the kind byte within a type descriptor, and the kind value that denotes `string`
/// under Go's `reflect.Kind` encoding. The top bits of the byte carry unrelated flags
/// (`kindDirectIface`, `kindGCProg`), so only the low 5 bits are compared.
const KIND_OFFSET: u64 = 23;
const STRING_KIND: u8 = 24;
const KIND_MASK: u8 = 0x1f;

pub struct IndirectMatcher {
    pub pattern: &'static [u8],

    pub ins_pos: usize,

    pub type_offset_pos: usize,
    pub type_offset_len: usize,

    pub value_header_offset_pos: usize,
    pub value_header_offset_len: usize,

    pub arg1_pos: i32,
    pub arg2_pos: usize,
}

pub static INDIRECT_MATCHERS: &[IndirectMatcher] = &[
    IndirectMatcher {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x44, 0x24, W, // mov qword ptr [rsp + ?], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x44, 0x24, W, // mov qword ptr [rsp + ?], rax
        ],
        ins_pos: 12,
        type_offset_pos: 3,
        type_offset_len: 4,
        value_header_offset_pos: 15,
        value_header_offset_len: 4,
        arg1_pos: 11,
        arg2_pos: 23,
    },
    IndirectMatcher {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x04, 0x24, // mov qword ptr [rsp], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x44, 0x24, W, // mov qword ptr [rsp + ?], rax
        ],
        ins_pos: 11,
        type_offset_pos: 3,
        type_offset_len: 4,
        value_header_offset_pos: 14,
        value_header_offset_len: 4,
        arg1_pos: -1,
        arg2_pos: 22,
    },
    IndirectMatcher {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x84, 0x24, W, W, W, W, // mov qword ptr [rsp + ????], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x84, 0x24, W, W, W, W, // mov qword ptr [rsp + ????], rax
        ],
        ins_pos: 15,
        type_offset_pos: 3,
        type_offset_len: 4,
        value_header_offset_pos: 18,
        value_header_offset_len: 4,
        arg1_pos: 11,
        arg2_pos: 26,
    },
];

fn validate_catalogue(matchers: &[IndirectMatcher]) {
    for (i, m) in matchers.iter().enumerate() {
        let plen = m.pattern.len();
        assert!(m.ins_pos < plen, "catalogue[{i}]: ins_pos out of range");
        assert!(
            m.type_offset_pos + m.type_offset_len <= plen,
            "catalogue[{i}]: type offset out of range"
        );
        assert!(
            m.value_header_offset_pos + m.value_header_offset_len <= plen,
            "catalogue[{i}]: value header offset out of range"
        );
        if m.arg1_pos >= 0 {
            assert!((m.arg1_pos as usize) < plen, "catalogue[{i}]: arg1_pos out of range");
        }
        assert!(m.arg2_pos < plen, "catalogue[{i}]: arg2_pos out of range");
    }
}

struct InterfaceReference {
    addr: u64,
    type_addr: u64,
    value_header_addr: u64,
}

fn find_interface_references(exe: &dyn Executable) -> Result<Vec<InterfaceReference>> {
    let text = exe.text_section()?;
    let data = text.data();
    let patterns: Vec<&[u8]> = INDIRECT_MATCHERS.iter().map(|m| m.pattern).collect();
    let matches = match_bytes(data, &patterns);

    let mut references = Vec::new();
    for m in matches {
        let matcher = &INDIRECT_MATCHERS[m.pattern];

        let arg1 = if matcher.arg1_pos >= 0 { data[m.index + matcher.arg1_pos as usize] as u64 } else { 0 };
        let arg2 = data[m.index + matcher.arg2_pos] as u64;

        if arg1 % 8 != 0 || arg2 != arg1 + 8 {
            continue;
        }

        let ref_addr = text.addr_range.start + (m.index + matcher.ins_pos) as u64;

        let type_rel_addr =
            text.addr_range.start + (m.index + matcher.type_offset_pos + matcher.type_offset_len) as u64;
        let type_offset = exe.byte_order().read_uint(
            &data[m.index + matcher.type_offset_pos..],
            matcher.type_offset_len,
        );

        let value_header_rel_addr = text.addr_range.start
            + (m.index + matcher.value_header_offset_pos + matcher.value_header_offset_len) as u64;
        let value_header_offset = exe.byte_order().read_uint(
            &data[m.index + matcher.value_header_offset_pos..],
            matcher.value_header_offset_len,
        );

        references.push(InterfaceReference {
            addr: ref_addr,
            type_addr: type_rel_addr.wrapping_add(type_offset),
            value_header_addr: value_header_rel_addr.wrapping_add(value_header_offset),
        });
    }

    Ok(references)
}

/// Scans the code section for interface values wrapping a string, resolving each candidate's
/// type descriptor and value header out of `.rodata`
pub fn find_indirect_references(exe: &dyn Executable, blob: Option<Range>) -> Result<Vec<Candidate>> {
    validate_catalogue(INDIRECT_MATCHERS);

    let refs = find_interface_references(exe)?;
    if refs.is_empty() {
        return Ok(Vec::new());
    }

    let rodata = exe.rodata_section()?;

    let mut candidates = Vec::new();
    for r in refs {
        if !rodata.addr_range.contains(r.type_addr) || !rodata.addr_range.contains(r.value_header_addr) {
            continue;
        }

        let kind_offset = (r.type_addr - rodata.addr_range.start + KIND_OFFSET) as usize;
        let kind_byte = match rodata.read_at(kind_offset, 1) {
            Ok(b) => b[0],
            Err(_) => continue,
        };
        if kind_byte & KIND_MASK != STRING_KIND {
            continue;
        }

        let header_offset = (r.value_header_addr - rodata.addr_range.start) as usize;
        let ptr = exe.byte_order().read_uint(rodata.read_at(header_offset, 8)?, 8);

        if let Some(range) = blob {
            if !range.contains(ptr) {
                continue;
            }
        }

        let length = exe.byte_order().read_uint(rodata.read_at(header_offset + 8, 8)?, 8);

        trace!(addr = %format!("0x{ptr:x}"), length, ins_addr = %format!("0x{:x}", r.addr), "indirect candidate");

        candidates.push(Candidate { addr: ptr, length, ref_addrs: vec![r.addr] });
    }

    Ok(candidates)
}
