//! # `gost::analysis::direct`
//!
//! The direct-reference catalogue: fixed x86-64 instruction sequences the toolchain emits
//! whenever it materialises a `(pointer, length)` string value directly into a stack slot
//! pair — as a function argument, a struct field, or a string-comparison prologue. Every
//! pattern byte sequence and field position below is reproduced verbatim from the reference
//! toolchain-analysis tool this engine re-implements; do not "clean up" the byte sequences,
//! they are copied from real compiler output.
//!

use tracing::trace;

use super::Candidate;
use crate::address::Range;
use crate::error::Result;
use crate::exe::Executable;
use crate::pattern::{match_bytes, WILDCARD as W};

/// One entry in the direct-reference catalogue. All positions are byte offsets relative to
/// the start of `pattern`.
pub struct DirectMatcher {
    pub pattern: &'static [u8],

    /// Offset of the instruction that becomes the reference address reported in results
    pub ins_pos: usize,

    /// Offset of the 32-bit PC-relative displacement (the `lea` operand)
    pub offset_pos: usize,
    pub offset_len: usize,

    /// Offset and width of the immediate string length
    pub len_pos: usize,
    pub len_size: usize,

    /// Stack-frame displacement of the pointer slot. `-1` means "implicit zero offset".
    pub arg1_pos: i32,
    /// Stack-frame displacement of the length slot
    pub arg2_pos: usize,
}

macro_rules! matcher {
    (pattern: $pattern:expr, ins: $ins:expr, offset: ($op:expr, $ol:expr), len: ($lp:expr, $ls:expr), args: ($a1:expr, $a2:expr) $(,)?) => {
        DirectMatcher {
            pattern: $pattern,
            ins_pos: $ins,
            offset_pos: $op,
            offset_len: $ol,
            len_pos: $lp,
            len_size: $ls,
            arg1_pos: $a1,
            arg2_pos: $a2,
        }
    };
}

pub static DIRECT_MATCHERS: &[DirectMatcher] = &[
    // first argument to a function (rax)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x04, 0x24, // mov qword ptr [rsp], rax
            0x48, 0xc7, 0x44, 0x24, 0x08, W, W, W, W, // mov qword ptr [rsp + 8], ????
        ],
        ins: 0, offset: (3, 4), len: (16, 4), args: (-1, 15),
    },
    // first argument to a function (rdx)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x15, W, W, W, W, // lea rdx, [rip + ????]
            0x48, 0x89, 0x14, 0x24, // mov qword ptr [rsp], rdx
            0x48, 0xc7, 0x44, 0x24, 0x08, W, W, W, W, // mov qword ptr [rsp + 8], ????
        ],
        ins: 0, offset: (3, 4), len: (16, 4), args: (-1, 15),
    },
    // first argument to a function (rcx)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x0c, 0x24, // mov qword ptr [rsp], rcx
            0x48, 0xc7, 0x44, 0x24, 0x08, W, W, W, W, // mov qword ptr [rsp + 8], ????
        ],
        ins: 0, offset: (3, 4), len: (16, 4), args: (-1, 15),
    },
    // concatenated-argument variant (rdx, non-zero stack offset)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x15, W, W, W, W, // lea rdx, [rip + ????]
            0x48, 0x89, 0x54, 0x24, W, // mov qword ptr [rsp + ?], rdx
            0x48, 0xc7, 0x44, 0x24, W, W, W, W, W, // mov qword ptr [rsp + ?], ????
        ],
        ins: 0, offset: (3, 4), len: (17, 4), args: (11, 16),
    },
    // any other argument to a function (rax, non-zero stack offset)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x44, 0x24, W, // mov qword ptr [rsp + ?], rax
            0x48, 0xc7, 0x44, 0x24, W, W, W, W, W, // mov qword ptr [rsp + ?], ????
        ],
        ins: 0, offset: (3, 4), len: (17, 4), args: (11, 16),
    },
    // multiple string assignments via runtime.convTstring
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x0c, 0x24, // mov qword ptr [rsp], rcx
            0x48, 0xc7, 0x44, 0x24, W, W, W, W, W, // mov qword ptr [rsp + ?], ????
            0xe8, W, W, W, W, // call ?
            0x48, 0x8b, 0x44, 0x24, W, // mov rax, qword ptr [rsp + ?]
        ],
        ins: 0, offset: (3, 4), len: (16, 4), args: (15, 29),
    },
    // string comparison prologue (a)
    matcher! {
        pattern: &[
            0x48, 0x83, 0x7c, 0x24, W, W, // cmp qword ptr [rsp + ?], ?
            0x74, W, // je ?
            0xeb, W, // jmp ?
            0x48, 0x8b, 0x44, 0x24, W, // mov rax, qword ptr [rsp + ?]
            0x48, 0x89, 0x04, 0x24, // mov qword ptr [rsp], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
        ],
        ins: 19, offset: (22, 4), len: (5, 1), args: (14, 4),
    },
    // string comparison prologue (b)
    matcher! {
        pattern: &[
            0x48, 0x83, 0x7c, 0x24, W, W, // cmp qword ptr [rsp + ?], ?
            0x0f, 0x94, 0xc0, // sete al
            0x74, 0x05, // je ?
            0xe9, W, W, W, W, // jmp ?
            0x48, 0x8b, 0x44, 0x24, W, // mov rax, qword ptr [rsp + ?]
            0x48, 0x89, 0x04, 0x24, // mov qword ptr [rsp], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
        ],
        ins: 25, offset: (28, 4), len: (5, 1), args: (20, 4),
    },
    // string comparison prologue (c)
    matcher! {
        pattern: &[
            0x48, 0x83, 0x7c, 0x24, W, W, // cmp qword ptr [rsp + ?], ?
            0x0f, 0x94, 0xc0, // sete al
            0x74, W, // je ?
            0xeb, W, // jmp ?
            0x48, 0x8b, 0x44, 0x24, W, // mov rax, qword ptr [rsp + ?]
            0x48, 0x89, 0x04, 0x24, // mov qword ptr [rsp], rax
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
        ],
        ins: 22, offset: (25, 4), len: (5, 1), args: (17, 4),
    },
    // string into struct (1)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ?????], 0
            0x0f, 0x85, W, W, W, W, // jne ????
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x0f, // mov qword ptr [rdi], rcx
        ],
        ins: 21, offset: (24, 4), len: (4, 4), args: (-1, 3),
    },
    // string into struct (2)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ?????], 0
            0x75, W, // jne ?
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x47, W, // mov qword ptr [rdi + ?], rax
        ],
        ins: 17, offset: (20, 4), len: (4, 4), args: (27, 3),
    },
    // string into struct (3)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ?????], 0
            0x0f, 0x85, W, W, W, W, // jne ????
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x4f, W, // mov qword ptr [rdi + ?], rcx
        ],
        ins: 21, offset: (24, 4), len: (4, 4), args: (31, 3),
    },
    // string into struct (4)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ?????], 0
            0x0f, 0x85, W, W, W, W, // jne ????
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x07, // mov qword ptr [rdi], rax
        ],
        ins: 21, offset: (24, 4), len: (4, 4), args: (-1, 3),
    },
    // string into struct (5)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ??????], 0
            0x0f, 0x85, W, W, W, W, // jne ????
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x47, W, // mov qword ptr [rdi + ?], rax
        ],
        ins: 21, offset: (24, 4), len: (4, 4), args: (31, 3),
    },
    // string into struct (6)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x40, W, W, W, W, W, // mov qword ptr [rax + ?], ????
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x08, // mov qword ptr [rax], rcx
        ],
        ins: 8, offset: (11, 4), len: (4, 4), args: (-1, 3),
    },
    // string into struct (7)
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x84, 0x24, W, W, W, W, // mov qword ptr [rsp + ????], rax
            0x48, 0xc7, 0x84, 0x24, W, W, W, W, W, W, W, W, // mov qword ptr [rsp + ????], ????
        ],
        ins: 0, offset: (3, 4), len: (23, 4), args: (11, 19),
    },
    // string into struct (8) - direct assignment
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x41, W, W, W, W, W, // mov qword ptr [rcx + ?], ????
            0x83, 0x3d, W, W, W, W, W, // cmp dword ptr [rip + ????], ?
            0x0f, 0x85, W, W, W, W, // jne ????
            0x48, 0x8d, 0x15, W, W, W, W, // lea rdx, [rip + ????]
            0x48, 0x89, 0x51, W, // mov qword ptr [rcx + ?], rdx
        ],
        ins: 21, offset: (24, 4), len: (4, 4), args: (31, 3),
    },
    // string function argument
    matcher! {
        pattern: &[
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x4c, 0x24, W, // mov qword ptr [rsp + ?], rcx
            0x48, 0xc7, 0x44, 0x24, W, W, W, W, W, // mov qword ptr [rsp + ?], ????
        ],
        ins: 0, offset: (3, 4), len: (17, 4), args: (11, 16),
    },
    // const into struct (1)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x40, W, W, W, W, W, // mov qword ptr [rax + ?], ????
            0x48, 0x8d, 0x0d, W, W, W, W, // lea rcx, [rip + ????]
            0x48, 0x89, 0x48, W, // mov qword ptr [rax + ?], rcx
        ],
        ins: 8, offset: (11, 4), len: (4, 4), args: (18, 3),
    },
    // const into struct (2)
    matcher! {
        pattern: &[
            0x48, 0xc7, 0x47, W, W, W, W, W, // mov qword ptr [rdi + ?], ????
            0x48, 0x8d, 0x05, W, W, W, W, // lea rax, [rip + ????]
            0x48, 0x89, 0x47, W, // mov qword ptr [rdi + ?], rax
        ],
        ins: 8, offset: (11, 4), len: (4, 4), args: (18, 3),
    },
];

/// Validates that every catalogue entry only references offsets that fall inside its own
/// pattern and uses a supported length width. A violation is a programming error in the
/// catalogue itself (see `GostError::CatalogueInconsistency`'s design rationale) and panics.
fn validate_catalogue(matchers: &[DirectMatcher]) {
    for (i, m) in matchers.iter().enumerate() {
        let plen = m.pattern.len();
        assert!(m.ins_pos < plen, "catalogue[{i}]: ins_pos out of range");
        assert!(m.offset_pos + m.offset_len <= plen, "catalogue[{i}]: offset out of range");
        assert!(m.len_pos + m.len_size <= plen, "catalogue[{i}]: len out of range");
        assert!(
            matches!(m.len_size, 1 | 2 | 4 | 8),
            "catalogue[{i}]: unsupported len_size {}",
            m.len_size
        );
        if m.arg1_pos >= 0 {
            assert!((m.arg1_pos as usize) < plen, "catalogue[{i}]: arg1_pos out of range");
        }
        assert!(m.arg2_pos < plen, "catalogue[{i}]: arg2_pos out of range");
    }
}

/// Scans the code section for direct references to the string blob
pub fn find_direct_references(exe: &dyn Executable, blob: Option<Range>) -> Result<Vec<Candidate>> {
    validate_catalogue(DIRECT_MATCHERS);

    let text = exe.text_section()?;
    let data = text.data();
    let patterns: Vec<&[u8]> = DIRECT_MATCHERS.iter().map(|m| m.pattern).collect();
    let matches = match_bytes(data, &patterns);

    let mut candidates = Vec::new();
    for m in matches {
        let matcher = &DIRECT_MATCHERS[m.pattern];

        let arg1 = if matcher.arg1_pos >= 0 { data[m.index + matcher.arg1_pos as usize] as u64 } else { 0 };
        let arg2 = data[m.index + matcher.arg2_pos] as u64;

        if arg1 % 8 != 0 || arg2 != arg1 + 8 {
            continue;
        }

        let rel_pc = text.addr_range.start + (m.index + matcher.offset_pos + matcher.offset_len) as u64;
        let disp = exe.byte_order().read_i32(&data[m.index + matcher.offset_pos..]);
        let target = rel_pc.wrapping_add(disp as u64);

        if let Some(range) = blob {
            if !range.contains(target) {
                continue;
            }
        }

        let length = exe.byte_order().read_uint(&data[m.index + matcher.len_pos..], matcher.len_size);
        let ins_addr = text.addr_range.start + (m.index + matcher.ins_pos) as u64;

        trace!(addr = %format!("0x{target:x}"), length, ins_addr = %format!("0x{ins_addr:x}"), "direct candidate");

        candidates.push(Candidate { addr: target, length, ref_addrs: vec![ins_addr] });
    }

    Ok(candidates)
}
