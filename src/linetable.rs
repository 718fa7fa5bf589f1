//! # `gost::linetable`
//!
//! PC-to-source-line resolution. This is treated as an external, swappable concern: the
//! analysis core only depends on the [`LineTable`] trait, never on the pclntab format
//! concretely, and a missing or unparseable table degrades to empty results rather than
//! failing the whole scan — the string/reference data is the product here, source positions
//! are a courtesy.
//!
//! [`Pclntab`] is a best-effort decoder for the modern (Go 1.16+) `.gopclntab` layout. It
//! covers the common case — a single-module binary on one architecture — and returns "unknown"
//! rather than guessing when the header magic isn't recognised or an offset looks implausible.

/// Resolves an instruction address to the source file and line that produced it
pub trait LineTable {
    /// Returns `(file, line)`, or `("", 0)` if `pc` isn't covered
    fn lookup(&self, pc: u64) -> (String, u32);
}

/// A line table that never resolves anything. Used when `.gopclntab` is absent or fails to
/// parse; results still get emitted, just without file/line references.
pub struct NullLineTable;

impl LineTable for NullLineTable {
    fn lookup(&self, _pc: u64) -> (String, u32) {
        (String::new(), 0)
    }
}

const GO_1_16_MAGIC: u32 = 0xfffffffa;
const GO_1_18_MAGIC: u32 = 0xfffffff0;
const GO_1_20_MAGIC: u32 = 0xfffffff1;

const FUNC_RECORD_SIZE: usize = 40;

/// A parsed `.gopclntab`, targeting the header shape shared by Go 1.16 through 1.20
/// (`funcnametab`/`cutab`/`filetab`/`pctab`/`funcdata` offsets in the header, compact
/// `uint32` function table entries). Function records from later Go versions that relocated
/// fields are read with the same offsets on a best-effort basis; a field that resolves outside
/// the table's bounds is treated as absent rather than panicking.
pub struct Pclntab {
    data: Vec<u8>,
    quantum: u64,
    text_start: u64,
    nfunc: usize,
    funcnametab_off: usize,
    cutab_off: usize,
    filetab_off: usize,
    pctab_off: usize,
    funcdata_off: usize,
}

impl Pclntab {
    /// Parses `data` (the raw contents of `.gopclntab`/`__gopclntab`). Returns `None` if the
    /// magic isn't recognised.
    pub fn parse(data: &[u8], text_start: u64) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().ok()?);
        if !matches!(magic, GO_1_16_MAGIC | GO_1_18_MAGIC | GO_1_20_MAGIC) {
            return None;
        }

        let quantum = *data.get(6)? as u64;
        let ptr_size = *data.get(7)? as usize;
        if ptr_size != 8 {
            // this decoder only targets 64-bit binaries, the only kind this tool analyses
            return None;
        }

        let read_word = |off: usize| -> Option<usize> {
            data.get(off..off + 8).map(|b| u64::from_le_bytes(b.try_into().unwrap()) as usize)
        };

        let nfunc = read_word(8)?;
        let funcnametab_off = read_word(24)?;
        let cutab_off = read_word(32)?;
        let filetab_off = read_word(40)?;
        let pctab_off = read_word(48)?;
        let funcdata_off = read_word(56)?;

        Some(Self {
            data: data.to_vec(),
            quantum: quantum.max(1),
            text_start,
            nfunc,
            funcnametab_off,
            cutab_off,
            filetab_off,
            pctab_off,
            funcdata_off,
        })
    }

    fn functab_entry(&self, i: usize) -> Option<(u64, usize)> {
        let off = self.funcdata_off + i * 8;
        let pc = u32::from_le_bytes(self.data.get(off..off + 4)?.try_into().ok()?) as u64;
        let funcoff = u32::from_le_bytes(self.data.get(off + 4..off + 8)?.try_into().ok()?) as usize;
        Some((self.text_start + pc, funcoff))
    }

    /// Finds the function record covering `pc` via binary search over the function table,
    /// returning its entry pc and the absolute offset of its `_func` record
    fn find_func(&self, pc: u64) -> Option<(u64, usize)> {
        if self.nfunc == 0 {
            return None;
        }
        let (mut lo, mut hi) = (0usize, self.nfunc);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let (entry, _) = self.functab_entry(mid)?;
            if entry <= pc {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            return None;
        }
        let (entry, funcoff) = self.functab_entry(lo - 1)?;
        Some((entry, self.funcdata_off + funcoff))
    }

    fn u32_at(&self, off: usize) -> Option<u32> {
        self.data.get(off..off + 4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn string_at(&self, off: usize) -> Option<String> {
        let bytes = self.data.get(off..)?;
        let end = bytes.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn file_name(&self, cu_offset: u32, file_index: i64) -> Option<String> {
        if file_index < 0 {
            return None;
        }
        let cutab_entry_off = self.cutab_off + (cu_offset as usize + file_index as usize) * 4;
        let filetab_index = self.u32_at(cutab_entry_off)?;
        let filetab_entry_off = self.filetab_off + filetab_index as usize * 4;
        let str_off = self.u32_at(filetab_entry_off)?;
        self.string_at(self.funcnametab_off + str_off as usize)
    }
}

impl LineTable for Pclntab {
    fn lookup(&self, pc: u64) -> (String, u32) {
        let (entry, func_off) = match self.find_func(pc) {
            Some(v) => v,
            None => return (String::new(), 0),
        };

        let pcfile_off = match self.u32_at(func_off + 20) {
            Some(v) => v as usize,
            None => return (String::new(), 0),
        };
        let pcln_off = match self.u32_at(func_off + 24) {
            Some(v) => v as usize,
            None => return (String::new(), 0),
        };
        let cu_offset = self.u32_at(func_off + 32).unwrap_or(0);

        let pctab = &self.data[self.pctab_off..];

        let line = pcvalue(pctab, pcln_off, entry, pc, self.quantum).unwrap_or(-1);
        let file_index = pcvalue(pctab, pcfile_off, entry, pc, self.quantum).unwrap_or(-1);

        let file = self.file_name(cu_offset, file_index).unwrap_or_default();
        let line = if line < 0 { 0 } else { line as u32 };

        (file, line)
    }
}

fn read_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        result |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

fn zigzag_decode(uv: u64) -> i64 {
    if uv & 1 != 0 { -(((uv >> 1) + 1) as i64) } else { (uv >> 1) as i64 }
}

/// Decodes a Go `pctab` value-delta stream starting at `off`, returning the value in effect at
/// `target_pc`, or `None` if `target_pc` falls past the end of the encoded range
fn pcvalue(pctab: &[u8], off: usize, entry_pc: u64, target_pc: u64, quantum: u64) -> Option<i64> {
    let mut pos = off;
    let mut pc = entry_pc;
    let mut val: i64 = -1;
    let mut first = true;

    loop {
        let (uvdelta, n) = read_uvarint(pctab.get(pos..)?)?;
        if uvdelta == 0 && !first {
            return None;
        }
        first = false;
        pos += n;

        let vdelta = zigzag_decode(uvdelta);
        let (pcdelta, n2) = read_uvarint(pctab.get(pos..)?)?;
        pos += n2;

        pc += pcdelta * quantum;
        val += vdelta;

        if target_pc < pc {
            return Some(val);
        }
    }
}
