//! # `gost::analysis`
//!
//! The two reference analyzers (direct and indirect) and the `Candidate` type they both
//! produce. See [`direct`] and [`indirect`] for the catalogues themselves.
//!

pub mod direct;
pub mod indirect;

/// A provisional located string: an address inside the (suspected) string blob, its byte
/// length, and every instruction address observed referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub addr: u64,
    pub length: u64,
    pub ref_addrs: Vec<u64>,
}
