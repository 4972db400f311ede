//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. CRITICAL: all randomness in the
//! simulator MUST go through this module, on a per-component stream.

mod xorshift;

pub use xorshift::RngManager;
