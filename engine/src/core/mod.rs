//! Core building blocks: virtual time.

pub mod time;
