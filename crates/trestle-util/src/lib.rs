#![forbid(unsafe_code)]
//! Hashing and filesystem utilities for trestle.

pub mod error;
pub mod fs;
pub mod hash;
