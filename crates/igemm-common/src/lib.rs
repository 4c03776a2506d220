//! Common types and utilities for the QU8 IGEMM microkernel workspace
//!
//! This crate provides the foundational pieces shared by the kernel, probe
//! and tester crates: the error taxonomy, the instruction-set capability
//! enum used for kernel gating, harness configuration read from the
//! environment, and a few integer helpers used by packing and tiling code.

pub mod config;
pub mod error;
pub mod isa;
pub mod math;

pub use config::HarnessConfig;
pub use error::*;
pub use isa::Isa;
pub use math::{divide_round_up, next_prime, round_down, round_up};
