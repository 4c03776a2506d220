//! Conformance harness for QU8 IGEMM microkernels
//!
//! [`GemmMicrokernelTester`] checks one kernel on one problem shape against
//! a scalar reference; [`Scenario`] expands a registered variant into the
//! full catalogue of shapes, strides, offsets and zero-point settings every
//! kernel must handle.

pub mod scenarios;
pub mod tester;

pub use scenarios::Scenario;
pub use tester::{FILL_BYTE, GemmMicrokernelTester, Qu8IgemmProblem};

// Exit codes for the conformance binary
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
