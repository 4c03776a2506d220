//! Error types shared across the workspace.

use crate::isa::Isa;
use thiserror::Error;

/// Top-level error for kernels, quantization setup and harness validation.
#[derive(Debug, Error)]
pub enum IgemmError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("quantization error: {0}")]
    Quantization(#[from] QuantizationError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by microkernels, packing routines and the variant registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("no available kernel variant")]
    NoProvider,

    #[error("unknown kernel variant: {name}")]
    UnknownVariant { name: String },

    #[error("unsupported hardware: required {required}, available {available}")]
    UnsupportedHardware { required: Isa, available: String },

    #[error("quantization params mismatch: kernel expects {expected}, got {found}")]
    ParamsMismatch { expected: &'static str, found: &'static str },

    #[error("buffer too small for {what}: need {required}, got {actual}")]
    BufferTooSmall { what: &'static str, required: usize, actual: usize },

    #[error("invalid convolution geometry: {reason}")]
    InvalidGeometry { reason: String },
}

/// Errors raised while deriving requantization parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantizationError {
    #[error("requantization scale must be finite and positive, got {scale}")]
    InvalidScale { scale: f32 },

    #[error("output range is empty: min {min} > max {max}")]
    InvalidRange { min: u8, max: u8 },

    #[error("requantization scale {scale} outside the supported range [{min}, {max})")]
    ScaleOutOfRange { scale: f32, min: f32, max: f32 },
}

/// Errors reported by the conformance harness when a kernel disagrees with
/// the reference computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "at {row}, {col}: reference = {expected} (accumulator = {accumulator}), optimized = {actual}, {context}"
    )]
    Mismatch {
        row: usize,
        col: usize,
        expected: u8,
        actual: u8,
        accumulator: i32,
        context: String,
    },

    #[error("at {row}, {col}: output {value} outside [{min}, {max}], {context}")]
    OutOfRange { row: usize, col: usize, value: u8, min: u8, max: u8, context: String },
}

pub type Result<T> = std::result::Result<T, IgemmError>;
