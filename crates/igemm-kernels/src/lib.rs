//! QU8 indirect GEMM microkernels
//!
//! This crate holds everything needed to run one of the quantized IGEMM
//! microkernels outside a full convolution operator: requantization
//! parameter init functions, weight packing, indirection buffer builders,
//! the kernels themselves and a registry describing each variant. The
//! reference requantizers the conformance harness compares against live here
//! too, next to the output stages they define.

pub mod indirection;
pub mod packing;
pub mod params;
pub mod registry;
pub mod requantization;
pub mod ukernels;

pub use indirection::{Conv2dGeometry, Conv2dIndirection, IndirectA, IndirectRow, conv2d_indirection};
pub use packing::{PackingParams, pack_qu8_conv_goki_w, packed_tile_size, packed_weights_size};
pub use params::{Qu8ConvMinmaxParams, Qu8InitParamsFn, Qu8QuantizationArgs};
pub use registry::{Qu8IgemmVariant, UkernelRegistry};
pub use requantization::{Qu8RequantizeFn, Requantization};
pub use ukernels::{Qu8IgemmUkernelFn, output_len};
