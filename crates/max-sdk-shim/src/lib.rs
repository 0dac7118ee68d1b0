//! Header composition for the Cycling '74 Max SDK.
//!
//! The SDK ships three header trees (Max, MSP and Jitter) that cannot be
//! handed to bindgen as-is: some types are assumed to come from the
//! platform SDK, a few preprocessor switches must be flipped while one tree
//! is parsed, and the trees depend on each other in a fixed order. This
//! crate turns an explicit [`ShimConfig`] into a single [`CompositionUnit`]
//! that bindgen can parse deterministically, and can lint existing wrapper
//! headers for leaked scope symbols.

mod bindgen_plan;
mod compose;
mod config;
mod discover;
mod error;
mod headers;
mod lint;
mod predecl;
mod scope;

pub use bindgen_plan::*;
pub use compose::*;
pub use config::*;
pub use discover::*;
pub use error::*;
pub use headers::*;
pub use lint::*;
pub use predecl::*;
pub use scope::*;
