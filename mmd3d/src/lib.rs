//! Pure Rust loader and pose solver for MMD assets: PMX models and VMD
//! motions (unofficial).
//!
//! This crate is renderer-agnostic. Per frame it produces a bone matrix
//! palette and a deformed vertex buffer; shaders, windowing, and the concrete
//! rigid-body engine live elsewhere (the latter behind
//! [`PhysicsEngine`]).

#![forbid(unsafe_code)]

mod curve;
mod error;
mod model;
mod pmx;
mod reader;
mod runtime;
mod vmd;

pub use error::*;
pub use model::*;
pub use reader::{IndexWidth, TextEncoding};
pub use runtime::*;




#[cfg(test)]
mod curve_tests;
