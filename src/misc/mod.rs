//! Random utilities
mod func;
mod linalg;

pub use func::*;
pub use linalg::*;
