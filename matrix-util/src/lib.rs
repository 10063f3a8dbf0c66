//! Dense, column-major matrix helpers shared across the workspace.
//!
//! Everything here works on `nalgebra::DMatrix`, whose storage is
//! column-major: element `(i, j)` of an `n x m` matrix sits at offset
//! `i + j * n` of `as_slice()`.

pub mod common_io;
pub mod dmatrix_io;
pub mod dmatrix_util;
pub mod traits;
