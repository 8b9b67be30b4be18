//! Toolkit for the bgen genotype-probability container format: codec,
//! sqlite-backed variant index, query planner, and transcoders, shared by
//! the `bgenix`, `cat-bgen`, and `edit-bgen` binaries.

pub mod bgen;
pub mod cli;
pub mod edit;
pub mod error;
pub mod index;
pub mod transcode;

pub use error::{BgenError, Result};
