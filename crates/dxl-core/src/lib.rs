//! Shared types and utilities for the DXL normalization pipeline.
//!
//! This crate has no knowledge of DXL's XML syntax, attachment extraction,
//! or rendering; it only defines the [`ndoc::NDoc`] intermediate
//! representation that those phases pass between each other, plus the
//! pure hashing/filename helpers and error type they share.

pub mod error;
pub mod hash;
pub mod json;
pub mod ndoc;

pub use error::{DxlError, Result};
pub use ndoc::NDoc;
