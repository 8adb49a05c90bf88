#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_panics_doc, clippy::module_name_repetitions)]
//#![warn(clippy::cargo)]

//! Manipulation of quantified Boolean formulas: an immutable formula
//! algebra, negation and prenex normal form transformations, and codecs
//! for the QDIMACS and QCIR file formats.

pub mod cli;
pub mod formula;
pub mod nnf;
pub mod prenex;
pub mod qcir;
pub mod qdimacs;
mod quantifier;
pub mod rewrite;

// Re-export
pub use formula::{Formula, InvalidStructure, VarName};
pub use quantifier::QuantTy;
