//! Structural policy path
//!
//! A policy definition is a YAML tree mirroring the shape of the JSON it
//! checks. Scalars must match exactly, lists and maps require every entry to
//! hold, and `null` requires the value to be absent. The tree is compiled
//! once into a [`PolicyNode`] and evaluated in-process.

pub mod ast;
pub mod eval;
pub mod policy;

pub use ast::{compile, path_to_string, PathStep, PolicyNode, Scalar};
pub use eval::{evaluate, is_falsy, lookup, scalar_matches};
pub use policy::{PolicyDocument, PolicyMetadata, StructuralPolicy, ANY_TARGET};
