//! Schema assembly
//!
//! Merges an ordered tree of SQL fragment files into one canonical
//! document. Top-level entries participate only when their name starts
//! with a two-digit prefix and a hyphen (`01-tables`, `02-views.sql`);
//! everything below the top level is included regardless of naming, and
//! traversal is strictly lexicographic so the output is reproducible.

pub mod assembler;
pub mod walker;

pub use assembler::{BuildError, BuildSummary, SchemaAssembler, HEADER};
pub use walker::{Fragment, FragmentWalker, Fragments, WalkError, WalkOptions, TEST_SUFFIX};
