//! Repository walking and file classification.
//!
//! Discovers the files under a root that should be indexed, classifies each
//! one as doc or code by extension, and maps code extensions to tree-sitter
//! grammars for syntax-aware chunking. Uses the `ignore` crate for walking.

pub mod language;
pub mod walker;

pub use language::Language;
pub use walker::{read_source, walk_tree, SourceEntry};
