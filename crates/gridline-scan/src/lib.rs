//! Gridline Scan - Source enumeration and design-token extraction
//!
//! A [`SourceTree`] yields [`SourceUnit`]s (from disk via [`FsTree`] or from
//! memory via [`MemoryTree`]); the [`TokenExtractor`] turns each unit into a
//! [`TokenSet`] of size, weight, spacing, color-role, component and
//! accessibility tokens.

mod extractor;
mod source;
mod token;

pub use extractor::TokenExtractor;
pub use source::{FsTree, LoadedTree, MemoryTree, SourceTree, SourceUnit, UnreadableFile};
pub use token::{
    spacing_px, InteractiveElement, SkippedSpan, Token, TokenKind, TokenSet, LOCAL_NAMESPACE,
    SPREAD_ATTRIBUTE,
};
