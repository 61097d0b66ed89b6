//! Shared foundation for the Mesh toolchain: byte spans, line/column
//! mapping, and the diagnostic type every compiler pass renders through.
//!
//! Tokens and CST nodes carry byte offsets only. Line/column pairs are
//! computed on demand from a [`LineIndex`] built once per file.

pub mod diagnostics;
pub mod line_index;
pub mod span;

pub use diagnostics::{Diagnostic, Severity, suggest_similar};
pub use line_index::{LineCol, LineIndex};
pub use span::Span;
