//! Mesh tokenizer.
//!
//! Byte stream in, token stream out. The lexer is a pure function of its
//! input: it never panics and never aborts on malformed source. Invalid
//! input degrades to `Error` tokens plus entries in the error list so the
//! parser can keep going.
//!
//! String interpolation is handled with a context stack: `${` inside a
//! string pushes an interpolation frame without popping the string frame,
//! so strings nest inside expressions inside strings to arbitrary depth.

mod lexer;
mod token;

pub use lexer::{Lexed, lex};
pub use token::{LexError, LexErrorKind, Token, TokenKind, keyword_kind};
