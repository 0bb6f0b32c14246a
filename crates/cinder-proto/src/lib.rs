//! Wire-level IRC primitives shared by the cinderd core.
//!
//! This crate is deliberately small: a line parser bounded by the RFC 1459
//! field rules, the scandinavian case mapping used for every nickname and
//! channel lookup, numeric reply constants, and identifier validation.

pub mod casemap;
pub mod message;
pub mod numeric;
pub mod validate;

pub use casemap::{fold, fold_char, fold_eq};
pub use message::{Line, ParseError, MAX_LINE_LEN, MAX_PARAMS};
pub use validate::{is_valid_channel_name, is_valid_nick};

/// Hard cap on a serialized line: 510 content bytes plus CR-LF.
pub const MAX_CONTENT_LEN: usize = MAX_LINE_LEN - 2;
