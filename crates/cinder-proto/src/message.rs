//! Inbound line tokenization.
//!
//! A line is split into at most [`MAX_PARAMS`] + 1 fields: the command and
//! its parameters. A parameter beginning with `:` (other than the first
//! token) consumes the remainder of the line verbatim, spaces included.
//! An optional `:prefix` before the command names the message source.

use thiserror::Error;

/// Maximum serialized line length, CR-LF included.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum number of parameters after the command.
pub const MAX_PARAMS: usize = 15;

/// Tokenization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("line exceeds {MAX_LINE_LEN} bytes")]
    TooLong,
}

/// One tokenized inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Source prefix without the leading `:`, if present.
    pub prefix: Option<String>,
    /// Command token as received (not folded).
    pub command: String,
    /// Parameters; a trailing parameter keeps its internal spaces.
    pub params: Vec<String>,
}

impl Line {
    /// Tokenize one raw line. The terminating CR-LF, if still present, is
    /// stripped first. Parameters beyond [`MAX_PARAMS`] are folded into the
    /// final one.
    pub fn parse(raw: &str) -> Result<Line, ParseError> {
        if raw.len() > MAX_LINE_LEN {
            return Err(ParseError::TooLong);
        }
        let mut rest = raw.trim_end_matches(['\r', '\n']);

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (pfx, tail) = match stripped.split_once(' ') {
                Some((p, t)) => (p, t),
                None => (stripped, ""),
            };
            rest = tail;
            Some(pfx.to_string())
        } else {
            None
        };

        rest = rest.trim_start_matches(' ');
        let (command, mut tail) = match rest.split_once(' ') {
            Some((c, t)) => (c, t),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut params = Vec::new();
        loop {
            tail = tail.trim_start_matches(' ');
            if tail.is_empty() {
                break;
            }
            if let Some(trailing) = tail.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            if params.len() == MAX_PARAMS - 1 {
                // Field budget exhausted: the remainder is one parameter.
                params.push(tail.to_string());
                break;
            }
            match tail.split_once(' ') {
                Some((word, t)) => {
                    params.push(word.to_string());
                    tail = t;
                }
                None => {
                    params.push(tail.to_string());
                    break;
                }
            }
        }

        Ok(Line {
            prefix,
            command: command.to_string(),
            params,
        })
    }
}

/// Clamp rendered content to what fits on one line before CR-LF.
///
/// Truncation is byte-oriented but never splits a UTF-8 sequence.
pub fn clamp_content(text: &mut String) {
    let max = MAX_LINE_LEN - 2;
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_command() {
        let l = Line::parse("QUIT\r\n").unwrap();
        assert_eq!(l.command, "QUIT");
        assert!(l.prefix.is_none());
        assert!(l.params.is_empty());
    }

    #[test]
    fn parses_middle_and_trailing() {
        let l = Line::parse("PRIVMSG #chan :hello  world").unwrap();
        assert_eq!(l.command, "PRIVMSG");
        assert_eq!(l.params, vec!["#chan", "hello  world"]);
    }

    #[test]
    fn parses_prefix() {
        let l = Line::parse(":irc.example.net PING :token").unwrap();
        assert_eq!(l.prefix.as_deref(), Some("irc.example.net"));
        assert_eq!(l.command, "PING");
        assert_eq!(l.params, vec!["token"]);
    }

    #[test]
    fn trailing_preserves_leading_space_content() {
        let l = Line::parse("TOPIC #c : spaced out ").unwrap();
        assert_eq!(l.params[1], " spaced out ");
    }

    #[test]
    fn field_budget_collapses_overflow() {
        let raw = format!("CMD {}", (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(" "));
        let l = Line::parse(&raw).unwrap();
        assert_eq!(l.params.len(), MAX_PARAMS);
        assert!(l.params[MAX_PARAMS - 1].contains("19"));
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert_eq!(Line::parse("   \r\n").unwrap_err(), ParseError::Empty);
        let long = "A".repeat(MAX_LINE_LEN + 1);
        assert_eq!(Line::parse(&long).unwrap_err(), ParseError::TooLong);
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let mut s = "x".repeat(509);
        s.push('é'); // lands across the 510-byte cut
        clamp_content(&mut s);
        assert!(s.len() <= 510);
        assert!(s.is_char_boundary(s.len()));
    }
}
