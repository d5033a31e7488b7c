//! # Task Reader
//!
//! Whitespace-tokenised reader over the textual task format.
//!
//! Every section of the input is framed by literal magic words
//! (`begin_variables`, `end_state`, ...). The reader validates them before
//! anything else is parsed, like a file header, and reports the first
//! mismatch as a [`TempusError::Parse`].

use crate::TempusError;
use std::str::FromStr;

/// Cursor over a task text.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TokenReader<'a> {
    /// Create a reader positioned at the start of `input`.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// True when only whitespace is left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.input[self.pos..].trim_start().is_empty()
    }

    /// Read the next whitespace-delimited token.
    pub fn next_token(&mut self) -> Result<&'a str, TempusError> {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return Err(TempusError::Parse("unexpected end of input".to_string()));
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.pos += end;
        Ok(&rest[..end])
    }

    /// Read the next token and parse it as `T`.
    pub fn parse<T: FromStr>(&mut self) -> Result<T, TempusError> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| TempusError::Parse(format!("unparsable token '{}'", token)))
    }

    /// Read a non-negative count or table index.
    pub fn read_usize(&mut self) -> Result<usize, TempusError> {
        self.parse()
    }

    /// Read a signed integer, where `-1` usually means "none".
    pub fn read_i32(&mut self) -> Result<i32, TempusError> {
        self.parse()
    }

    /// Read a real value.
    pub fn read_f64(&mut self) -> Result<f64, TempusError> {
        self.parse()
    }

    /// Read an index that must lie below `bound`.
    pub fn read_index(&mut self, bound: usize, what: &str) -> Result<usize, TempusError> {
        let index = self.read_usize()?;
        if index >= bound {
            return Err(TempusError::Parse(format!(
                "{} index {} out of range (limit {})",
                what, index, bound
            )));
        }
        Ok(index)
    }

    /// Read an index where `-1` stands for "none".
    pub fn read_optional_index(
        &mut self,
        bound: usize,
        what: &str,
    ) -> Result<Option<usize>, TempusError> {
        let raw = self.read_i32()?;
        if raw == -1 {
            return Ok(None);
        }
        let index = usize::try_from(raw)
            .map_err(|_| TempusError::Parse(format!("negative {} index {}", what, raw)))?;
        if index >= bound {
            return Err(TempusError::Parse(format!(
                "{} index {} out of range (limit {})",
                what, index, bound
            )));
        }
        Ok(Some(index))
    }

    /// Read a `0`/`1` flag.
    pub fn read_bool(&mut self) -> Result<bool, TempusError> {
        match self.next_token()? {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(TempusError::Parse(format!(
                "expected boolean flag, read '{}'",
                other
            ))),
        }
    }

    /// Consume the given magic word or fail.
    pub fn expect_magic(&mut self, magic: &str) -> Result<(), TempusError> {
        let token = self.next_token().map_err(|_| {
            TempusError::Parse(format!(
                "Failed to match magic word '{}'. Got end of input.",
                magic
            ))
        })?;
        if token != magic {
            return Err(TempusError::Parse(format!(
                "Failed to match magic word '{}'. Got '{}'.",
                magic, token
            )));
        }
        Ok(())
    }

    /// Skip leading whitespace, then read everything up to the end of the line.
    pub fn rest_of_line(&mut self) -> Result<&'a str, TempusError> {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return Err(TempusError::Parse("unexpected end of input".to_string()));
        }
        let end = rest.find('\n').unwrap_or(rest.len());
        self.pos += end;
        Ok(rest[..end].trim_end())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_span_lines() {
        let mut reader = TokenReader::new("  begin_goal\n1\n 0 1\nend_goal ");
        assert!(reader.expect_magic("begin_goal").is_ok());
        assert_eq!(reader.read_usize(), Ok(1));
        assert_eq!(reader.read_index(2, "variable"), Ok(0));
        assert_eq!(reader.read_f64(), Ok(1.0));
        assert!(reader.expect_magic("end_goal").is_ok());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn magic_mismatch_names_both_words() {
        let mut reader = TokenReader::new("begin_stat");
        let err = reader
            .expect_magic("begin_state")
            .expect_err("mismatch");
        assert_eq!(
            err,
            TempusError::Parse("Failed to match magic word 'begin_state'. Got 'begin_stat'.".into())
        );
    }

    #[test]
    fn rest_of_line_keeps_inner_spaces() {
        let mut reader = TokenReader::new("begin_operator\ndrive truck1 a b\n= 3\n");
        assert!(reader.expect_magic("begin_operator").is_ok());
        assert_eq!(reader.rest_of_line(), Ok("drive truck1 a b"));
        assert_eq!(reader.next_token(), Ok("="));
    }

    #[test]
    fn optional_index_and_bounds() {
        let mut reader = TokenReader::new("-1 2 5");
        assert_eq!(reader.read_optional_index(3, "variable"), Ok(None));
        assert_eq!(reader.read_optional_index(3, "variable"), Ok(Some(2)));
        assert!(reader.read_index(3, "variable").is_err());
    }

    #[test]
    fn bool_and_end_of_input() {
        let mut reader = TokenReader::new("1 x");
        assert_eq!(reader.read_bool(), Ok(true));
        assert!(reader.read_bool().is_err());
        assert!(reader.next_token().is_err());
    }
}
