//! Whitespace-token scanner for the text streams this crate parses:
//! checkpoint headers and manual grid files.
//!
//! The scanner is deliberately dumb — tokens are maximal non-whitespace
//! runs, except for [`next_balanced`](Tokens::next_balanced), which
//! consumes a parenthesized group (boxes and index vectors embed spaces).
//! Every failure names the stream kind and what was being read, so a
//! malformed checkpoint aborts with a usable diagnostic.

use std::fmt::Display;
use std::str::FromStr;

use crate::amr_error::AmrError;

#[derive(Debug)]
pub struct Tokens<'a> {
    rest: &'a str,
    kind: &'static str,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str, kind: &'static str) -> Self {
        Tokens { rest: text, kind }
    }

    fn err(&self, detail: String) -> AmrError {
        AmrError::HeaderParse {
            source_kind: self.kind,
            detail,
        }
    }

    /// Consume and return the rest of the current line (possibly empty),
    /// without its terminator.
    pub fn next_line(&mut self) -> &'a str {
        match self.rest.find('\n') {
            Some(i) => {
                let line = self.rest[..i].trim_end_matches('\r');
                self.rest = &self.rest[i + 1..];
                line
            }
            None => std::mem::take(&mut self.rest),
        }
    }

    /// Next whitespace-delimited token.
    pub fn next_token(&mut self) -> Result<&'a str, AmrError> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return Err(self.err("unexpected end of stream".into()));
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let tok = &self.rest[..end];
        self.rest = &self.rest[end..];
        Ok(tok)
    }

    /// Parse the next token as `T`, naming `what` on failure.
    pub fn next<T>(&mut self, what: &str) -> Result<T, AmrError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let tok = self
            .next_token()
            .map_err(|_| self.err(format!("unexpected end of stream reading {what}")))?;
        tok.parse::<T>()
            .map_err(|e| self.err(format!("bad {what} `{tok}`: {e}")))
    }

    /// Consume one parenthesized group, spaces and all, e.g. a box
    /// `((0,0,0) (63,63,63) (0,0,0))`.
    pub fn next_balanced(&mut self) -> Result<&'a str, AmrError> {
        self.rest = self.rest.trim_start();
        if !self.rest.starts_with('(') {
            let head: String = self.rest.chars().take(16).collect();
            return Err(self.err(format!("expected `(`, found `{head}`")));
        }
        let mut depth = 0usize;
        for (i, c) in self.rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let group = &self.rest[..=i];
                        self.rest = &self.rest[i + 1..];
                        return Ok(group);
                    }
                }
                _ => {}
            }
        }
        Err(self.err("unbalanced parentheses".into()))
    }

    /// True when only whitespace remains.
    pub fn is_exhausted(&self) -> bool {
        self.rest.trim_start().is_empty()
    }
}
