use anyhow::{anyhow, bail, ensure, Context, Result};

use crate::usda::token::{keyword_lexeme, Token};

type LexResult<'source> = std::result::Result<Token<'source>, ()>;

/// Token stream operations.
impl<'a> super::Parser<'a> {
    /// Fetch the next token from the stream and update the last span.
    #[inline]
    pub(super) fn fetch_next(&mut self) -> Result<Token<'a>> {
        let (token, span) = self.iter.next().context("Unexpected end of tokens")?;
        self.last_span = Some(span);
        token.map_err(|e| anyhow!("Logos error: {e:?}"))
    }

    /// Peek at the next token without consuming it.
    #[inline]
    pub(super) fn peek_next(&mut self) -> Option<&LexResult<'a>> {
        self.iter.peek().map(|(token, _)| token)
    }

    /// Peek at the next token, failing on end of input or a lexer error.
    pub(super) fn peek_token(&mut self) -> Result<Token<'a>> {
        match self.iter.peek() {
            Some((Ok(token), _)) => Ok(token.clone()),
            Some((Err(_), span)) => {
                self.last_span = Some(span.clone());
                bail!("Unrecognized input")
            }
            None => bail!("Unexpected end of tokens"),
        }
    }

    /// Check if the next token matches the expected token.
    #[inline]
    pub(super) fn is_next(&mut self, expected: Token) -> bool {
        matches!(self.peek_next(), Some(Ok(t)) if *t == expected)
    }

    /// Check if the next token is the given punctuation character.
    #[inline]
    pub(super) fn is_next_pun(&mut self, value: char) -> bool {
        self.is_next(Token::Punctuation(value))
    }

    /// Consume the next token if it is the given punctuation character.
    pub(super) fn eat_pun(&mut self, value: char) -> Result<bool> {
        if self.is_next_pun(value) {
            self.fetch_next()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Ensure the next token matches the expected token and consume it.
    pub(super) fn ensure_next(&mut self, expected_token: Token) -> Result<()> {
        let token = self.fetch_next()?;
        ensure!(
            token == expected_token,
            "Unexpected token (want: {expected_token:?}, got {token:?})"
        );
        Ok(())
    }

    /// Ensure the next token is a specific punctuation character.
    #[inline]
    pub(super) fn ensure_pun(&mut self, value: char) -> Result<()> {
        self.ensure_next(Token::Punctuation(value))
            .with_context(|| format!("'{value}' expected"))
    }

    /// Fetch the next token and ensure it's a string.
    pub(super) fn fetch_str(&mut self) -> Result<&'a str> {
        let token = self.fetch_next()?;
        token
            .clone()
            .try_as_string()
            .ok_or_else(|| anyhow!("Unexpected token {token:?} (want String)"))
    }

    /// Fetch a property, metadata or dictionary key name.
    ///
    /// Keywords are accepted as names, since `kind`-style keys and attribute
    /// names may collide with them.
    pub(super) fn fetch_name(&mut self) -> Result<&'a str> {
        let token = self.fetch_next()?;
        Self::name_of(&token).ok_or_else(|| anyhow!("Name expected, got {token:?}"))
    }

    pub(super) fn name_of(token: &Token<'a>) -> Option<&'a str> {
        match token {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => Some(*s),
            other => keyword_lexeme(other),
        }
    }

    /// Consume a list-op prefix (`prepend`, `append`, ...) if one is next.
    pub(super) fn fetch_list_op(&mut self) -> Result<Option<Token<'a>>> {
        match self.peek_next() {
            Some(Ok(Token::Add | Token::Append | Token::Prepend | Token::Delete | Token::Reorder)) => {
                Ok(Some(self.fetch_next()?))
            }
            _ => Ok(None),
        }
    }
}
