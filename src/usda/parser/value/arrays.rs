use anyhow::{bail, Context, Result};

use crate::usda::token::Token;

/// Delimited sequence parsing.
impl<'a> super::super::Parser<'a> {
    /// Generic array parser that delegates element parsing while handling delimiters.
    ///
    /// A trailing comma before `]` is accepted.
    pub(in crate::usda::parser) fn parse_array_fn(
        &mut self,
        mut read_element: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.ensure_pun('[').context("Array must start with [")?;

        let mut index = 0;
        loop {
            if self.eat_pun(']')? {
                break;
            }

            read_element(self).with_context(|| format!("Unable to read array element {index}"))?;
            index += 1;

            match self.fetch_next()? {
                Token::Punctuation(',') => continue,
                Token::Punctuation(']') => break,
                t => bail!("Either comma or closing bracket expected after value, got: {t:?}"),
            }
        }
        Ok(())
    }

    /// Parse delimiter-separated sequences like `(a, b)` or `(offset = ...; scale = ...)`.
    ///
    /// Both `,` and `;` separate elements; `delim` names the one callers expect,
    /// the other is tolerated since layer-offset blocks appear with either.
    pub(in crate::usda::parser) fn parse_seq_fn(
        &mut self,
        delim: char,
        mut read_element: impl FnMut(&mut Self, usize) -> Result<()>,
    ) -> Result<()> {
        self.ensure_pun('(').context("Open parenthesis expected")?;

        let mut index = 0;
        loop {
            if self.eat_pun(')')? {
                break;
            }

            read_element(self, index).with_context(|| format!("Unable to read element {index}"))?;
            index += 1;

            match self.fetch_next()? {
                Token::Punctuation(')') => break,
                Token::Punctuation(d) if d == delim || d == ',' || d == ';' => continue,
                t => bail!("Unexpected token between (): {t:?}"),
            }
        }
        Ok(())
    }

    /// Parse either `[item, ...]` or a single bare item.
    pub(in crate::usda::parser) fn parse_one_or_many<T>(
        &mut self,
        mut read_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        if self.is_next(Token::None) {
            self.fetch_next()?;
            return Ok(Vec::new());
        }

        if !self.is_next_pun('[') {
            return Ok(vec![read_item(self)?]);
        }

        let mut out = Vec::new();
        self.parse_array_fn(|this| {
            out.push(read_item(this)?);
            Ok(())
        })?;
        Ok(out)
    }
}
