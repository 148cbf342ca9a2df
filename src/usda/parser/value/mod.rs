pub mod arrays;

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;

use crate::sdf;
use crate::usda::token::Token;

/// Value parsing.
///
/// Values are decoded structurally rather than against the declared type:
/// the walker only needs asset paths, strings and dictionaries, so numeric
/// tuples and matrices are kept as nested [`sdf::Value::Tuple`]s.
impl<'a> super::Parser<'a> {
    /// Decode any value: scalar, `[...]` array, `(...)` tuple or `{...}` dictionary.
    pub(super) fn parse_value(&mut self) -> Result<sdf::Value> {
        let next = self.peek_token()?;
        match next {
            Token::Punctuation('[') => {
                let mut items = Vec::new();
                self.parse_array_fn(|this| {
                    items.push(this.parse_value()?);
                    Ok(())
                })?;
                Ok(sdf::Value::Array(items))
            }
            Token::Punctuation('(') => {
                let mut items = Vec::new();
                self.parse_seq_fn(',', |this, _| {
                    items.push(this.parse_value()?);
                    Ok(())
                })?;
                Ok(sdf::Value::Tuple(items))
            }
            Token::Punctuation('{') => self.parse_dictionary(),
            _ => {
                let token = self.fetch_next()?;
                Self::scalar_value(token)
            }
        }
    }

    fn scalar_value(token: Token<'a>) -> Result<sdf::Value> {
        let value = match token {
            Token::String(s) => sdf::Value::String(s.to_owned()),
            Token::AssetRef(s) => sdf::Value::AssetPath(s.to_owned()),
            Token::PathRef(s) => sdf::Value::Path(s.to_owned()),
            Token::None => sdf::Value::None,
            Token::Identifier("true") => sdf::Value::Bool(true),
            Token::Identifier("false") => sdf::Value::Bool(false),
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => sdf::Value::Token(s.to_owned()),
            Token::Number(raw) => Self::number_value(raw)?,
            other => bail!("Unexpected token in value: {other:?}"),
        };
        Ok(value)
    }

    fn number_value(raw: &str) -> Result<sdf::Value> {
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(sdf::Value::Int(int));
        }
        raw.parse::<f64>()
            .map(sdf::Value::Double)
            .map_err(|_| anyhow!("Unable to parse number: {raw}"))
    }

    /// Parse a dictionary, or a time-sample map when keys are numbers.
    ///
    /// Dictionary entries read `[type] key = value`; time samples read
    /// `time: value`. Entries may be separated by `,`, `;` or nothing.
    pub(super) fn parse_dictionary(&mut self) -> Result<sdf::Value> {
        self.ensure_pun('{').context("Dictionary must start with {")?;

        if matches!(self.peek_next(), Some(Ok(Token::Number(_)))) {
            return self.parse_time_samples();
        }

        let mut dict = BTreeMap::new();
        loop {
            if self.eat_pun('}')? {
                break;
            }

            let first = self.fetch_next()?;
            let key = if self.is_next_pun('=') {
                Self::dictionary_key(&first)?
            } else {
                // `first` was a type name; the key follows it.
                let key_token = self.fetch_next()?;
                Self::dictionary_key(&key_token)?
            };

            self.ensure_pun('=')?;
            let value = self
                .parse_value()
                .with_context(|| format!("Unable to parse dictionary value for {key}"))?;
            dict.insert(key, value);

            if !self.eat_pun(',')? {
                self.eat_pun(';')?;
            }
        }

        Ok(sdf::Value::Dictionary(dict))
    }

    fn dictionary_key(token: &Token<'a>) -> Result<String> {
        match token {
            Token::String(s) => Ok((*s).to_owned()),
            other => Self::name_of(other)
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("Expected dictionary key, got: {other:?}")),
        }
    }

    /// Parse the body of `{ time: value, ... }` after the opening brace.
    fn parse_time_samples(&mut self) -> Result<sdf::Value> {
        let mut samples = Vec::new();

        loop {
            if self.eat_pun('}')? {
                break;
            }

            let time = match self.fetch_next()? {
                Token::Number(n) => n
                    .parse::<f64>()
                    .with_context(|| format!("Unable to parse time sample time: {n}"))?,
                other => bail!("Expected number for time sample time, got: {other:?}"),
            };
            self.ensure_pun(':').context("Expected ':' after time in time sample")?;
            samples.push((time, self.parse_value()?));

            self.eat_pun(',')?;
        }

        Ok(sdf::Value::TimeSamples(samples))
    }
}
