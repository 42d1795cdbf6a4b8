//! Command builder.
//!
//! Turns an [`Operation`] and its named parameters into an [`ArgumentVector`]:
//! the subcommand followed by `key=value` tokens. Every value becomes exactly
//! one argv entry and is never passed through a shell, so no character in a
//! filename, label or description can split or add tokens.

use crate::catalog::{Operation, ParamSpec, Token};
use crate::error::{Error, Result};
use crate::types::{Params, is_valid_param_name};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered argument tokens for one xe invocation, subcommand first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    #[cfg(test)]
    pub(crate) fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// The xe subcommand.
    pub fn subcommand(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// All tokens, subcommand included.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ArgumentVector {
    /// Shell-quoted rendering for logs and dry runs. Never executed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|t| quote_for_display(t)).collect();
        f.write_str(&rendered.join(" "))
    }
}

fn quote_for_display(token: &str) -> String {
    let plain = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=:./,@+".contains(c));
    if plain && !token.is_empty() {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// Build the argument vector for `operation` from `params`.
///
/// Fails with [`Error::Validation`] when a required parameter is missing or
/// empty, when a parameter is not accepted by the operation, when a value
/// contains a NUL byte, or when a value used as a key is not a valid
/// parameter name.
pub fn build(operation: &Operation, params: &Params) -> Result<ArgumentVector> {
    for name in params.keys() {
        if operation.param(name).is_none() {
            return Err(Error::validation(
                operation.name,
                name,
                "not accepted by this operation",
            ));
        }
    }

    let mut tokens = vec![operation.subcommand.to_string()];

    for spec in operation.required {
        let value = match params.get(spec.name) {
            Some(v) if !v.trim().is_empty() => v,
            Some(_) => return Err(Error::validation(operation.name, spec.name, "is empty")),
            None => return Err(Error::validation(operation.name, spec.name, "is required")),
        };
        push_token(operation, spec, value, params, &mut tokens)?;
    }

    for spec in operation.optional {
        if let Some(value) = params.get(spec.name).filter(|v| !v.trim().is_empty()) {
            push_token(operation, spec, value, params, &mut tokens)?;
        }
    }

    tokens.extend(operation.fixed.iter().map(|t| (*t).to_string()));

    log::trace!("{}: built {} tokens", operation.name, tokens.len());
    Ok(ArgumentVector(tokens))
}

fn push_token(
    operation: &Operation,
    spec: &ParamSpec,
    value: &str,
    params: &Params,
    tokens: &mut Vec<String>,
) -> Result<()> {
    if value.contains('\0') {
        return Err(Error::validation(
            operation.name,
            spec.name,
            "contains a NUL byte",
        ));
    }

    match spec.token {
        Token::Keyed(key) => tokens.push(format!("{key}={value}")),
        Token::KeyedBy(key_param) => {
            let key = params
                .get(key_param)
                .ok_or_else(|| Error::validation(operation.name, key_param, "is required"))?;
            tokens.push(format!("{key}={value}"));
        }
        Token::KeyOnly => {
            if !is_valid_param_name(value) {
                return Err(Error::validation(
                    operation.name,
                    spec.name,
                    format!("`{value}` is not a valid parameter name"),
                ));
            }
        }
    }
    Ok(())
}
