use crate::core::errors::{Result, StackerError};

/// A piece of a variable value: literal text or a `${type argument}` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Lookup {
        lookup_type: String,
        argument: String,
    },
}

/// Split `value` into literal text and lookups.
///
/// `${` must always be closed by `}`; the lookup type is the first word and
/// everything after it (trimmed) is the argument.
pub fn tokenize(value: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            tokens.push(Token::Literal(rest[..start].to_string()));
        }
        let inner_start = start + 2;
        let end = rest[inner_start..].find('}').ok_or_else(|| {
            StackerError::lookup("parse", format!("unterminated lookup in '{value}'"))
        })?;
        let inner = rest[inner_start..inner_start + end].trim();

        let (lookup_type, argument) = match inner.split_once(char::is_whitespace) {
            Some((t, a)) => (t, a.trim()),
            None => (inner, ""),
        };
        if lookup_type.is_empty() {
            return Err(StackerError::lookup(
                "parse",
                format!("empty lookup in '{value}'"),
            ));
        }
        tokens.push(Token::Lookup {
            lookup_type: lookup_type.to_string(),
            argument: argument.to_string(),
        });

        rest = &rest[inner_start + end + 1..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Literal(rest.to_string()));
    }
    Ok(tokens)
}

/// Split an `output` lookup argument, `stack::OutputName`.
pub fn split_output_argument(argument: &str) -> Result<(&str, &str)> {
    match argument.split_once("::") {
        Some((stack, key)) if !stack.trim().is_empty() && !key.trim().is_empty() => {
            Ok((stack.trim(), key.trim()))
        }
        _ => Err(StackerError::lookup(
            "output",
            format!("expected 'stack::OutputName', got '{argument}'"),
        )),
    }
}

/// Names of the stacks referenced by `output` lookups in `value`, in order
/// of appearance and without duplicates.
pub fn extract_output_dependencies(value: &str) -> Result<Vec<String>> {
    let mut stacks: Vec<String> = Vec::new();
    for token in tokenize(value)? {
        if let Token::Lookup {
            lookup_type,
            argument,
        } = token
        {
            if lookup_type == "output" {
                let (stack, _) = split_output_argument(&argument)?;
                if !stacks.iter().any(|s| s == stack) {
                    stacks.push(stack.to_string());
                }
            }
        }
    }
    Ok(stacks)
}
