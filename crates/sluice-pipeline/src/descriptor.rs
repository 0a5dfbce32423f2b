//! Descriptor tokenizer.
//!
//! A descriptor is the string bound to a node input, e.g. `"{Root}/{Item}.bak"`.
//! `{name}` marks a placeholder; `{{` and `}}` stand for literal braces.

use sluice_types::{Result, SluiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Variable(String),
}

/// Placeholder and literal counts of a token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub variables: usize,
    pub literals: usize,
}

pub fn shape(tokens: &[Token]) -> Shape {
    let variables = tokens
        .iter()
        .filter(|t| matches!(t, Token::Variable(_)))
        .count();
    Shape {
        variables,
        literals: tokens.len() - variables,
    }
}

/// Split a descriptor into literal and placeholder tokens. Literal tokens are
/// never empty.
pub fn tokenize(descriptor: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = descriptor.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let name = read_placeholder(descriptor, offset, &mut chars)?;
                tokens.push(Token::Variable(name));
            }
            // A lone closing brace outside a placeholder is plain text.
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn read_placeholder(
    descriptor: &str,
    start: usize,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<String> {
    let mut name = String::new();
    for (offset, c) in chars.by_ref() {
        match c {
            '}' => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(malformed(descriptor, start, "empty placeholder"));
                }
                return Ok(name.to_string());
            }
            '{' => return Err(malformed(descriptor, offset, "nested '{' inside placeholder")),
            other => name.push(other),
        }
    }
    Err(malformed(descriptor, start, "unterminated placeholder"))
}

fn malformed(descriptor: &str, offset: usize, message: &str) -> SluiceError {
    SluiceError::MalformedDescriptor {
        descriptor: descriptor.to_string(),
        offset,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Token {
        Token::Literal(s.into())
    }

    fn var(s: &str) -> Token {
        Token::Variable(s.into())
    }

    #[test]
    fn empty_descriptor_has_no_tokens() {
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn mixed_template() {
        let tokens = tokenize("{a}-{b}.txt").unwrap();
        assert_eq!(tokens, vec![var("a"), lit("-"), var("b"), lit(".txt")]);
        assert_eq!(
            shape(&tokens),
            Shape {
                variables: 2,
                literals: 2
            }
        );
    }

    #[test]
    fn bare_variable_trims_whitespace() {
        assert_eq!(tokenize("{ Item }").unwrap(), vec![var("Item")]);
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(tokenize("{{x}}").unwrap(), vec![lit("{x}")]);
        assert_eq!(tokenize("a{{{b}").unwrap(), vec![lit("a{"), var("b")]);
    }

    #[test]
    fn backslashes_pass_through() {
        assert_eq!(
            tokenize(r"C:\in\{Item}").unwrap(),
            vec![lit(r"C:\in\"), var("Item")]
        );
    }

    #[test]
    fn stray_closing_brace_is_literal() {
        assert_eq!(tokenize("a}b").unwrap(), vec![lit("a}b")]);
    }

    #[test]
    fn unterminated_placeholder_fails() {
        let err = tokenize("abc{def").unwrap_err();
        match err {
            SluiceError::MalformedDescriptor { offset, message, .. } => {
                assert_eq!(offset, 3);
                assert!(message.contains("unterminated"));
            }
            other => panic!("expected MalformedDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn nested_placeholder_fails() {
        let err = tokenize("{a{b}}").unwrap_err();
        assert_eq!(err.result_code(), sluice_types::codes::UNRESOLVABLE);
    }

    #[test]
    fn empty_placeholder_fails() {
        assert!(tokenize("x{ }").is_err());
    }
}
