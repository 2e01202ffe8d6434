//! Pre-flight structural check for raw AQL text
//!
//! This is a heuristic, not a parser. It catches truncated or corrupted
//! queries cheaply; it can also reject valid queries whose string literals
//! contain unpaired brackets, `,,` or `{{`.

use super::{DOMAINS, QueryError};

/// Validate caller-supplied query text
///
/// # Errors
///
/// Returns the first structural problem found.
pub fn validate_aql_query(query: &str) -> Result<(), QueryError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryError::Empty);
    }

    let Some((domain, _)) = query.split_once(".find(") else {
        return Err(QueryError::MissingFind);
    };
    if !DOMAINS.contains(&domain) {
        return Err(QueryError::InvalidDomain(domain.to_string()));
    }

    check_balance(query)?;

    if query.contains(",,") {
        return Err(QueryError::DoubleComma);
    }
    if query.contains("{{") {
        return Err(QueryError::DoubleBrace);
    }
    Ok(())
}

fn check_balance(query: &str) -> Result<(), QueryError> {
    let mut stack = Vec::new();
    for (pos, c) in query.char_indices() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some(open) if open == expected => {}
                    Some(open) => {
                        return Err(QueryError::Unbalanced(format!(
                            "brackets: '{open}' closed by '{c}' at position {pos}"
                        )));
                    }
                    None => {
                        return Err(QueryError::Unbalanced(format!(
                            "brackets: unexpected '{c}' at position {pos}"
                        )));
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(QueryError::Unbalanced(format!(
            "brackets: {} unclosed, innermost '{open}'",
            stack.len()
        )));
    }
    Ok(())
}
