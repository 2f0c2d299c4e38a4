// URI templates (RFC 6570 level 1: simple `{var}` expansion)

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var(String),
}

/// A resource URI, possibly containing `{var}` placeholders.
///
/// A placeholder matches one or more characters up to the next `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|i| open + i) else {
                break;
            };
            let name = &rest[open + 1..close];
            if name.is_empty() {
                literal.push_str(&rest[..=close]);
            } else {
                literal.push_str(&rest[..open]);
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Var(name.to_string()));
            }
            rest = &rest[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Self {
            raw: raw.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template has at least one placeholder
    pub fn is_template(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Var(_)))
    }

    /// Match a concrete URI, returning the captured variables
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut captures = Vec::new();
        if match_parts(&self.parts, uri, &mut captures) {
            Some(captures.into_iter().collect())
        } else {
            None
        }
    }
}

fn match_parts(parts: &[Part], input: &str, captures: &mut Vec<(String, String)>) -> bool {
    match parts.split_first() {
        None => input.is_empty(),
        Some((Part::Literal(literal), rest)) => input
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_parts(rest, remaining, captures)),
        Some((Part::Var(name), rest)) => {
            let limit = input.find('/').unwrap_or(input.len());
            for end in (1..=limit).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                captures.push((name.clone(), input[..end].to_string()));
                if match_parts(rest, &input[end..], captures) {
                    return true;
                }
                captures.pop();
            }
            false
        }
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
