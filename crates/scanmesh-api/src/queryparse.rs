//! Shodan-like mini-DSL tokenizer for the `q` query-service parameter.
//! Grounded on `query/queryparse.go`'s `parseShodanLikeQuery` /
//! `parseNumericRange`.

use std::collections::HashMap;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedQuery {
    pub field_terms: HashMap<String, Vec<String>>,
    pub free_terms: Vec<String>,
    pub not_field_terms: HashMap<String, Vec<String>>,
}

/// A `port:value` token's value, after `parseNumericRange`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortRange {
    Single(u16),
    Range(u16, u16),
}

pub fn parse_numeric_range(value: &str) -> Option<PortRange> {
    match value.split_once('-') {
        Some((lo, hi)) => {
            let lo: u16 = lo.parse().ok()?;
            let hi: u16 = hi.parse().ok()?;
            Some(PortRange::Range(lo, hi))
        }
        None => value.parse().ok().map(PortRange::Single),
    }
}

/// Extracts quoted phrases into free terms first, then splits the
/// remainder on whitespace. A leading `-` negates a token; `field:value`
/// becomes a field term (or a negated field term, keyed the same way).
/// Bare negated tokens land under `not_field_terms["_free"]`.
pub fn parse_shodan_like_query(raw: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    let mut remainder = String::new();

    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            let phrase: String = chars.by_ref().take_while(|&c| c != '"').collect();
            if !phrase.is_empty() {
                parsed.free_terms.push(phrase);
            }
        } else {
            remainder.push(c);
        }
    }

    for token in remainder.split_whitespace() {
        let (negated, token) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if token.is_empty() {
            continue;
        }

        match token.split_once(':') {
            Some((field, value)) if !field.is_empty() => {
                let target = if negated { &mut parsed.not_field_terms } else { &mut parsed.field_terms };
                target.entry(field.to_string()).or_default().push(value.to_string());
            }
            _ => {
                if negated {
                    parsed.not_field_terms.entry("_free".to_string()).or_default().push(token.to_string());
                } else {
                    parsed.free_terms.push(token.to_string());
                }
            }
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_phrases_and_negation() {
        let parsed = parse_shodan_like_query(r#"country:US port:22 "openssh 8.4" -ubuntu"#);
        assert_eq!(parsed.field_terms.get("country"), Some(&vec!["US".to_string()]));
        assert_eq!(parsed.field_terms.get("port"), Some(&vec!["22".to_string()]));
        assert_eq!(parsed.free_terms, vec!["openssh 8.4".to_string()]);
        assert_eq!(parsed.not_field_terms.get("_free"), Some(&vec!["ubuntu".to_string()]));
    }

    #[test]
    fn parses_single_port() {
        assert_eq!(parse_numeric_range("22"), Some(PortRange::Single(22)));
    }

    #[test]
    fn parses_port_range() {
        assert_eq!(parse_numeric_range("80-90"), Some(PortRange::Range(80, 90)));
    }

    #[test]
    fn rejects_garbage_range() {
        assert_eq!(parse_numeric_range("abc"), None);
    }

    #[test]
    fn negated_field_term() {
        let parsed = parse_shodan_like_query("-country:CN");
        assert_eq!(parsed.not_field_terms.get("country"), Some(&vec!["CN".to_string()]));
        assert!(parsed.field_terms.is_empty());
    }
}
