//! Path templates with named `:param` segments.
//!
//! `/users/:id` renders to `/users/42` for `id = "42"`. A trailing `?`
//! marks a parameter optional: `/files/:name?` renders to `/files` when
//! `name` is absent. Values are percent-encoded as URI components.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::TemplateError;

/// Characters escaped in a substituted value; everything a URI component
/// may not carry literally.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param {
        name: String,
        /// A `/` that belongs to an optional parameter and disappears with it.
        prefix: String,
        optional: bool,
    },
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pattern: String,
    tokens: Vec<Token>,
}

impl PathTemplate {
    pub fn compile(pattern: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            if c != ':' {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(&(_, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                return Err(TemplateError::MissingName { position });
            }

            let optional = chars.next_if(|&(_, next)| next == '?').is_some();
            let prefix = if optional && literal.ends_with('/') {
                literal.pop();
                "/".to_string()
            } else {
                String::new()
            };
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Token::Param {
                name,
                prefix,
                optional,
            });
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Declared parameter names, in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Param { name, .. } => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Substitutes `params` into the pattern.
    ///
    /// Parameters not named in the pattern are ignored.
    pub fn render(&self, params: Option<&HashMap<String, String>>) -> Result<String, TemplateError> {
        let mut path = String::with_capacity(self.pattern.len());

        for token in &self.tokens {
            match token {
                Token::Literal(text) => path.push_str(text),
                Token::Param {
                    name,
                    prefix,
                    optional,
                } => match params.and_then(|p| p.get(name)) {
                    Some(value) if !value.is_empty() => {
                        path.push_str(prefix);
                        path.extend(utf8_percent_encode(value, COMPONENT));
                    }
                    Some(_) if !optional => {
                        return Err(TemplateError::EmptyParam { name: name.clone() });
                    }
                    None if !optional => {
                        return Err(TemplateError::MissingParam { name: name.clone() });
                    }
                    _ => {}
                },
            }
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_named_segment() {
        let template = PathTemplate::compile("/users/:id").unwrap();
        let path = template.render(Some(&params(&[("id", "42")]))).unwrap();
        assert_eq!(path, "/users/42");
    }

    #[test]
    fn missing_required_param_fails() {
        let template = PathTemplate::compile("/users/:id").unwrap();
        assert_eq!(
            template.render(None).unwrap_err(),
            TemplateError::MissingParam { name: "id".into() }
        );
        assert_eq!(
            template.render(Some(&params(&[("other", "1")]))).unwrap_err(),
            TemplateError::MissingParam { name: "id".into() }
        );
    }

    #[test]
    fn empty_required_param_fails() {
        let template = PathTemplate::compile("/users/:id").unwrap();
        let err = template.render(Some(&params(&[("id", "")]))).unwrap_err();
        assert_eq!(err, TemplateError::EmptyParam { name: "id".into() });
    }

    #[test]
    fn literal_pattern_renders_unchanged() {
        let template = PathTemplate::compile("/health").unwrap();
        assert_eq!(template.render(None).unwrap(), "/health");
        assert_eq!(template.param_names().count(), 0);
    }

    #[test]
    fn multiple_params_and_suffix_text() {
        let template = PathTemplate::compile("/orgs/:org/repos/:repo.json").unwrap();
        let names: Vec<_> = template.param_names().collect();
        assert_eq!(names, vec!["org", "repo"]);

        let path = template
            .render(Some(&params(&[("org", "acme"), ("repo", "site")])))
            .unwrap();
        assert_eq!(path, "/orgs/acme/repos/site.json");
    }

    #[test]
    fn optional_param_drops_its_slash() {
        let template = PathTemplate::compile("/files/:name?").unwrap();
        assert_eq!(template.render(None).unwrap(), "/files");
        assert_eq!(
            template.render(Some(&params(&[("name", "a.txt")]))).unwrap(),
            "/files/a.txt"
        );
    }

    #[test]
    fn values_are_percent_encoded() {
        let template = PathTemplate::compile("/search/:term").unwrap();
        let path = template
            .render(Some(&params(&[("term", "hello world/ü")])))
            .unwrap();
        assert_eq!(path, "/search/hello%20world%2F%C3%BC");
    }

    #[test]
    fn colon_without_name_is_rejected() {
        let err = PathTemplate::compile("/users/:/posts").unwrap_err();
        assert_eq!(err, TemplateError::MissingName { position: 7 });
    }

    #[test]
    fn relative_pattern_is_kept() {
        let template = PathTemplate::compile("users/:id").unwrap();
        assert_eq!(template.pattern(), "users/:id");
        assert_eq!(
            template.render(Some(&params(&[("id", "7")]))).unwrap(),
            "users/7"
        );
    }
}
