//! `{{ var }}` placeholder rendering for file content and adapter commands
//!
//! Supported forms:
//!
//! - `{{ name }}` substitutes a variable. Arrays are joined with `", "`.
//! - `{{ nameservers | join " " }}` joins an array with the given separator.
//!
//! Referencing a variable that is not defined is an error, so a typo in a
//! template fails the resource instead of writing an empty value.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Variables visible to a template
pub type Vars = BTreeMap<String, Value>;

const PLACEHOLDER: &str = r#"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|\s*join\s+"([^"]*)"\s*)?\}\}"#;
const DEFAULT_SEPARATOR: &str = ", ";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("undefined template variable '{0}'")]
    Undefined(String),

    #[error("template variable '{0}' is a table and cannot be rendered")]
    Table(String),

    #[error("invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Compiled placeholder renderer
#[derive(Debug, Clone)]
pub struct Renderer {
    pattern: Regex,
}

impl Renderer {
    pub fn new() -> Result<Self, TemplateError> {
        Ok(Self {
            pattern: Regex::new(PLACEHOLDER)?,
        })
    }

    /// Substitute every placeholder in `source`
    pub fn render(&self, source: &str, vars: &Vars) -> Result<String, TemplateError> {
        let mut failure = None;
        let rendered = self.pattern.replace_all(source, |caps: &Captures<'_>| {
            let name = &caps[1];
            let separator = caps.get(2).map_or(DEFAULT_SEPARATOR, |m| m.as_str());
            match vars.get(name) {
                Some(value) => match stringify(name, value, separator) {
                    Ok(text) => text,
                    Err(e) => {
                        failure.get_or_insert(e);
                        String::new()
                    }
                },
                None => {
                    failure.get_or_insert(TemplateError::Undefined(name.to_string()));
                    String::new()
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }
}

fn stringify(name: &str, value: &Value, separator: &str) -> Result<String, TemplateError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| stringify(name, item, separator))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(separator))
        }
        Value::Object(_) => Err(TemplateError::Table(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Vars {
        let mut vars = Vars::new();
        vars.insert("server".to_string(), json!("10.0.0.1"));
        vars.insert("port".to_string(), json!(25151));
        vars.insert("nameservers".to_string(), json!(["10.0.0.2", "10.0.0.3"]));
        vars.insert("manage_dhcp".to_string(), json!(true));
        vars
    }

    #[test]
    fn test_substitutes_scalars() {
        let r = Renderer::new().unwrap();
        let out = r
            .render("server: {{server}}\nport: {{ port }}\ndhcp: {{manage_dhcp}}", &vars())
            .unwrap();
        assert_eq!(out, "server: 10.0.0.1\nport: 25151\ndhcp: true");
    }

    #[test]
    fn test_joins_arrays() {
        let r = Renderer::new().unwrap();
        assert_eq!(
            r.render("{{ nameservers }}", &vars()).unwrap(),
            "10.0.0.2, 10.0.0.3"
        );
        assert_eq!(
            r.render(r#"nameserver {{ nameservers | join " " }}"#, &vars()).unwrap(),
            "nameserver 10.0.0.2 10.0.0.3"
        );
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let r = Renderer::new().unwrap();
        let err = r.render("{{ sever }}", &vars()).unwrap_err();
        assert!(matches!(err, TemplateError::Undefined(name) if name == "sever"));
    }

    #[test]
    fn test_text_without_placeholders_is_untouched() {
        let r = Renderer::new().unwrap();
        let text = "plain {braces} and { {not} } placeholders";
        assert_eq!(r.render(text, &vars()).unwrap(), text);
    }
}
