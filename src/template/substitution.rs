//! Variable substitution engine for HTML templates

use serde_json::{Map, Value};

use super::types::{TemplateError, TemplateResult};

/// Substitute `{{variable}}` placeholders in an HTML template.
///
/// Whitespace inside the braces is ignored. String values are HTML-escaped,
/// placeholders without a matching variable render as an empty string, and an
/// unterminated `{{` is an error.
pub fn substitute_variables(template: &str, variables: &Map<String, Value>) -> TemplateResult<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let end = after_open.find("}}").ok_or_else(|| {
            TemplateError::SubstitutionFailed(format!(
                "Unterminated placeholder at byte {}",
                template.len() - rest.len() + start
            ))
        })?;

        let key = after_open[..end].trim();
        if let Some(value) = variables.get(key) {
            result.push_str(&render_value(value));
        }

        rest = &after_open[end + 2..];
    }

    result.push_str(rest);
    Ok(result)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => escape_html(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For arrays and objects, use JSON representation
        _ => escape_html(&value.to_string()),
    }
}

/// Escape the five HTML-significant characters
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
