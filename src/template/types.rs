use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted template ID
const MAX_ID_LEN: usize = 64;

/// Longest accepted display name
const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template ID '{id}': {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("Invalid template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: &'static str },

    /// Malformed placeholder syntax in a template body
    #[error("Variable substitution failed: {0}")]
    SubstitutionFailed(String),

    #[error("Failed to load templates: {0}")]
    Io(#[from] std::io::Error),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// A named HTML e-mail body with `{{variable}}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Lookup key, referenced by `Notification::template_name`
    pub id: String,
    pub name: String,
    pub html_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>, html_body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            html_body: html_body.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the ID, the display name and that the body is not blank
    pub fn validate(&self) -> TemplateResult<()> {
        validate_id(&self.id)?;

        let invalid = |reason| TemplateError::InvalidTemplate {
            id: self.id.clone(),
            reason,
        };
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(invalid("name must be 1-256 characters"));
        }
        if self.html_body.trim().is_empty() {
            return Err(invalid("HTML body must not be blank"));
        }
        Ok(())
    }
}

/// IDs are 1-64 characters of ASCII letters, digits, `-` or `_`.
pub fn validate_id(id: &str) -> TemplateResult<()> {
    let reason = if id.is_empty() || id.len() > MAX_ID_LEN {
        "must be 1-64 characters"
    } else if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "must contain only letters, digits, dash or underscore"
    } else {
        return Ok(());
    };

    Err(TemplateError::InvalidId {
        id: id.to_string(),
        reason,
    })
}

/// Partial update of a stored template; `None` fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub html_body: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
}

impl TemplateUpdate {
    /// Apply the changed fields and refresh `updated_at`
    pub fn apply_to(self, template: &mut Template) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(html_body) = self.html_body {
            template.html_body = html_body;
        }
        if let Some(description) = self.description {
            template.description = description;
        }
        template.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_rules() {
        assert!(validate_id("assignment-due_2").is_ok());
        assert!(matches!(validate_id(""), Err(TemplateError::InvalidId { .. })));
        assert!(matches!(
            validate_id("grade/posted"),
            Err(TemplateError::InvalidId { .. })
        ));
        assert!(validate_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_update_clears_description() {
        let mut template = Template::new("welcome", "Welcome", "<p>{{title}}</p>")
            .with_description("Sent on enrolment");

        TemplateUpdate {
            description: Some(None),
            ..Default::default()
        }
        .apply_to(&mut template);

        assert!(template.description.is_none());
        assert_eq!(template.name, "Welcome");
    }
}
