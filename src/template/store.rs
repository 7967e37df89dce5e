//! Template storage with CRUD operations

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use super::substitution::substitute_variables;
use super::types::{validate_id, Template, TemplateError, TemplateResult, TemplateUpdate};
use super::TemplateRenderer;

/// Identifier of the built-in template
pub const DEFAULT_TEMPLATE_ID: &str = "default-email";

const DEFAULT_TEMPLATE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{title}}</title></head>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h1 style="font-size: 20px;">{{title}}</h1>
  <p>{{message}}</p>
  <hr>
  <p style="font-size: 12px; color: #888;">You received this e-mail because of activity in your courses.</p>
</body>
</html>
"#;

/// In-memory template storage
pub struct TemplateStore {
    templates: DashMap<String, Template>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    /// Create an empty template store
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Create a store holding the built-in `default-email` template
    pub fn with_defaults() -> Self {
        let store = Self::new();
        store.templates.insert(
            DEFAULT_TEMPLATE_ID.to_string(),
            Template::new(DEFAULT_TEMPLATE_ID, "Default e-mail", DEFAULT_TEMPLATE_HTML),
        );
        store
    }

    /// Create a new template
    pub fn create(&self, template: Template) -> TemplateResult<Template> {
        template.validate()?;

        match self.templates.entry(template.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TemplateError::AlreadyExists(template.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(template.clone());
                Ok(template)
            }
        }
    }

    /// Insert or replace a template
    pub fn upsert(&self, template: Template) -> TemplateResult<()> {
        template.validate()?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Get a template by ID
    pub fn get(&self, id: &str) -> TemplateResult<Template> {
        self.templates
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// List all templates
    pub fn list(&self) -> Vec<Template> {
        self.templates
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Apply a partial update to an existing template
    pub fn update(&self, id: &str, update: TemplateUpdate) -> TemplateResult<Template> {
        let mut template = self.get(id)?;
        update.apply_to(&mut template);
        template.validate()?;

        self.templates.insert(id.to_string(), template.clone());
        Ok(template)
    }

    /// Delete a template by ID
    pub fn delete(&self, id: &str) -> TemplateResult<()> {
        self.templates
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Check if a template exists
    pub fn exists(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Get the number of templates
    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Load every `*.html` file in `dir`, keyed by file stem.
    ///
    /// Existing templates with the same ID are replaced. Returns the number
    /// of templates loaded.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> TemplateResult<usize> {
        let dir = dir.as_ref();
        let mut loaded = 0;

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Err(e) = validate_id(id) {
                tracing::warn!(path = %path.display(), error = %e, "Skipping template file");
                continue;
            }

            let html_body = std::fs::read_to_string(&path)?;
            self.upsert(Template::new(id, id, html_body))?;
            loaded += 1;

            tracing::debug!(template_id = %id, path = %path.display(), "Loaded template");
        }

        tracing::info!(dir = %dir.display(), loaded = loaded, "Templates loaded from directory");

        Ok(loaded)
    }
}

impl TemplateRenderer for TemplateStore {
    fn render(&self, template_name: &str, variables: &Map<String, Value>) -> TemplateResult<String> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| TemplateError::NotFound(template_name.to_string()))?;

        substitute_variables(&template.html_body, variables)
    }
}

/// Create an Arc-wrapped template store with the built-in templates
pub fn create_template_store() -> Arc<TemplateStore> {
    Arc::new(TemplateStore::with_defaults())
}
