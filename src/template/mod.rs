//! E-mail template system.
//!
//! This module provides:
//! - Template definition with variable placeholders ({{variable}})
//! - In-memory template storage with CRUD operations
//! - Variable substitution engine for rendering HTML bodies
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::with_defaults();
//!
//! store.create(Template::new(
//!     "assignment-due",
//!     "Assignment due",
//!     "<h1>{{title}}</h1><p>{{assignment}} is due on {{due_date}}</p>",
//! ))?;
//!
//! let html = store.render("assignment-due", &variables)?;
//! ```

mod store;
mod substitution;
mod types;

use serde_json::{Map, Value};

pub use store::{create_template_store, TemplateStore, DEFAULT_TEMPLATE_ID};
pub use substitution::{escape_html, substitute_variables};
pub use types::{validate_id, Template, TemplateError, TemplateResult, TemplateUpdate};

/// Renders a named template against a variable bag.
///
/// Rendering is synchronous; the delivery task treats it as a blocking call.
pub trait TemplateRenderer: Send + Sync {
    /// Render `template_name` into an HTML body.
    ///
    /// Fails with `TemplateError::NotFound` for unknown templates and
    /// `TemplateError::SubstitutionFailed` for malformed placeholders.
    fn render(&self, template_name: &str, variables: &Map<String, Value>) -> TemplateResult<String>;
}
