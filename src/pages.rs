use axum::response::Html;
use handlebars::{Handlebars, TemplateError};
use serde::Serialize;

use crate::error::AppError;

/// Templates compiled into the binary, keyed by page name
const TEMPLATES: [(&str, &str); 6] = [
    ("home", include_str!("./templates/home.hbs")),
    ("login", include_str!("./templates/login.hbs")),
    ("signup", include_str!("./templates/signup.hbs")),
    ("orders", include_str!("./templates/orders.hbs")),
    ("history", include_str!("./templates/history.hbs")),
    ("admin", include_str!("./templates/admin.hbs")),
];

/// Server-side page renderer
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    /// Register every page template
    ///
    /// # Errors
    /// * Returns the first template that fails to compile
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source)?;
        }
        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, page: &str, data: &T) -> Result<Html<String>, AppError> {
        Ok(Html(self.registry.render(page, data)?))
    }
}
