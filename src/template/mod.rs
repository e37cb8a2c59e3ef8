//! Jinja2-compatible template rendering
//!
//! Generated configuration files (`.terragrunt`, `infra/state.tf`) are
//! rendered from templates. Undefined variables are errors: a backend block
//! with an empty bucket or key must never reach terraform.

pub mod backend;

pub use backend::{BackendConfig, write_terraform_backend, write_terragrunt_config};

use crate::CdflowError;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

/// Render a template source with a serializable context
pub fn render_template<S: Serialize>(
    name: &str,
    source: &str,
    context: S,
) -> Result<String, CdflowError> {
    debug!("Rendering template {}", name);

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    env.add_template(name, source)
        .map_err(|e| CdflowError::Template(format!("parse error in {}: {}", name, e)))?;

    let tmpl = env
        .get_template(name)
        .map_err(|e| CdflowError::Template(format!("{}: {}", name, e)))?;

    tmpl.render(context)
        .map_err(|e| CdflowError::Template(format!("render error in {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_render_simple_template() {
        let rendered = render_template("t", "bucket = \"{{ bucket }}\"\n", context! { bucket => "b1" })
            .unwrap();
        assert_eq!(rendered, "bucket = \"b1\"\n");
    }

    #[test]
    fn test_render_missing_variable_is_error() {
        let result = render_template("t", "key = {{ missing }}", context! {});
        assert!(matches!(result, Err(CdflowError::Template(_))));
    }

    #[test]
    fn test_render_invalid_syntax() {
        let result = render_template("t", "value: {{ invalid", context! {});
        assert!(result.is_err());
    }

    #[test]
    fn test_single_braces_pass_through() {
        let rendered = render_template("t", "lock = {\n  a = \"{{ a }}\"\n}", context! { a => 1 })
            .unwrap();
        assert_eq!(rendered, "lock = {\n  a = \"1\"\n}");
    }
}
