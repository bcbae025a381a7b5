//! Parameter Validation
//!
//! Shape and type checks on caller-supplied article parameters. Everything
//! here runs before any server is contacted and has no side effects.
//!
//! # Rules
//! - A creation-options value, when present, must be a tagged
//!   `CreationScriptOptions` bundle. Any other JSON value is rejected.
//! - A filter must be a bare predicate. The `WHERE` keyword is added by the
//!   server when the article is created, so filters starting with it are rejected.

use serde_json::Value;

use crate::article::CreationScriptOptions;
use crate::error::{ArticleError, Result};
use crate::provision::ArticleRequest;

/// Article parameters that passed validation, with options decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArticle {
    pub filter: Option<String>,
    pub creation_options: Option<CreationScriptOptions>,
}

/// Validate the optional article parameters of a request
///
/// # Returns
/// * `Ok(ValidatedArticle)` with the filter unchanged and the options decoded
/// * `Err(ArticleError::Validation)` naming the offending parameter
pub fn validate_request(request: &ArticleRequest) -> Result<ValidatedArticle> {
    let creation_options = request
        .creation_options
        .as_ref()
        .map(validate_creation_options)
        .transpose()?
        .flatten();

    if let Some(filter) = request.filter.as_deref() {
        validate_filter(filter)?;
    }

    Ok(ValidatedArticle { filter: request.filter.clone(), creation_options })
}

/// Check that a creation-options value is the recognized capability type
///
/// JSON `null` counts as "not supplied" and yields `Ok(None)`.
pub fn validate_creation_options(value: &Value) -> Result<Option<CreationScriptOptions>> {
    let tag = match value {
        Value::Null => return Ok(None),
        Value::Object(map) => map.get("type").and_then(Value::as_str),
        _ => None,
    };

    match tag {
        Some(CreationScriptOptions::TYPE_TAG) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| {
                ArticleError::validation(format!("Malformed CreationScriptOptions bundle: {e}"))
            }),
        Some(other) => Err(ArticleError::validation(format!(
            "Creation options must be a {} bundle, got type '{other}'",
            CreationScriptOptions::TYPE_TAG
        ))),
        None => Err(ArticleError::validation(format!(
            "Creation options must be a {} bundle, got {}",
            CreationScriptOptions::TYPE_TAG,
            describe_json(value)
        ))),
    }
}

/// Reject filters that carry their own `WHERE` keyword
pub fn validate_filter(filter: &str) -> Result<()> {
    let head = filter.trim_start();
    let starts_with_where = head.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("WHERE"));

    if starts_with_where {
        return Err(ArticleError::validation(format!(
            "Filter must not include the WHERE keyword (it is added automatically). \
             Pass the bare predicate instead, e.g. '{}'",
            head[5..].trim_start()
        )));
    }

    Ok(())
}

fn describe_json(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an untagged object",
    }
}
