//! Template Renderer (§4.A): parameter-substitute a text template, then decode the result into
//! a typed orchestrator object with a discovered kind.

use crate::error::{Error, Result};
use crate::model::{Tags, Template};

use k8s_openapi::api::core::v1::{Namespace, ReplicationController, Service};
use regex::{Captures, Regex};

/// One of the three orchestrator object kinds a template may render into.
#[derive(Clone, Debug)]
pub enum RenderedObject {
    Namespace(Namespace),
    Service(Service),
    ReplicationController(ReplicationController),
}

impl RenderedObject {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderedObject::Namespace(_) => "Namespace",
            RenderedObject::Service(_) => "Service",
            RenderedObject::ReplicationController(_) => "ReplicationController",
        }
    }
}

fn placeholder_pattern() -> Regex {
    // safe unwrap: fixed pattern, compiles unconditionally
    Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").unwrap()
}

/// Render `template` against `params`, substituting `{{.key}}` placeholders (missing keys
/// become empty strings) and decoding the result as a single YAML/JSON object.
pub fn render(template: &Template, params: &Tags) -> Result<RenderedObject> {
    if template.content.matches("{{").count() != template.content.matches("}}").count() {
        return Err(Error::TemplateParse(
            template.name.clone(),
            "unbalanced template delimiters".to_string(),
        ));
    }

    let pattern = placeholder_pattern();
    let rendered = pattern.replace_all(&template.content, |caps: &Captures| {
        params.get(&caps[1]).cloned().unwrap_or_default()
    });

    let value: serde_yaml::Value = serde_yaml::from_str(&rendered).map_err(|e| {
        Error::ManifestDecode(template.name.clone(), format!("invalid YAML/JSON: {e}"))
    })?;

    let kind = value
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| {
            Error::ManifestDecode(template.name.clone(), "missing \"kind\" field".to_string())
        })?
        .to_string();

    match kind.as_str() {
        "Namespace" => serde_yaml::from_value(value)
            .map(RenderedObject::Namespace)
            .map_err(|e| Error::ManifestDecode(template.name.clone(), e.to_string())),
        "Service" => serde_yaml::from_value(value)
            .map(RenderedObject::Service)
            .map_err(|e| Error::ManifestDecode(template.name.clone(), e.to_string())),
        "ReplicationController" => serde_yaml::from_value(value)
            .map(RenderedObject::ReplicationController)
            .map_err(|e| Error::ManifestDecode(template.name.clone(), e.to_string())),
        other => Err(Error::ManifestDecode(
            template.name.clone(),
            format!("unknown kind \"{other}\""),
        )),
    }
}
