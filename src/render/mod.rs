//! Manifest rendering
//!
//! Templates are YAML documents with `{{ path }}` placeholders resolved
//! against a JSON value. `{{ path | json }}` emits the value as JSON, which is
//! valid YAML flow syntax and the safe way to insert strings, maps and lists.
//! The rendered text is parsed with `serde_yaml` into the requested type.
//!
//! The built-in templates are compiled into the binary. A directory of
//! `<name>.tpl` files can override any of them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const CONFIG_MAP_TEMPLATE: &str = "configmap.yml";
pub const DEPLOYMENT_TEMPLATE: &str = "deployment.yml";
pub const SERVICE_TEMPLATE: &str = "service.yml";

const TEMPLATE_SUFFIX: &str = ".tpl";

/// Renders named templates into typed Kubernetes objects
#[derive(Clone, Debug)]
pub struct TemplateRenderer {
    templates: BTreeMap<String, String>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRenderer {
    /// Renderer with only the compiled-in templates
    pub fn builtin() -> Self {
        let templates = [
            (
                CONFIG_MAP_TEMPLATE,
                include_str!("../../templates/configmap.yml.tpl"),
            ),
            (
                DEPLOYMENT_TEMPLATE,
                include_str!("../../templates/deployment.yml.tpl"),
            ),
            (
                SERVICE_TEMPLATE,
                include_str!("../../templates/service.yml.tpl"),
            ),
        ]
        .into_iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect();
        Self { templates }
    }

    /// Built-in templates overridden by every `*.tpl` file in `dir`
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut renderer = Self::builtin();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::ConfigError(format!("Cannot read templates directory {}: {}", dir.display(), e))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| Error::ConfigError(format!("Cannot list {}: {}", dir.display(), e)))?
                .path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(TEMPLATE_SUFFIX))
            else {
                continue;
            };
            let body = std::fs::read_to_string(&path).map_err(|e| {
                Error::ConfigError(format!("Cannot read template {}: {}", path.display(), e))
            })?;
            info!("Using template override {} from {}", name, path.display());
            renderer.templates.insert(name.to_string(), body);
        }

        Ok(renderer)
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    /// Substitute placeholders without parsing the result
    pub fn render_str(&self, template: &str, values: &Value) -> Result<String> {
        let body = self.templates.get(template).ok_or_else(|| Error::RenderError {
            template: template.to_string(),
            message: "unknown template".to_string(),
        })?;
        interpolate(body, values).map_err(|message| Error::RenderError {
            template: template.to_string(),
            message,
        })
    }

    /// Render a template and parse it into `T`
    pub fn render<T: DeserializeOwned>(&self, template: &str, values: &Value) -> Result<T> {
        let text = self.render_str(template, values)?;
        debug!("Rendered {}:\n{}", template, text);
        Ok(serde_yaml::from_str(&text)?)
    }
}

fn interpolate(body: &str, values: &Value) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| "unterminated placeholder".to_string())?;
        out.push_str(&expand(after[..end].trim(), values)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

fn expand(expr: &str, values: &Value) -> std::result::Result<String, String> {
    let (path, filter) = match expr.split_once('|') {
        Some((path, filter)) => (path.trim(), Some(filter.trim())),
        None => (expr, None),
    };
    let value = lookup(values, path).ok_or_else(|| format!("no value for {}", path))?;

    match filter {
        Some("json") => serde_json::to_string(value).map_err(|e| e.to_string()),
        Some(other) => Err(format!("unknown filter {}", other)),
        None => match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok("null".to_string()),
            Value::Array(_) | Value::Object(_) => {
                Err(format!("{} is not a scalar, use the json filter", path))
            }
        },
    }
}

fn lookup<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(values, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Service};
    use serde_json::json;

    #[test]
    fn test_interpolation_and_json_filter() {
        let values = json!({
            "name": "web",
            "replicas": 3,
            "labels": {"app": "web"},
            "nested": {"items": ["a", "b"]}
        });
        let out = interpolate(
            "n={{ name }} r={{replicas}} l={{ labels | json }} i={{ nested.items.1 }}",
            &values,
        )
        .unwrap();
        assert_eq!(out, r#"n=web r=3 l={"app":"web"} i=b"#);
    }

    #[test]
    fn test_interpolation_errors() {
        let values = json!({"labels": {"app": "web"}});
        assert!(interpolate("{{ missing }}", &values).unwrap_err().contains("missing"));
        assert!(interpolate("{{ labels }}", &values).unwrap_err().contains("json filter"));
        assert!(interpolate("{{ labels | yaml }}", &values).unwrap_err().contains("yaml"));
        assert!(interpolate("{{ labels", &values).unwrap_err().contains("unterminated"));
    }

    #[test]
    fn test_builtin_config_map() {
        let renderer = TemplateRenderer::builtin();
        let cm: ConfigMap = renderer
            .render(
                CONFIG_MAP_TEMPLATE,
                &json!({
                    "name": "web-config",
                    "namespace": "prod",
                    "labels": {"app.kubernetes.io/instance": "web"},
                    "config": {"LOG_LEVEL": "debug", "GREETING": "hello: \"world\""}
                }),
            )
            .unwrap();

        assert_eq!(cm.metadata.name.as_deref(), Some("web-config"));
        let data = cm.data.unwrap();
        assert_eq!(data["GREETING"], "hello: \"world\"");
    }

    #[test]
    fn test_unknown_template() {
        let err = TemplateRenderer::builtin()
            .render::<Service>("ingress.yml", &json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::RenderError { .. }));
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("service.yml.tpl"),
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{ name }}-custom\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let renderer = TemplateRenderer::with_overrides(dir.path()).unwrap();
        assert_eq!(
            renderer.template_names(),
            vec![CONFIG_MAP_TEMPLATE, DEPLOYMENT_TEMPLATE, SERVICE_TEMPLATE]
        );
        let svc: Service = renderer
            .render(SERVICE_TEMPLATE, &json!({"name": "web"}))
            .unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("web-custom"));
    }

    #[test]
    fn test_missing_directory_is_a_config_error() {
        let err = TemplateRenderer::with_overrides(Path::new("/nonexistent/templates")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
