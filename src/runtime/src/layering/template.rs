//! Template rendering for the layered Dockerfile and the wrapper script.
//!
//! Templates are embedded at build time. Two constructs are supported:
//! `{{name}}` substitutes a parameter, and `{{#if flag}}...{{/if}}` keeps its
//! body only when `flag` is true. Referencing an unknown parameter is an
//! error rather than an empty substitution.

use std::collections::BTreeMap;

use regex::{Captures, Regex};
use sealcraft_core::config::LogRedirect;
use sealcraft_core::error::{Result, SealError};

/// Derived Dockerfile template.
pub const DOCKERFILE_TEMPLATE: &str = include_str!("../../templates/Dockerfile.layered.tmpl");

/// Wrapper script template.
pub const SCRIPT_TEMPLATE: &str = include_str!("../../templates/sealcraft-entrypoint.sh.tmpl");

/// Named parameters for one render.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    values: BTreeMap<&'static str, String>,
    flags: BTreeMap<&'static str, bool>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }

    /// A boolean usable in `{{#if}}` and, as `true`/`false`, in `{{name}}`.
    pub fn flag(mut self, name: &'static str, on: bool) -> Self {
        self.flags.insert(name, on);
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| self.flags.get(name).map(|b| b.to_string()))
    }
}

/// Render `template` with `params`.
pub fn render(template: &str, params: &TemplateParams) -> Result<String> {
    let conditional = Regex::new(r"(?s)\{\{#if (\w+)\}\}(.*?)\{\{/if\}\}")
        .map_err(|e| SealError::Other(format!("template regex: {}", e)))?;
    let placeholder = Regex::new(r"\{\{(\w+)\}\}")
        .map_err(|e| SealError::Other(format!("template regex: {}", e)))?;

    let mut unknown: Option<String> = None;

    let expanded = conditional.replace_all(template, |caps: &Captures| {
        match params.flags.get(&caps[1]) {
            Some(true) => caps[2].to_string(),
            Some(false) => String::new(),
            None => {
                unknown.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    let rendered = placeholder.replace_all(&expanded, |caps: &Captures| {
        match params.lookup(&caps[1]) {
            Some(v) => v,
            None => {
                unknown.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match unknown {
        Some(name) => Err(SealError::Validation(format!(
            "template references unknown parameter '{}'",
            name
        ))),
        None => Ok(rendered.into_owned()),
    }
}

/// Parameters of the derived Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileParams {
    pub base_image: String,
    /// Original ENTRYPOINT + CMD as a JSON array literal
    pub original_cmd: String,
    pub original_user: String,
    pub log_redirect: LogRedirect,
    pub include_tls: bool,
    pub tool_version: String,
}

impl DockerfileParams {
    pub fn render(&self) -> Result<String> {
        let params = TemplateParams::new()
            .value("baseImage", &self.base_image)
            .value("originalCmd", &self.original_cmd)
            .value("originalUser", &self.original_user)
            .value("logRedirect", self.log_redirect.as_str())
            .value("toolVersion", &self.tool_version)
            .flag("includeTLS", self.include_tls);
        render(DOCKERFILE_TEMPLATE, &params)
    }
}

/// Parameters of the wrapper script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptParams {
    pub kms_server_url: String,
    pub user_api_url: String,
}

impl ScriptParams {
    pub fn render(&self) -> Result<String> {
        let params = TemplateParams::new()
            .value("kmsServerURL", &self.kms_server_url)
            .value("userAPIURL", &self.user_api_url);
        render(SCRIPT_TEMPLATE, &params)
    }
}
