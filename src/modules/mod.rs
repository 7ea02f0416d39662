pub mod http_header;
pub mod tcp_banner;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::core::errors::{PocketError, Result as PocketResult};
use crate::core::options::OptionSet;

/// What kind of endpoint a module runs against, and therefore which option
/// field carries the target: `HOST` (plus `PORT`) for tcp, `URL` for http.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Tcp,
    Http,
}

impl TargetType {
    pub fn target_field(&self) -> &'static str {
        match self {
            TargetType::Tcp => crate::core::options::OPT_HOST,
            TargetType::Http => crate::core::options::OPT_URL,
        }
    }
}

/// Uniform result of one `check`/`exploit` invocation against one target.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: bool,
    pub success_message: String,
    pub error_message: String,
}

impl ExecutionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: true,
            success_message: message.into(),
            error_message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: false,
            success_message: String::new(),
            error_message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        if self.status {
            &self.success_message
        } else {
            &self.error_message
        }
    }
}

/// Capability surface every pluggable exploit module implements.
///
/// Modules own their option set and their own network logic, including any
/// per-probe timeout taken from the `TIMEOUT` option. The engine only ever
/// drives them through this trait.
#[async_trait]
pub trait ExploitModule: Send + Sync {
    fn options(&self) -> &OptionSet;
    fn options_mut(&mut self) -> &mut OptionSet;
    fn target_type(&self) -> TargetType;
    fn info(&self) -> BTreeMap<String, String>;

    /// Non-destructive applicability probe. `Ok(None)` means the module does
    /// not support checking, which is distinct from a failed check.
    async fn check(&self) -> Result<Option<ExecutionResult>>;

    /// The full action.
    async fn exploit(&self) -> Result<ExecutionResult>;
}

/// Builds a fresh, independently-owned module instance. The dispatcher calls
/// this once per target so no instance is ever shared across workers.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn ExploitModule> + Send + Sync>;

/// Catalog metadata for one module, sourced from the registry. Read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    pub name: String,
    pub module_name: String,
    pub description: String,
    pub author: String,
    pub disclosure_date: NaiveDate,
    pub service_name: String,
    pub service_version: String,
    pub check: bool,
}

/// Fields `search` accepts, matching the catalog contract exactly.
const SEARCH_FIELDS: &[&str] = &[
    "name",
    "module_name",
    "description",
    "author",
    "disclosure_date",
    "service_name",
    "service_version",
    "check",
];

/// In-memory module catalog: maps module names to factories and descriptors.
pub struct ModuleRegistry {
    entries: Vec<(Descriptor, ModuleFactory)>,
}

impl ModuleRegistry {
    /// Registry preloaded with the built-in modules.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
        };

        registry.register(
            tcp_banner::descriptor(),
            Arc::new(|| Box::new(tcp_banner::BannerGrabModule::new())),
        );
        registry.register(
            http_header::descriptor(),
            Arc::new(|| Box::new(http_header::HeaderProbeModule::new())),
        );

        registry
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, descriptor: Descriptor, factory: ModuleFactory) {
        tracing::debug!("Registered module: {}", descriptor.module_name);
        self.entries.push((descriptor, factory));
    }

    pub fn resolve(&self, module_name: &str) -> PocketResult<ModuleFactory> {
        self.entries
            .iter()
            .find(|(d, _)| d.module_name == module_name)
            .map(|(_, f)| Arc::clone(f))
            .ok_or_else(|| PocketError::ModuleNotFound {
                name: module_name.to_string(),
            })
    }

    pub fn list(&self) -> Vec<&Descriptor> {
        self.entries.iter().map(|(d, _)| d).collect()
    }

    /// Filter the catalog by `field=value` pairs. All pairs must match;
    /// matching is case-insensitive substring over the field's rendering.
    pub fn search(&self, criteria: &[(String, String)]) -> PocketResult<Vec<&Descriptor>> {
        for (field, _) in criteria {
            if !SEARCH_FIELDS.contains(&field.as_str()) {
                return Err(PocketError::Configuration(format!(
                    "Unrecognized search field: {field}"
                )));
            }
        }

        Ok(self
            .list()
            .into_iter()
            .filter(|d| {
                criteria.iter().all(|(field, value)| {
                    let haystack = match field.as_str() {
                        "name" => d.name.clone(),
                        "module_name" => d.module_name.clone(),
                        "description" => d.description.clone(),
                        "author" => d.author.clone(),
                        "disclosure_date" => d.disclosure_date.to_string(),
                        "service_name" => d.service_name.clone(),
                        "service_version" => d.service_version.clone(),
                        "check" => d.check.to_string(),
                        _ => unreachable!(),
                    };
                    haystack.to_lowercase().contains(&value.to_lowercase())
                })
            })
            .collect())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_module() {
        let registry = ModuleRegistry::new();
        let factory = registry.resolve("tcp/banner_grab").unwrap();
        let instance = factory();
        assert_eq!(instance.target_type(), TargetType::Tcp);
    }

    #[test]
    fn test_resolve_unknown_module() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.resolve("no/such_module"),
            Err(PocketError::ModuleNotFound { ref name }) if name == "no/such_module"
        ));
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let registry = ModuleRegistry::new();
        let names: Vec<&str> = registry
            .list()
            .iter()
            .map(|d| d.module_name.as_str())
            .collect();
        assert_eq!(names, vec!["tcp/banner_grab", "http/header_probe"]);
    }

    #[test]
    fn test_search_matches_all_pairs() {
        let registry = ModuleRegistry::new();
        let hits = registry
            .search(&[
                ("service_name".to_string(), "http".to_string()),
                ("check".to_string(), "true".to_string()),
            ])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].module_name, "http/header_probe");
    }

    #[test]
    fn test_search_rejects_unknown_field() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.search(&[("severity".to_string(), "high".to_string())]),
            Err(PocketError::Configuration(_))
        ));
    }
}
