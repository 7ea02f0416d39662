use std::collections::HashMap;

use crate::core::errors::{PocketError, Result};

/// Well-known option names the engine itself consults.
pub const OPT_HOST: &str = "HOST";
pub const OPT_URL: &str = "URL";
pub const OPT_PORT: &str = "PORT";
pub const OPT_THREADS: &str = "THREADS";
pub const OPT_TIMEOUT: &str = "TIMEOUT";

/// A single named configuration slot on a module.
#[derive(Debug, Clone)]
pub struct ExploitOption {
    pub name: String,
    pub value: Option<String>,
    pub required: bool,
    pub description: String,
}

/// Ordered collection of options owned by one module instance.
///
/// Values are stored as strings; numeric interpretation (THREADS, PORT,
/// TIMEOUT) is the consumer's job. Definition order is preserved so that
/// validation errors and `missing()` come out in a stable order.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    options: Vec<ExploitOption>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot. Duplicate names are a programming error in the
    /// defining module, not a runtime condition.
    pub fn define(&mut self, name: &str, required: bool, description: &str) -> &mut Self {
        self.define_with_default(name, required, description, None)
    }

    pub fn define_with_default(
        &mut self,
        name: &str,
        required: bool,
        description: &str,
        default: Option<&str>,
    ) -> &mut Self {
        assert!(
            !self.options.iter().any(|o| o.name == name),
            "duplicate option definition: {name}"
        );
        self.options.push(ExploitOption {
            name: name.to_string(),
            value: default.map(|d| d.to_string()),
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        let option = self
            .options
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| PocketError::UnknownOption {
                name: name.to_string(),
            })?;
        option.value = Some(value.to_string());
        Ok(())
    }

    /// Clear a previously set value, falling back to "never set".
    pub fn unset_option(&mut self, name: &str) -> Result<()> {
        let option = self
            .options
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| PocketError::UnknownOption {
                name: name.to_string(),
            })?;
        option.value = None;
        Ok(())
    }

    pub fn get_option(&self, name: &str) -> Result<Option<&str>> {
        let option = self
            .options
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| PocketError::UnknownOption {
                name: name.to_string(),
            })?;
        Ok(option.value.as_deref())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.options.iter().any(|o| o.name == name)
    }

    pub fn get_options(&self) -> &[ExploitOption] {
        &self.options
    }

    /// Required options that have no value, in definition order.
    pub fn missing(&self) -> Vec<&ExploitOption> {
        self.options
            .iter()
            .filter(|o| o.required && o.value.is_none())
            .collect()
    }

    /// Pre-flight gate: one human-readable error per missing required option.
    pub fn validate(&self) -> (bool, Vec<String>) {
        let errors: Vec<String> = self
            .missing()
            .iter()
            .map(|o| format!("Required option '{}' is not set", o.name))
            .collect();
        (errors.is_empty(), errors)
    }

    /// Name -> value map of every set option, used to seed per-target clones.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.options
            .iter()
            .filter_map(|o| o.value.as_ref().map(|v| (o.name.clone(), v.clone())))
            .collect()
    }
}
