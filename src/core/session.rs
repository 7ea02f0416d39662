use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::dispatch::{self, CancelToken, RunMode, RunReport, TargetOutcome};
use crate::core::errors::{PocketError, Result};
use crate::core::options::{self, ExploitOption};
use crate::core::targets;
use crate::modules::{ExploitModule, ModuleFactory, ModuleRegistry};

/// The live selection: one module instance plus its fan-out state.
struct Selected {
    name: String,
    factory: ModuleFactory,
    instance: Box<dyn ExploitModule>,
    multi_target: bool,
    targets: Option<Vec<String>>,
}

/// Process-scoped session: at most one module selected at a time.
///
/// All session operations are synchronous and single-threaded; concurrency
/// only exists inside `run`, which snapshots the configuration before any
/// per-target work starts. Reconfiguring the session while a run is in
/// flight is unsupported.
pub struct Session {
    registry: Arc<ModuleRegistry>,
    selected: Option<Selected>,
}

impl Session {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            selected: None,
        }
    }

    pub fn selected_module(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.name.as_str())
    }

    /// Resolve `module_name` and make it the live selection, discarding any
    /// previous instance and its unsaved option edits.
    pub fn select(&mut self, module_name: &str) -> Result<()> {
        let factory = self.registry.resolve(module_name)?;
        let instance = factory();
        tracing::info!("Selected module: {}", module_name);
        self.selected = Some(Selected {
            name: module_name.to_string(),
            factory,
            instance,
            multi_target: false,
            targets: None,
        });
        Ok(())
    }

    /// Drop the current selection. Idempotent.
    pub fn back(&mut self) {
        if let Some(selected) = self.selected.take() {
            tracing::info!("Deselected module: {}", selected.name);
        }
    }

    /// Rebuild a fresh instance from the registry, discarding in-memory
    /// option edits and any loaded targets.
    pub fn reload(&mut self) -> Result<()> {
        let name = self
            .selected
            .as_ref()
            .map(|s| s.name.clone())
            .ok_or(PocketError::NoModuleSelected)?;
        tracing::info!("Reloading module: {}", name);
        self.select(&name)
    }

    /// Set one option on the live instance.
    ///
    /// The target field carries two side channels. Pointing it at a
    /// `file://` value flips the session into multi-target mode, and
    /// pointing it back at a literal resets the mode and clears any loaded
    /// targets; target cardinality is a derived mode of the target field,
    /// not an option of its own. And on a tcp module a literal
    /// `host:port` value is split so the instance sees the host in `HOST`
    /// and the port in `PORT`.
    pub fn configure(&mut self, name: &str, value: &str) -> Result<()> {
        let selected = self.selected.as_mut().ok_or(PocketError::NoModuleSelected)?;
        let target_type = selected.instance.target_type();
        let target_field = target_type.target_field();

        if name != target_field {
            return selected.instance.options_mut().set_option(name, value);
        }

        if targets::is_file_target(value) {
            selected.instance.options_mut().set_option(name, value)?;
            selected.multi_target = true;
            tracing::debug!("Target field set to file mode: {}", value);
            return Ok(());
        }

        selected.multi_target = false;
        selected.targets = None;

        let resolved = targets::parse_target(value, target_type);
        selected
            .instance
            .options_mut()
            .set_option(target_field, &resolved.endpoint)?;
        if let Some(port) = resolved.port {
            if selected.instance.options().is_defined(options::OPT_PORT) {
                selected
                    .instance
                    .options_mut()
                    .set_option(options::OPT_PORT, &port)?;
            }
        }
        Ok(())
    }

    pub fn is_multi_target(&self) -> Result<bool> {
        self.selected
            .as_ref()
            .map(|s| s.multi_target)
            .ok_or(PocketError::NoModuleSelected)
    }

    pub fn loaded_targets(&self) -> Result<Option<&[String]>> {
        self.selected
            .as_ref()
            .map(|s| s.targets.as_deref())
            .ok_or(PocketError::NoModuleSelected)
    }

    /// Required options still missing a value, for display.
    pub fn missing_options(&self) -> Result<Vec<&ExploitOption>> {
        let selected = self.selected.as_ref().ok_or(PocketError::NoModuleSelected)?;
        Ok(selected.instance.options().missing())
    }

    pub fn show_options(&self) -> Result<&[ExploitOption]> {
        let selected = self.selected.as_ref().ok_or(PocketError::NoModuleSelected)?;
        Ok(selected.instance.options().get_options())
    }

    pub fn module_info(&self) -> Result<BTreeMap<String, String>> {
        let selected = self.selected.as_ref().ok_or(PocketError::NoModuleSelected)?;
        Ok(selected.instance.info())
    }

    /// Run the selected module in `mode` against its configured target(s).
    ///
    /// Validation is the pre-flight gate: a missing required option aborts
    /// here, before target expansion and before any worker is spawned, so a
    /// partial launch cannot happen.
    pub async fn run(&mut self, mode: RunMode, cancel: &CancelToken) -> Result<RunReport> {
        let selected = self.selected.as_mut().ok_or(PocketError::NoModuleSelected)?;

        let (ok, errors) = selected.instance.options().validate();
        if !ok {
            return Err(PocketError::Validation(errors));
        }

        if selected.multi_target {
            let target_field = selected.instance.target_type().target_field();
            let file_value = selected
                .instance
                .options()
                .get_option(target_field)?
                .unwrap_or_default()
                .to_string();

            let expanded = targets::load_target_file(&file_value)?;
            selected.targets = Some(expanded.clone());

            let snapshot = selected.instance.options().snapshot();
            dispatch::run_many(
                Arc::clone(&selected.factory),
                snapshot,
                expanded,
                mode,
                cancel,
            )
            .await
        } else {
            let target = selected
                .instance
                .options()
                .get_option(selected.instance.target_type().target_field())?
                .unwrap_or_default()
                .to_string();
            let outcome = dispatch::execute(selected.instance.as_ref(), mode).await;
            Ok(RunReport {
                outcomes: vec![TargetOutcome { target, outcome }],
                interrupted: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::Outcome;
    use crate::core::options::{OptionSet, OPT_HOST, OPT_PORT, OPT_THREADS};
    use crate::modules::{Descriptor, ExecutionResult, TargetType};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    struct EchoModule {
        options: OptionSet,
        seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
    }

    impl EchoModule {
        fn new(seen: Arc<Mutex<Vec<(String, Option<String>)>>>) -> Self {
            let mut options = OptionSet::new();
            options
                .define(OPT_HOST, true, "Target host")
                .define(OPT_PORT, true, "Target port")
                .define(OPT_THREADS, false, "Worker count");
            Self { options, seen }
        }
    }

    #[async_trait]
    impl ExploitModule for EchoModule {
        fn options(&self) -> &OptionSet {
            &self.options
        }

        fn options_mut(&mut self) -> &mut OptionSet {
            &mut self.options
        }

        fn target_type(&self) -> TargetType {
            TargetType::Tcp
        }

        fn info(&self) -> BTreeMap<String, String> {
            let mut info = BTreeMap::new();
            info.insert("name".to_string(), "echo".to_string());
            info
        }

        async fn check(&self) -> anyhow::Result<Option<ExecutionResult>> {
            let host = self
                .options
                .get_option(OPT_HOST)?
                .unwrap_or_default()
                .to_string();
            let port = self.options.get_option(OPT_PORT)?.map(|p| p.to_string());
            self.seen.lock().unwrap().push((host.clone(), port));
            Ok(Some(ExecutionResult::success(format!("checked {host}"))))
        }

        async fn exploit(&self) -> anyhow::Result<ExecutionResult> {
            let host = self
                .options
                .get_option(OPT_HOST)?
                .unwrap_or_default()
                .to_string();
            let port = self.options.get_option(OPT_PORT)?.map(|p| p.to_string());
            self.seen.lock().unwrap().push((host.clone(), port));
            Ok(ExecutionResult::success(format!("exploited {host}")))
        }
    }

    fn echo_descriptor() -> Descriptor {
        Descriptor {
            name: "Echo".to_string(),
            module_name: "test/echo".to_string(),
            description: "Records what it was configured with".to_string(),
            author: "tests".to_string(),
            disclosure_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            service_name: "echo".to_string(),
            service_version: "1.0".to_string(),
            check: true,
        }
    }

    fn test_session(seen: Arc<Mutex<Vec<(String, Option<String>)>>>) -> Session {
        let mut registry = ModuleRegistry::empty();
        registry.register(
            echo_descriptor(),
            Arc::new(move || Box::new(EchoModule::new(Arc::clone(&seen)))),
        );
        Session::new(Arc::new(registry))
    }

    #[test]
    fn test_select_unknown_module() {
        let mut session = test_session(Arc::new(Mutex::new(Vec::new())));
        assert!(matches!(
            session.select("test/missing"),
            Err(PocketError::ModuleNotFound { .. })
        ));
        assert!(session.selected_module().is_none());
    }

    #[test]
    fn test_operations_require_selection() {
        let mut session = test_session(Arc::new(Mutex::new(Vec::new())));
        assert!(matches!(
            session.configure(OPT_HOST, "10.0.0.1"),
            Err(PocketError::NoModuleSelected)
        ));
        assert!(matches!(session.reload(), Err(PocketError::NoModuleSelected)));
        assert!(matches!(
            session.missing_options(),
            Err(PocketError::NoModuleSelected)
        ));
    }

    #[test]
    fn test_back_is_idempotent() {
        let mut session = test_session(Arc::new(Mutex::new(Vec::new())));
        session.select("test/echo").unwrap();
        assert_eq!(session.selected_module(), Some("test/echo"));
        session.back();
        session.back();
        assert!(session.selected_module().is_none());
    }

    #[test]
    fn test_reload_discards_option_edits() {
        let mut session = test_session(Arc::new(Mutex::new(Vec::new())));
        session.select("test/echo").unwrap();
        session.configure(OPT_HOST, "10.0.0.1").unwrap();
        session.reload().unwrap();
        let missing: Vec<&str> = session
            .missing_options()
            .unwrap()
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(missing, vec![OPT_HOST, OPT_PORT]);
    }

    #[test]
    fn test_target_field_mode_toggle_clears_targets() {
        let mut session = test_session(Arc::new(Mutex::new(Vec::new())));
        session.select("test/echo").unwrap();

        session.configure(OPT_HOST, "file:///tmp/targets.txt").unwrap();
        assert!(session.is_multi_target().unwrap());

        session.configure(OPT_HOST, "10.0.0.1").unwrap();
        assert!(!session.is_multi_target().unwrap());
        assert!(session.loaded_targets().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_blocked_by_missing_required_option() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = test_session(Arc::clone(&seen));
        session.select("test/echo").unwrap();
        session.configure(OPT_HOST, "10.0.0.1").unwrap();

        let err = session
            .run(RunMode::Exploit, &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            PocketError::Validation(errors) => {
                assert_eq!(errors, vec!["Required option 'PORT' is not set"]);
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_target_host_port_split() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = test_session(Arc::clone(&seen));
        session.select("test/echo").unwrap();
        session.configure(OPT_HOST, "1.2.3.4:8080").unwrap();

        let report = session
            .run(RunMode::Check, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(!report.interrupted);
        assert!(matches!(
            &report.outcomes[0].outcome,
            Outcome::Result(r) if r.status
        ));
        assert_eq!(
            seen.lock().unwrap()[0],
            ("1.2.3.4".to_string(), Some("8080".to_string()))
        );
    }

    #[tokio::test]
    async fn test_multi_target_run_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1.2.3.4:8080").unwrap();
        writeln!(file, "5.6.7.8").unwrap();
        writeln!(file, "9.9.9.9:1234").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = test_session(Arc::clone(&seen));
        session.select("test/echo").unwrap();
        session
            .configure(OPT_HOST, &format!("file://{}", file.path().display()))
            .unwrap();
        session.configure(OPT_PORT, "80").unwrap();
        session.configure(OPT_THREADS, "2").unwrap();

        let report = session
            .run(RunMode::Exploit, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.interrupted);

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&("1.2.3.4".to_string(), Some("8080".to_string()))));
        assert!(seen.contains(&("5.6.7.8".to_string(), Some("80".to_string()))));
        assert!(seen.contains(&("9.9.9.9".to_string(), Some("1234".to_string()))));
    }

    #[tokio::test]
    async fn test_multi_target_missing_file_aborts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = test_session(Arc::clone(&seen));
        session.select("test/echo").unwrap();
        session.configure(OPT_HOST, "file:///no/such/list.txt").unwrap();
        session.configure(OPT_PORT, "80").unwrap();

        let err = session
            .run(RunMode::Exploit, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PocketError::TargetFile { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }
}
