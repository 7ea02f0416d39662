use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::core::errors::{PocketError, Result};
use crate::core::options::{OPT_PORT, OPT_THREADS};
use crate::core::targets::parse_target;
use crate::modules::{ExecutionResult, ExploitModule, ModuleFactory, TargetType};

/// Which module operation a run invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Check,
    Exploit,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Check => "check",
            RunMode::Exploit => "exploit",
        }
    }
}

/// Outcome of one unit of work. `NoResult` is a `check()` that the module
/// does not support, which is distinct from a failed check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(ExecutionResult),
    NoResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    pub outcome: Outcome,
}

/// Everything a completed (or drained) run produced: exactly one outcome per
/// dispatched target, in completion order.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<TargetOutcome>,
    pub interrupted: bool,
}

/// Cooperative cancellation flag shared between the run initiator and the
/// dispatcher. Tripping it stops new units from being admitted; in-flight
/// units always drain to completion so modules can release sockets cleanly.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Parse the concurrency ceiling out of the snapshot's `THREADS` value.
/// An absent value means a single worker; anything unparsable or below one
/// is a configuration error reported before any dispatch.
pub fn thread_count(snapshot: &HashMap<String, String>) -> Result<usize> {
    let raw = match snapshot.get(OPT_THREADS) {
        Some(raw) => raw,
        None => return Ok(1),
    };
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(PocketError::Configuration(format!(
            "THREADS must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Invoke the requested operation on one module instance, containing any
/// error the module raises in a failed result.
pub async fn execute(instance: &dyn ExploitModule, mode: RunMode) -> Outcome {
    match mode {
        RunMode::Check => match instance.check().await {
            Ok(Some(result)) => Outcome::Result(result),
            Ok(None) => Outcome::NoResult,
            Err(e) => Outcome::Result(ExecutionResult::failure(format!("{e:#}"))),
        },
        RunMode::Exploit => match instance.exploit().await {
            Ok(result) => Outcome::Result(result),
            Err(e) => Outcome::Result(ExecutionResult::failure(format!("{e:#}"))),
        },
    }
}

/// Seed a fresh instance from the baseline snapshot, then override the
/// target field (and `PORT`, for tcp targets) from the raw target string.
fn seed_instance(
    instance: &mut dyn ExploitModule,
    snapshot: &HashMap<String, String>,
    raw_target: &str,
) -> Result<()> {
    let target_type = instance.target_type();
    let target_field = target_type.target_field();
    let resolved = parse_target(raw_target, target_type);

    for (name, value) in snapshot {
        if name == target_field || name == OPT_PORT {
            continue;
        }
        // Baseline values for options this module does not define are
        // dropped rather than treated as an error.
        if instance.options().is_defined(name) {
            instance.options_mut().set_option(name, value)?;
        }
    }

    instance.options_mut().set_option(target_field, &resolved.endpoint)?;

    if target_type == TargetType::Tcp && instance.options().is_defined(OPT_PORT) {
        let port = resolved
            .port
            .or_else(|| snapshot.get(OPT_PORT).cloned());
        if let Some(port) = port {
            instance.options_mut().set_option(OPT_PORT, &port)?;
        }
    }

    Ok(())
}

async fn run_unit(
    factory: ModuleFactory,
    snapshot: Arc<HashMap<String, String>>,
    raw_target: String,
    mode: RunMode,
) -> Outcome {
    let mut instance = factory();
    if let Err(e) = seed_instance(instance.as_mut(), &snapshot, &raw_target) {
        return Outcome::Result(ExecutionResult::failure(e.to_string()));
    }
    tracing::debug!("Dispatching {} against {}", mode.as_str(), raw_target);
    execute(instance.as_ref(), mode).await
}

/// Fan one operation out across many targets with a hard concurrency
/// ceiling taken from the snapshot's `THREADS` value.
///
/// Each target gets a private instance built from `factory` and seeded from
/// the immutable `snapshot`; units run inside their own task so one
/// target's error or panic never touches its siblings. New units are
/// admitted only while `cancel` is untripped and fewer than the ceiling are
/// in flight; the call returns once every admitted unit has completed.
pub async fn run_many(
    factory: ModuleFactory,
    snapshot: HashMap<String, String>,
    targets: Vec<String>,
    mode: RunMode,
    cancel: &CancelToken,
) -> Result<RunReport> {
    let threads = thread_count(&snapshot)?;

    if targets.is_empty() {
        tracing::info!("Target list is empty, nothing to dispatch");
        return Ok(RunReport::default());
    }

    tracing::info!(
        "Running {} across {} targets with {} workers",
        mode.as_str(),
        targets.len(),
        threads
    );

    let snapshot = Arc::new(snapshot);
    let outcomes: Vec<TargetOutcome> = stream::iter(targets)
        .take_while(|_| {
            let admit = !cancel.is_cancelled();
            async move { admit }
        })
        .map(|raw_target| {
            let factory = Arc::clone(&factory);
            let snapshot = Arc::clone(&snapshot);
            async move {
                let handle = tokio::spawn(run_unit(
                    factory,
                    snapshot,
                    raw_target.clone(),
                    mode,
                ));
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::Result(ExecutionResult::failure(format!(
                        "module task aborted: {e}"
                    ))),
                };
                TargetOutcome {
                    target: raw_target,
                    outcome,
                }
            }
        })
        .buffer_unordered(threads)
        .collect()
        .await;

    let interrupted = cancel.is_cancelled();
    if interrupted {
        tracing::warn!(
            "Run interrupted, drained {} in-flight units",
            outcomes.len()
        );
    } else {
        tracing::info!("Run completed: {} outcomes", outcomes.len());
    }

    Ok(RunReport {
        outcomes,
        interrupted,
    })
}
