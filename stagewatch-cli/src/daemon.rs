//! Wiring between the configuration, the store and the scheduler.

use std::sync::Arc;

use stagewatch::{Orchestrator, Scheduler};
use stagewatch_store::{InMemoryBackend, RedbBackend, StorageBackend};

use crate::cli::Cli;
use crate::config::{ConfigError, DaemonConfig};
use crate::handlers::builtin_registry;

/// Opens the store selected by the process options.
pub fn open_backend(cli: &Cli) -> Result<Arc<dyn StorageBackend>, ConfigError> {
    if cli.memory_store {
        tracing::warn!("using in-memory store; state is lost on exit");
        return Ok(Arc::new(InMemoryBackend::new()));
    }
    let backend = RedbBackend::open(&cli.storage_path)?;
    tracing::info!(path = %cli.storage_path.display(), "store opened");
    Ok(Arc::new(backend))
}

/// Builds an orchestrator with the built-in handlers and the configured
/// stage timeout.
///
/// Function ids with no handler are logged, or rejected when
/// `strict_handlers` is set.
pub fn build_orchestrator(
    config: &DaemonConfig,
    backend: Arc<dyn StorageBackend>,
) -> Result<Orchestrator, ConfigError> {
    let registry = builtin_registry(&config.settings, backend)?;
    let orchestrator =
        Orchestrator::new(registry).with_stage_timeout(config.settings.stage_timeout);

    if config.settings.strict_handlers {
        orchestrator.ensure_handlers(&config.workflow)?;
    } else {
        let unresolved = orchestrator.unresolved_handlers(&config.workflow);
        if !unresolved.is_empty() {
            tracing::warn!(
                function_ids = %unresolved.join(", "),
                "no handler registered; affected stages will record no result"
            );
        }
    }
    Ok(orchestrator)
}

/// Loads the configuration and store named by `cli` and returns a scheduler
/// ready to run.
pub fn prepare(cli: &Cli) -> Result<Scheduler, ConfigError> {
    let config = DaemonConfig::load(&cli.config)?;
    tracing::info!(
        config = %cli.config.display(),
        stages = config.workflow.stages.len(),
        tasks = config.workflow.tasks.len(),
        "configuration loaded"
    );

    let backend = open_backend(cli)?;
    let orchestrator = build_orchestrator(&config, backend)?;

    let scheduler = Scheduler::new(orchestrator, config.workflow, cli.frequency);
    Ok(if cli.once {
        scheduler.with_max_runs(1)
    } else {
        scheduler
    })
}
