// ABOUTME: CLI demo command - drive concurrent get/put traffic through a state pool
//
// Starts the system session and a pool of model sessions, runs callers
// concurrently, optionally removes a model while it is still referenced,
// then prints the pool report and closes everything.

use super::{DemoArgs, OutputFormat};
use anyhow::{ensure, Context, Result};
use futures_util::future::join_all;
use serde::Serialize;
use statepool::config::{SessionSettings, StatePoolConfig};
use statepool::state_pool::{
    ModelSession, ModelSessionFactory, PoolEntryInfo, PoolReport, Session, StatePool,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a demo run
#[derive(Debug, Serialize)]
pub struct DemoOutcome {
    /// Callers that completed a get/put pair
    pub completed_calls: usize,
    /// Callers whose get or put failed
    pub failed_calls: usize,
    /// Model removed while referenced, if requested
    pub removed_model: Option<String>,
    /// Pool state after traffic, before shutdown
    pub report: PoolReport,
}

/// Execute the demo command
pub async fn execute(args: DemoArgs, config: &StatePoolConfig, format: OutputFormat) -> Result<()> {
    let outcome = run(&args, config).await?;

    match format {
        OutputFormat::Json => output_json(&outcome)?,
        OutputFormat::Text => output_text(&outcome),
    }

    Ok(())
}

/// Run the demo traffic and return what happened
pub async fn run(args: &DemoArgs, config: &StatePoolConfig) -> Result<DemoOutcome> {
    ensure!(args.models > 0, "--models must be at least 1");

    // The system key is controller-owned and exempt from the UUID rule
    let system_settings = SessionSettings {
        require_uuid_keys: false,
        ..config.session.clone()
    };
    let system = ModelSession::start(&config.system_model, &system_settings)
        .with_context(|| format!("Failed to start system session {}", config.system_model))?;
    let factory = ModelSessionFactory::new(config.session.clone());
    let pool = Arc::new(StatePool::new(Arc::new(system), factory));

    let models = model_keys(args.models, config.session.require_uuid_keys);
    let hold = Duration::from_millis(args.hold_ms);

    info!(models = args.models, callers = args.callers, "Starting demo traffic");

    let calls = (0..args.callers).map(|i| {
        let pool = Arc::clone(&pool);
        let key = models[i % models.len()].clone();
        async move {
            let session = pool.get(&key).await?;
            tokio::time::sleep(hold).await;
            drop(session);
            pool.put(&key).await
        }
    });

    let results = join_all(calls).await;
    let failed_calls = results
        .iter()
        .filter(|r| {
            if let Err(e) = r {
                warn!(error = %e, "Demo call failed");
            }
            r.is_err()
        })
        .count();

    let mut removed_model = None;
    if args.remove_one {
        let key = &models[0];
        // Hold a reference so removal is deferred until the put below
        pool.get(key).await.context("Failed to get model before removal")?;
        pool.remove(key).await.context("Failed to remove model")?;
        removed_model = Some(key.clone());
    }

    let report = pool.report().await;

    if let Some(key) = &removed_model {
        pool.put(key).await.context("Failed to release removed model")?;
    }

    pool.close().await.context("Failed to close state pool")?;
    pool.system_state()
        .close()
        .await
        .context("Failed to close system session")?;

    Ok(DemoOutcome {
        completed_calls: results.len() - failed_calls,
        failed_calls,
        removed_model,
        report,
    })
}

/// Model keys for the demo, UUIDs when the config demands them
fn model_keys(count: usize, require_uuid: bool) -> Vec<String> {
    (0..count)
        .map(|i| {
            if require_uuid {
                Uuid::new_v4().to_string()
            } else {
                format!("model-{i}")
            }
        })
        .collect()
}

/// Output the outcome as JSON
fn output_json(outcome: &DemoOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    println!("{json}");
    Ok(())
}

/// Output the outcome as a text table
fn output_text(outcome: &DemoOutcome) {
    println!("System model: {}", outcome.report.system_model);
    println!(
        "Calls: {} completed, {} failed",
        outcome.completed_calls, outcome.failed_calls
    );
    if let Some(model) = &outcome.removed_model {
        println!("Removed while referenced: {model}");
    }
    println!();

    println!("{:<24} {:>6} {:<8}", "MODEL", "REFS", "REMOVED");
    println!("{}", "-".repeat(40));
    for entry in &outcome.report.entries {
        println!("{}", format_entry(entry));
    }
    println!();

    let m = &outcome.report.metrics;
    println!(
        "Sessions: {} created, {} closed, {} close errors, {} create errors",
        m.sessions_created, m.sessions_closed, m.close_errors, m.create_errors
    );
    println!("References: {} gets, {} puts", m.total_gets, m.total_puts);
}

fn format_entry(entry: &PoolEntryInfo) -> String {
    format!(
        "{:<24} {:>6} {:<8}",
        entry.model,
        entry.ref_count,
        if entry.removed { "yes" } else { "no" }
    )
}
