// Tubeflow - Local Pipeline Runner
//
// Usage: local <project name...>
// Creates a project, drives it through every stage and prints the final
// snapshot as JSON. Failed stages are retried until the attempt ceiling.

use tokio::signal;
use tracing::{error, info, warn};

use tubeflow_common::Config;
use tubeflow_productions::{ProjectSnapshot, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tubeflow_app::init_tracing(&config);

    let name = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if name.trim().is_empty() {
        anyhow::bail!("usage: local <project name>");
    }

    info!("Starting Tubeflow local pipeline runner");

    let engine = tubeflow_app::build_engine(&config).await.map_err(|e| {
        error!("Failed to build workflow engine: {}", e);
        e
    })?;

    let snapshot = tokio::select! {
        result = run_pipeline(&engine, &name) => result?,
        _ = shutdown_signal() => {
            warn!("Interrupted before the pipeline finished");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_pipeline(engine: &WorkflowEngine, name: &str) -> anyhow::Result<ProjectSnapshot> {
    let project = engine.create_project(name).await?;
    let project_id = project.id();
    info!(project_id = %project_id, "Project created, running pipeline");

    loop {
        let snapshot = engine.get_status(project_id).await?;
        let Some(current) = snapshot.current() else {
            info!(project_id = %project_id, "Pipeline complete");
            return Ok(snapshot);
        };

        let result = if current.error.is_some() {
            engine.retry(project_id).await
        } else {
            engine.advance(project_id).await
        };

        match result {
            Ok(record) => info!(stage = %record.stage, attempts = record.attempts, "Stage completed"),
            // Recorded on the stage; the next pass retries it
            Err(e) if e.is_stage_failure() => warn!(error = %e, "Stage failed"),
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Pipeline halted");
                return Err(e.into());
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C signal, stopping");
}
