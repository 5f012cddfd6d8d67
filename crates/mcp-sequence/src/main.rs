//! MCP Sequence Server Binary
//!
//! This binary runs the MCP server that executes tool-call sequences.
//! It communicates via stdio and is configured through a JSON file and
//! environment variables.
//!
//! Environment variables:
//! - SEQUENCE_MCP_CONFIG: Path to the config file (default .sequence-mcp/config.json)
//! - SEQUENCE_DEFAULT_TIMEOUT_MS: Per-call timeout for steps without timeout_ms
//! - SEQUENCE_MAX_STEPS: Largest accepted sequence
//! - SEQUENCE_MAX_ATTEMPTS: Largest accepted retry_policy.max_attempts
//! - SEQUENCE_SESSION_ID: Backend session passed to every dispatch
//! - SEQUENCE_RUN_TIMEOUT_MS: Deadline for runs without deadline_ms (0 disables)

use anyhow::{Context, Result};
use events::{Event, EventBus};
use mcp_sequence::builtin::builtin_registry;
use mcp_sequence::config::ServerConfig;
use mcp_sequence::SequenceService;
use rmcp::{transport::stdio, ServiceExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr, stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = ServerConfig::load().await;
    info!(
        default_timeout_ms = config.default_timeout_ms,
        max_steps = config.max_steps,
        max_attempts_limit = config.max_attempts_limit,
        session_id = ?config.session_id,
        run_timeout_ms = ?config.run_timeout_ms,
        "Starting MCP Sequence Server"
    );

    let bus = EventBus::new();
    spawn_event_logger(&bus);

    let registry = builtin_registry();
    let engine_config = config.engine_config().with_event_bus(bus);
    let service = SequenceService::with_engine_config(registry, &config, engine_config);
    let server = service
        .serve(stdio())
        .await
        .context("Failed to start MCP server on stdio")?;

    info!("MCP Sequence Server running");

    // Wait for the server to finish (client disconnects)
    server
        .waiting()
        .await
        .context("MCP server task failed")?;

    info!("MCP Sequence Server shutting down");

    Ok(())
}

fn spawn_event_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => match envelope.event {
                    Event::SequenceCompleted {
                        execution_id,
                        status,
                        total_duration_ms,
                        ..
                    } => info!(%execution_id, %status, total_duration_ms, "Sequence completed"),
                    Event::Error { message, context } => {
                        warn!(%message, context = ?context, "Sequence fault")
                    }
                    other => debug!(event = ?other, "Sequence event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
