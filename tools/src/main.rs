//! acled-server: HTTP API and maintenance commands for the conflict-risk backend.
//!
//! Usage:
//!   acled-server [--config app.json] serve
//!   acled-server [--config app.json] import data/acled_sample_conflict_data.csv
//!   acled-server [--config app.json] riskscore Kenya
//!   acled-server [--config app.json] promote alice

use acled_core::{clock::SystemClock, config::AppConfig, service::ConflictService};
use acled_server::{build_router, AppState};
use anyhow::{bail, Context, Result};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone());
    let positional = positional_args(&args);
    let config = AppConfig::load(config_path.as_deref())?;

    match positional.as_slice() {
        [] | ["serve"] => serve(config),
        ["import", path] => {
            let state = AppState::new(config)?;
            let store = state.open_store()?;
            let summary = ConflictService::new(&store, state.config(), &SystemClock).import_csv(path)?;
            println!(
                "Imported {} new records, updated {} existing records ({} skipped)",
                summary.imported, summary.updated, summary.skipped
            );
            if summary.invalidated > 0 {
                println!("Invalidated {} cached risk scores", summary.invalidated);
            }
            Ok(())
        }
        ["riskscore", country] => {
            let state = AppState::new(config)?;
            let store = state.open_store()?;
            let aggregate = ConflictService::new(&store, state.config(), &SystemClock).risk_score(country)?;
            println!("{}", serde_json::to_string_pretty(&aggregate)?);
            Ok(())
        }
        ["promote", username] => {
            let state = AppState::new(config)?;
            let store = state.open_store()?;
            ConflictService::new(&store, state.config(), &SystemClock).promote_admin(username)?;
            println!("{username} is now an admin");
            Ok(())
        }
        other => bail!(
            "unknown command {other:?}; expected serve | import <file.csv> | riskscore <country> | promote <username>"
        ),
    }
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn serve(config: AppConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    log::info!(
        "acled-server {} starting on {addr} (risk cache invalidation: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.risk_cache.invalidation
    );
    let state = AppState::new(config)?;

    let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        axum::serve(listener, build_router(state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                log::info!("acled-server shutting down");
            })
            .await
            .context("serve http")
    })
}
