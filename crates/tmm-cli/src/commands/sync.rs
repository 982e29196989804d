use std::sync::Arc;

use serde::Serialize;
use tmm_core::api::HttpApiClient;
use tmm_core::services::StoreStats;
use tmm_core::sync::{SyncEvent, SyncEventStatus, SyncScheduler, SyncStatus};
use tmm_core::SyncCoordinator;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use crate::cli::{SyncArgs, SyncCommands};
use crate::error::CliError;

use super::common::{describe_outcome, format_timestamp, outcome_to_result, print_json, AppContext};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncReport {
    year: i32,
    #[serde(flatten)]
    status: SyncStatus,
    store: StoreStats,
}

pub async fn run(ctx: &AppContext, args: SyncArgs) -> Result<(), CliError> {
    let owner_id = ctx.require_session().await?;
    match args.command {
        Some(SyncCommands::Status { json }) => run_status(ctx, json).await,
        Some(SyncCommands::Watch) => run_watch(ctx, owner_id).await,
        None => {
            let coordinator = &ctx.coordinator;
            let outcome = if args.quick {
                coordinator.quick_sync(owner_id, ctx.year).await
            } else if args.backoff {
                coordinator.full_sync_with_backoff(owner_id, ctx.year).await
            } else {
                coordinator.full_sync(owner_id, ctx.year).await
            };
            println!("{}", describe_outcome(&outcome));
            outcome_to_result(&outcome)
        }
    }
}

async fn run_status(ctx: &AppContext, json: bool) -> Result<(), CliError> {
    let status = ctx.coordinator.status();
    let store = ctx.store.stats().await?;
    let last_sync = ctx
        .auth
        .current_user()
        .await?
        .and_then(|user| user.last_sync)
        .or(status.last_sync_time);

    if json {
        return print_json(&SyncReport {
            year: ctx.year,
            status,
            store,
        });
    }

    println!("Server:         {}", ctx.config.api_base_url);
    println!("Last sync:      {}", format_timestamp(last_sync));
    println!("Unsynced items: {}", store.unsynced_items);
    println!("Queued changes: {}", store.queued_changes);
    println!("Categories:     {}", store.categories_count);
    println!("Transactions:   {}", store.transactions_count);
    Ok(())
}

async fn run_watch(ctx: &AppContext, owner_id: i64) -> Result<(), CliError> {
    let coordinator = ctx.coordinator.clone();
    let scheduler = SyncScheduler::spawn(coordinator.clone());
    let printer = tokio::spawn(print_events(coordinator.clone()));

    let mut ticker = tokio::time::interval(coordinator.settings().watch_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    println!(
        "Watching {} every {:?}; press Ctrl-C to stop",
        ctx.year,
        coordinator.settings().watch_interval()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match coordinator.background_sync(owner_id, ctx.year).await {
                    Some(outcome) => println!("{}", describe_outcome(&outcome)),
                    None => println!("Server unreachable; will try again"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    scheduler.shutdown();
    printer.abort();
    println!("Stopped watching");
    Ok(())
}

async fn print_events(coordinator: Arc<SyncCoordinator<HttpApiClient>>) {
    let mut events = coordinator.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe_event(&event) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Event printer skipped {skipped} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

pub fn describe_event(event: &SyncEvent) -> Option<String> {
    match event.status {
        SyncEventStatus::Syncing => event.progress.map(|progress| format!("  syncing {progress}%")),
        SyncEventStatus::Error => Some(format!(
            "  sync error: {}",
            event.error.as_deref().unwrap_or("unknown")
        )),
        SyncEventStatus::Offline => Some("  offline".to_string()),
        SyncEventStatus::Online => Some("  online".to_string()),
        SyncEventStatus::Completed | SyncEventStatus::QuickSync | SyncEventStatus::QuickSyncCompleted => {
            None
        }
    }
}
