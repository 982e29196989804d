use chrono::Utc;

use crate::error::CliError;

use super::common::{format_relative_time, print_json, text_preview, AppContext};

pub async fn run(
    ctx: &AppContext,
    json: bool,
    clear: bool,
    drop: Option<i64>,
) -> Result<(), CliError> {
    ctx.require_session().await?;

    if let Some(id) = drop {
        if !ctx.store.remove_queue_entry(id).await? {
            return Err(CliError::InvalidArgument(format!("no queue entry {id}")));
        }
        println!("Removed queue entry {id}");
        return Ok(());
    }

    if clear {
        ctx.store.clear_queue().await?;
        println!("Change queue cleared");
        return Ok(());
    }

    let entries = ctx.store.list_queue().await?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No queued changes");
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for entry in &entries {
        println!(
            "{:>5}  {:<11} {:<6} {:>8}  retries={}  {}",
            entry.id,
            entry.entity.as_str(),
            entry.action.as_str(),
            format_relative_time(entry.timestamp.timestamp_millis(), now_ms),
            entry.retry_count,
            text_preview(&entry.payload.to_string(), 60)
        );
    }
    Ok(())
}
