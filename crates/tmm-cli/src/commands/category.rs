use tmm_core::EntryKind;

use crate::cli::CategoryCommands;
use crate::error::CliError;

use super::common::{
    category_to_item, format_category_lines, parse_record_key, print_json, record_id, AppContext,
};

pub async fn run(ctx: &AppContext, command: CategoryCommands) -> Result<(), CliError> {
    ctx.require_session().await?;
    let mut categories = ctx.categories();
    categories.load().await?;

    match command {
        CategoryCommands::List { kind, json } => {
            let listed = match kind {
                Some(kind) => categories.by_kind(EntryKind::from(kind)),
                None => categories.categories().iter().collect(),
            };
            if json {
                let items = listed.iter().map(|c| category_to_item(c)).collect::<Vec<_>>();
                return print_json(&items);
            }
            if listed.is_empty() {
                println!("No categories for {}", categories.year());
                return Ok(());
            }
            for line in format_category_lines(&listed) {
                println!("{line}");
            }
            Ok(())
        }
        CategoryCommands::Add { name, kind } => {
            let category = categories.add(&name, EntryKind::from(kind)).await?;
            println!(
                "Added {} category {} ({})",
                category.fields.kind,
                category.fields.name,
                record_id(&category)
            );
            Ok(())
        }
        CategoryCommands::Rename { id, name } => {
            let key = parse_record_key(&id)?;
            if categories.find(&key).is_none() {
                return Err(CliError::CategoryNotFound(id));
            }
            let category = categories.rename(&key, &name).await?;
            println!("Renamed {} to {}", record_id(&category), category.fields.name);
            Ok(())
        }
        CategoryCommands::Delete { id } => {
            let key = parse_record_key(&id)?;
            if categories.find(&key).is_none() {
                return Err(CliError::CategoryNotFound(id));
            }
            categories.delete(&key).await?;
            println!("Deleted category {id}");
            Ok(())
        }
    }
}
