use chrono::Utc;
use tmm_core::models::{CategoryFields, CategoryRef, Transaction, TransactionPatch};
use tmm_core::{EntryKind, RecordKey, TransactionFields};

use crate::cli::TxCommands;
use crate::error::CliError;

use super::common::{
    format_amount, format_transaction_lines, parse_record_key, print_json, record_id,
    transaction_to_item, AppContext,
};

pub async fn run(ctx: &AppContext, command: TxCommands) -> Result<(), CliError> {
    ctx.require_session().await?;
    let mut transactions = ctx.transactions();
    transactions.load().await?;

    match command {
        TxCommands::List {
            kind,
            category,
            from,
            to,
            limit,
            json,
        } => {
            let mut listed: Vec<&Transaction> = match limit {
                Some(limit) => transactions.recent(limit),
                None => transactions.transactions().iter().collect(),
            };
            if let Some(kind) = kind {
                let kind = EntryKind::from(kind);
                listed.retain(|transaction| transaction.fields.kind == kind);
            }
            if let Some(category) = category {
                let category = CategoryRef::from(parse_record_key(&category)?);
                listed.retain(|transaction| transaction.fields.category == category);
            }
            if let (Some(from), Some(to)) = (from, to) {
                listed.retain(|transaction| {
                    transaction.fields.date >= from && transaction.fields.date <= to
                });
            }
            print_transactions(&listed, json, transactions.year())
        }
        TxCommands::Add {
            amount,
            category,
            kind,
            date,
            description,
        } => {
            let category_key = parse_record_key(&category)?;
            let kind = match kind {
                Some(kind) => EntryKind::from(kind),
                None => category_kind(ctx, &category_key, &category).await?,
            };
            let fields = TransactionFields {
                amount,
                date: date.unwrap_or_else(|| Utc::now().date_naive()),
                kind,
                category: CategoryRef::from(category_key),
                description,
            };
            let transaction = transactions.add(fields).await?;
            println!(
                "Added {} {} on {} ({})",
                transaction.fields.kind,
                format_amount(transaction.fields.amount, transaction.fields.kind),
                transaction.fields.date,
                record_id(&transaction)
            );
            Ok(())
        }
        TxCommands::Edit {
            id,
            amount,
            kind,
            category,
            date,
            description,
        } => {
            let key = parse_record_key(&id)?;
            let category = category
                .map(|raw| parse_record_key(&raw).map(CategoryRef::from))
                .transpose()?;
            let patch = TransactionPatch {
                amount,
                date,
                kind: kind.map(EntryKind::from),
                category,
                description,
            };
            if patch == TransactionPatch::default() {
                return Err(CliError::InvalidArgument(
                    "nothing to change; pass at least one field".to_string(),
                ));
            }
            let transaction = transactions.update(&key, patch).await?;
            println!(
                "Updated {}: {} {} on {}",
                record_id(&transaction),
                transaction.fields.kind,
                format_amount(transaction.fields.amount, transaction.fields.kind),
                transaction.fields.date
            );
            Ok(())
        }
        TxCommands::Delete { id } => {
            let key = parse_record_key(&id)?;
            transactions.delete(&key).await?;
            println!("Deleted transaction {id}");
            Ok(())
        }
        TxCommands::Search { query, json } => {
            let listed = transactions.search(&query);
            print_transactions(&listed, json, transactions.year())
        }
    }
}

async fn category_kind(
    ctx: &AppContext,
    key: &RecordKey,
    raw: &str,
) -> Result<EntryKind, CliError> {
    ctx.store
        .find_record::<CategoryFields>(key)
        .await?
        .filter(|category| !category.meta.deleted)
        .map(|category| category.fields.kind)
        .ok_or_else(|| CliError::CategoryNotFound(raw.to_string()))
}

fn print_transactions(listed: &[&Transaction], json: bool, year: i32) -> Result<(), CliError> {
    if json {
        let items = listed
            .iter()
            .map(|transaction| transaction_to_item(transaction))
            .collect::<Vec<_>>();
        return print_json(&items);
    }
    if listed.is_empty() {
        println!("No transactions for {year}");
        return Ok(());
    }
    for line in format_transaction_lines(listed) {
        println!("{line}");
    }
    Ok(())
}
