use serde::Serialize;
use tmm_core::services::StoreStats;
use tmm_core::stores::{CategoryTotal, MonthlySummary, Totals};
use tmm_core::EntryKind;

use crate::error::CliError;

use super::common::{category_ref_label, print_json, AppContext};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    year: i32,
    store: StoreStats,
    totals: Totals,
    months: Vec<MonthlySummary>,
    expenses_by_category: Vec<CategoryTotal>,
}

pub async fn run(ctx: &AppContext, json: bool) -> Result<(), CliError> {
    ctx.require_session().await?;
    let mut transactions = ctx.transactions();
    transactions.load().await?;

    let report = StatsReport {
        year: transactions.year(),
        store: ctx.store.stats().await?,
        totals: transactions.totals(),
        months: transactions.monthly_summary(),
        expenses_by_category: transactions.category_breakdown(EntryKind::Expense),
    };
    if json {
        return print_json(&report);
    }

    println!("Year {}", report.year);
    println!(
        "  income {:.2}  expenses {:.2}  balance {:.2}  ({} transactions)",
        report.totals.income, report.totals.expenses, report.totals.balance, report.totals.count
    );
    println!();
    for month in report
        .months
        .iter()
        .filter(|month| month.income > 0.0 || month.expenses > 0.0)
    {
        println!(
            "  {:>2}  +{:>10.2}  -{:>10.2}",
            month.month, month.income, month.expenses
        );
    }
    if !report.expenses_by_category.is_empty() {
        println!();
        println!("Expenses by category");
        for total in &report.expenses_by_category {
            println!("  {:<24} {:>10.2}", category_ref_label(&total.category), total.total);
        }
    }
    println!();
    println!(
        "Local store: {} categories, {} transactions, {} unsynced, {} queued",
        report.store.categories_count,
        report.store.transactions_count,
        report.store.unsynced_items,
        report.store.queued_changes
    );
    Ok(())
}
