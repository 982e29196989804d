//! Transaction store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::api::RemoteApi;
use crate::models::{
    CategoryFields, CategoryRef, ChangeAction, EntryKind, Record, RecordFields, RecordKey,
    Transaction, TransactionFields, TransactionPatch, WriteOrigin,
};
use crate::services::LocalStore;
use crate::session::SessionContext;
use crate::sync::SyncCoordinator;
use crate::util::normalize_text_option;
use crate::{Error, Result};

use super::{push_changes, record_change};

/// Income, expenses and balance over a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
    pub count: usize,
}

impl Totals {
    fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut totals = Self::default();
        for transaction in transactions {
            match transaction.fields.kind {
                EntryKind::Income => totals.income += transaction.fields.amount,
                EntryKind::Expense => totals.expenses += transaction.fields.amount,
            }
            totals.count += 1;
        }
        totals.balance = totals.income - totals.expenses;
        totals
    }
}

/// One month of the yearly chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// 1-based month number
    pub month: u32,
    pub income: f64,
    pub expenses: f64,
}

/// Sum of one category's transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: CategoryRef,
    pub total: f64,
}

/// Transactions of the signed-in user for one year.
pub struct TransactionStore<A> {
    store: LocalStore,
    session: SessionContext,
    coordinator: Arc<SyncCoordinator<A>>,
    year: i32,
    transactions: Vec<Transaction>,
}

impl<A: RemoteApi> TransactionStore<A> {
    pub const fn new(
        store: LocalStore,
        session: SessionContext,
        coordinator: Arc<SyncCoordinator<A>>,
        year: i32,
    ) -> Self {
        Self {
            store,
            session,
            coordinator,
            year,
            transactions: Vec::new(),
        }
    }

    pub const fn year(&self) -> i32 {
        self.year
    }

    pub fn set_year(&mut self, year: i32) {
        self.year = year;
        self.transactions.clear();
    }

    pub async fn load(&mut self) -> Result<&[Transaction]> {
        let owner_id = self.session.owner_id().await?;
        self.transactions = self.store.get_records(owner_id, self.year).await?;
        Ok(&self.transactions)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn find(&self, key: &RecordKey) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|transaction| transaction.matches(key))
    }

    pub fn by_kind(&self, kind: EntryKind) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|transaction| transaction.fields.kind == kind)
            .collect()
    }

    pub fn by_category(&self, category: &CategoryRef) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|transaction| &transaction.fields.category == category)
            .collect()
    }

    /// Transactions dated within `[start, end]`.
    pub fn in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|transaction| (start..=end).contains(&transaction.fields.date))
            .collect()
    }

    /// Case-insensitive substring match on the description.
    pub fn search(&self, query: &str) -> Vec<&Transaction> {
        let needle = query.trim().to_lowercase();
        self.transactions
            .iter()
            .filter(|transaction| transaction.fields.description.to_lowercase().contains(&needle))
            .collect()
    }

    /// The `limit` most recent transactions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<&Transaction> {
        let mut sorted: Vec<&Transaction> = self.transactions.iter().collect();
        sorted.sort_by(|a, b| b.fields.date.cmp(&a.fields.date));
        sorted.truncate(limit);
        sorted
    }

    pub fn totals(&self) -> Totals {
        Totals::from_transactions(&self.transactions)
    }

    /// Totals for one month of the loaded year.
    pub fn month_totals(&self, month: u32) -> Totals {
        Totals::from_transactions(
            self.transactions
                .iter()
                .filter(|transaction| transaction.fields.date.month() == month),
        )
    }

    /// Twelve entries, January first.
    pub fn monthly_summary(&self) -> Vec<MonthlySummary> {
        let mut months: Vec<MonthlySummary> = (1..=12)
            .map(|month| MonthlySummary {
                month,
                ..MonthlySummary::default()
            })
            .collect();
        for transaction in &self.transactions {
            let Some(summary) = months.get_mut(transaction.fields.date.month0() as usize) else {
                continue;
            };
            match transaction.fields.kind {
                EntryKind::Income => summary.income += transaction.fields.amount,
                EntryKind::Expense => summary.expenses += transaction.fields.amount,
            }
        }
        months
    }

    /// Per-category sums for one kind, largest first.
    pub fn category_breakdown(&self, kind: EntryKind) -> Vec<CategoryTotal> {
        let mut totals: HashMap<&CategoryRef, f64> = HashMap::new();
        for transaction in self.by_kind(kind) {
            *totals.entry(&transaction.fields.category).or_default() += transaction.fields.amount;
        }
        let mut breakdown: Vec<CategoryTotal> = totals
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category: category.clone(),
                total,
            })
            .collect();
        breakdown.sort_by(|a, b| b.total.total_cmp(&a.total));
        breakdown
    }

    /// Record a transaction. It is filed under the year of its date.
    pub async fn add(&mut self, fields: TransactionFields) -> Result<Transaction> {
        let owner_id = self.session.owner_id().await?;
        let fields = self.validate(fields).await?;

        let transaction = self
            .store
            .save_record(Record::new(fields), owner_id, self.year, WriteOrigin::Local)
            .await?;
        if transaction.meta.year == self.year {
            self.transactions.push(transaction.clone());
        }
        record_change(&self.store, ChangeAction::Create, &transaction).await?;
        tracing::info!("Added transaction {}", transaction.fields.label());

        self.push(owner_id, transaction.meta.year).await?;
        Ok(transaction)
    }

    /// Apply a partial update. A new date in another year moves the record there.
    pub async fn update(
        &mut self,
        key: &RecordKey,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        let owner_id = self.session.owner_id().await?;
        if let Some(amount) = patch.amount {
            validate_amount(amount)?;
        }
        if let Some(category) = &patch.category {
            self.ensure_category_exists(category).await?;
        }
        let patch = TransactionPatch {
            description: patch
                .description
                .map(|text| normalize_text_option(Some(text)).unwrap_or_default()),
            ..patch
        };

        let transaction = self
            .store
            .update_record::<TransactionFields>(key, patch, owner_id, self.year)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {key}")))?;

        if transaction.meta.year == self.year {
            match self
                .transactions
                .iter_mut()
                .find(|existing| existing.matches(key))
            {
                Some(existing) => *existing = transaction.clone(),
                None => self.transactions.push(transaction.clone()),
            }
        } else {
            tracing::info!(
                "Transaction {key} moved from {} to {}",
                self.year,
                transaction.meta.year
            );
            self.transactions.retain(|existing| !existing.matches(key));
        }
        record_change(&self.store, ChangeAction::Update, &transaction).await?;

        self.push(owner_id, transaction.meta.year).await?;
        Ok(transaction)
    }

    pub async fn delete(&mut self, key: &RecordKey) -> Result<()> {
        let owner_id = self.session.owner_id().await?;
        let existing = self
            .store
            .find_record::<TransactionFields>(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {key}")))?;

        if !self
            .store
            .delete_record::<TransactionFields>(key, owner_id, self.year)
            .await?
        {
            return Err(Error::NotFound(format!("transaction {key}")));
        }
        self.transactions.retain(|transaction| !transaction.matches(key));
        record_change(&self.store, ChangeAction::Delete, &existing).await?;

        self.push(owner_id, self.year).await
    }

    async fn validate(&self, mut fields: TransactionFields) -> Result<TransactionFields> {
        validate_amount(fields.amount)?;
        self.ensure_category_exists(&fields.category).await?;
        fields.description = normalize_text_option(Some(fields.description)).unwrap_or_default();
        Ok(fields)
    }

    async fn ensure_category_exists(&self, category: &CategoryRef) -> Result<()> {
        let found = self
            .store
            .find_record::<CategoryFields>(&category.key())
            .await?
            .is_some_and(|record| !record.meta.deleted);
        if found {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "unknown category {}",
                category.key()
            )))
        }
    }

    async fn push(&mut self, owner_id: i64, year: i32) -> Result<()> {
        if push_changes(&self.coordinator, owner_id, year).await && year == self.year {
            self.load().await?;
        }
        Ok(())
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "amount must be a positive number, got {amount}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api::fake::FakeApi;
    use crate::stores::test_support::{fixture, Fixture, OWNER, YEAR};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn transaction_store(fixture: &Fixture) -> TransactionStore<FakeApi> {
        TransactionStore::new(
            fixture.store.clone(),
            fixture.session.clone(),
            fixture.coordinator.clone(),
            YEAR,
        )
    }

    async fn local_category(fixture: &Fixture, name: &str, kind: EntryKind) -> CategoryRef {
        let record = fixture
            .store
            .save_record(
                Record::new(CategoryFields::new(name, kind)),
                OWNER,
                YEAR,
                WriteOrigin::Local,
            )
            .await
            .unwrap();
        CategoryRef::from(record.key().unwrap())
    }

    fn fields(
        amount: f64,
        on: NaiveDate,
        kind: EntryKind,
        category: &CategoryRef,
        description: &str,
    ) -> TransactionFields {
        TransactionFields {
            amount,
            date: on,
            kind,
            category: category.clone(),
            description: description.to_string(),
        }
    }

    async fn seeded(fixture: &Fixture) -> (TransactionStore<FakeApi>, CategoryRef, CategoryRef) {
        let salary = local_category(fixture, "Salary", EntryKind::Income).await;
        let food = local_category(fixture, "Food", EntryKind::Expense).await;
        let mut transactions = transaction_store(fixture);
        for entry in [
            fields(3000.0, date(YEAR, 1, 31), EntryKind::Income, &salary, "January pay"),
            fields(12.5, date(YEAR, 2, 3), EntryKind::Expense, &food, "Lunch at work"),
            fields(40.0, date(YEAR, 2, 20), EntryKind::Expense, &food, "Weekly groceries"),
            fields(8.0, date(YEAR, 3, 1), EntryKind::Expense, &food, "lunch"),
        ] {
            transactions.add(entry).await.unwrap();
        }
        (transactions, salary, food)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn filters_and_search() {
        let fixture = fixture(false).await;
        let (transactions, salary, food) = seeded(&fixture).await;

        assert_eq!(transactions.transactions().len(), 4);
        assert_eq!(transactions.by_kind(EntryKind::Income).len(), 1);
        assert_eq!(transactions.by_category(&food).len(), 3);
        assert_eq!(transactions.by_category(&salary).len(), 1);
        assert_eq!(
            transactions
                .in_range(date(YEAR, 2, 1), date(YEAR, 2, 29))
                .len(),
            2
        );

        let lunches: Vec<&str> = transactions
            .search("LUNCH")
            .iter()
            .map(|transaction| transaction.fields.description.as_str())
            .collect();
        assert_eq!(lunches, vec!["Lunch at work", "lunch"]);

        let recent: Vec<NaiveDate> = transactions
            .recent(2)
            .iter()
            .map(|transaction| transaction.fields.date)
            .collect();
        assert_eq!(recent, vec![date(YEAR, 3, 1), date(YEAR, 2, 20)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn totals_and_breakdowns() {
        let fixture = fixture(false).await;
        let (transactions, _salary, food) = seeded(&fixture).await;

        let totals = transactions.totals();
        assert_eq!(totals.income, 3000.0);
        assert_eq!(totals.expenses, 60.5);
        assert_eq!(totals.balance, 2939.5);
        assert_eq!(totals.count, 4);

        assert_eq!(transactions.month_totals(2).expenses, 52.5);

        let months = transactions.monthly_summary();
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].income, 3000.0);
        assert_eq!(months[1].expenses, 52.5);
        assert_eq!(months[11], MonthlySummary { month: 12, income: 0.0, expenses: 0.0 });

        assert_eq!(
            transactions.category_breakdown(EntryKind::Expense),
            vec![CategoryTotal {
                category: food,
                total: 60.5
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_bad_amounts_and_unknown_categories() {
        let fixture = fixture(false).await;
        let food = local_category(&fixture, "Food", EntryKind::Expense).await;
        let mut transactions = transaction_store(&fixture);

        for amount in [0.0, -5.0, f64::NAN] {
            let error = transactions
                .add(fields(amount, date(YEAR, 1, 1), EntryKind::Expense, &food, ""))
                .await
                .unwrap_err();
            assert!(matches!(error, Error::InvalidInput(_)), "{amount}");
        }

        let error = transactions
            .add(fields(
                1.0,
                date(YEAR, 1, 1),
                EntryKind::Expense,
                &CategoryRef::Server(404),
                "",
            ))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert!(transactions.transactions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changing_year_moves_transaction_out_of_view() {
        let fixture = fixture(false).await;
        let food = local_category(&fixture, "Food", EntryKind::Expense).await;
        let mut transactions = transaction_store(&fixture);
        let added = transactions
            .add(fields(5.0, date(YEAR, 12, 31), EntryKind::Expense, &food, "NYE snack"))
            .await
            .unwrap();
        let key = added.key().unwrap();

        let moved = transactions
            .update(
                &key,
                TransactionPatch {
                    date: Some(date(YEAR + 1, 1, 1)),
                    ..TransactionPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.meta.year, YEAR + 1);
        assert!(transactions.find(&key).is_none());
        let next_year: Vec<Transaction> =
            fixture.store.get_records(OWNER, YEAR + 1).await.unwrap();
        assert_eq!(next_year.len(), 1);
        assert!(next_year[0].meta.needs_sync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_and_audit_trail() {
        let fixture = fixture(false).await;
        let (mut transactions, _salary, _food) = seeded(&fixture).await;
        let key = transactions.transactions()[0].key().unwrap();

        transactions.delete(&key).await.unwrap();

        assert_eq!(transactions.transactions().len(), 3);
        assert!(matches!(
            transactions.delete(&key).await.unwrap_err(),
            Error::NotFound(_)
        ));
        let queue = fixture.store.list_queue().await.unwrap();
        assert_eq!(queue.last().unwrap().action, ChangeAction::Delete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_add_uploads_category_and_transaction() {
        let fixture = fixture(true).await;
        let food = local_category(&fixture, "Food", EntryKind::Expense).await;
        let mut transactions = transaction_store(&fixture);

        transactions
            .add(fields(9.99, date(YEAR, 5, 5), EntryKind::Expense, &food, "Pizza"))
            .await
            .unwrap();

        let uploaded = fixture.api.server_transactions();
        assert_eq!(uploaded.len(), 1);
        assert!(matches!(uploaded[0].fields.category, CategoryRef::Server(_)));
        assert!(transactions.transactions()[0].meta.id.is_some());
    }
}
