//! Category store.

use std::sync::Arc;

use crate::api::RemoteApi;
use crate::models::{
    Category, CategoryFields, CategoryPatch, CategoryRef, ChangeAction, EntryKind, Record,
    RecordKey, WriteOrigin,
};
use crate::services::LocalStore;
use crate::session::SessionContext;
use crate::sync::SyncCoordinator;
use crate::{Error, Result};

use super::{push_changes, record_change};

/// Categories of the signed-in user for one year.
pub struct CategoryStore<A> {
    store: LocalStore,
    session: SessionContext,
    coordinator: Arc<SyncCoordinator<A>>,
    year: i32,
    categories: Vec<Category>,
}

impl<A: RemoteApi> CategoryStore<A> {
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
            categories: Vec::new(),
        }
    }

    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Switch to another year. Call [`Self::load`] afterwards.
    pub fn set_year(&mut self, year: i32) {
        self.year = year;
        self.categories.clear();
    }

    /// Reload from the local store.
    pub async fn load(&mut self) -> Result<&[Category]> {
        let owner_id = self.session.owner_id().await?;
        self.categories = self.store.get_records(owner_id, self.year).await?;
        tracing::debug!(
            "Loaded {} categories for {owner_id}_{}",
            self.categories.len(),
            self.year
        );
        Ok(&self.categories)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn income(&self) -> Vec<&Category> {
        self.by_kind(EntryKind::Income)
    }

    pub fn expense(&self) -> Vec<&Category> {
        self.by_kind(EntryKind::Expense)
    }

    pub fn by_kind(&self, kind: EntryKind) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|category| category.fields.kind == kind)
            .collect()
    }

    pub fn find(&self, key: &RecordKey) -> Option<&Category> {
        self.categories.iter().find(|category| category.matches(key))
    }

    pub async fn add(&mut self, name: &str, kind: EntryKind) -> Result<Category> {
        let name = validate_name(name)?;
        let owner_id = self.session.owner_id().await?;

        let category = self
            .store
            .save_record(
                Record::new(CategoryFields::new(name, kind)),
                owner_id,
                self.year,
                WriteOrigin::Local,
            )
            .await?;
        self.categories.push(category.clone());
        record_change(&self.store, ChangeAction::Create, &category).await?;
        tracing::info!("Added {kind} category '{}'", category.fields.name);

        self.push(owner_id).await?;
        Ok(category)
    }

    pub async fn update(&mut self, key: &RecordKey, patch: CategoryPatch) -> Result<Category> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        let patch = CategoryPatch {
            name: patch.name.map(|name| name.trim().to_string()),
            ..patch
        };
        let owner_id = self.session.owner_id().await?;

        let category = self
            .store
            .update_record::<CategoryFields>(key, patch, owner_id, self.year)
            .await?
            .ok_or_else(|| Error::NotFound(format!("category {key}")))?;
        match self.categories.iter_mut().find(|existing| existing.matches(key)) {
            Some(existing) => *existing = category.clone(),
            None => self.categories.push(category.clone()),
        }
        record_change(&self.store, ChangeAction::Update, &category).await?;

        self.push(owner_id).await?;
        Ok(category)
    }

    pub async fn rename(&mut self, key: &RecordKey, name: &str) -> Result<Category> {
        self.update(
            key,
            CategoryPatch {
                name: Some(name.to_string()),
                kind: None,
            },
        )
        .await
    }

    /// Delete a user category. Default categories and categories still used by
    /// a transaction are refused.
    pub async fn delete(&mut self, key: &RecordKey) -> Result<()> {
        let owner_id = self.session.owner_id().await?;
        let existing = self
            .store
            .find_record::<CategoryFields>(key)
            .await?
            .filter(|category| {
                !category.meta.deleted
                    && category.meta.owner_id == owner_id
                    && category.meta.year == self.year
            })
            .ok_or_else(|| Error::NotFound(format!("category {key}")))?;

        if existing.fields.is_default {
            return Err(Error::InvalidInput(
                "Cannot delete default categories".to_string(),
            ));
        }
        let reference = existing
            .key()
            .map_or_else(|| CategoryRef::from(key.clone()), CategoryRef::from);
        let in_use = self
            .store
            .count_category_references(owner_id, &reference)
            .await?;
        if in_use > 0 {
            return Err(Error::InvalidInput(format!(
                "Category '{}' is used by {in_use} transaction(s)",
                existing.fields.name
            )));
        }

        if !self
            .store
            .delete_record::<CategoryFields>(key, owner_id, self.year)
            .await?
        {
            return Err(Error::NotFound(format!("category {key}")));
        }
        self.categories.retain(|category| !category.matches(key));
        record_change(&self.store, ChangeAction::Delete, &existing).await?;
        tracing::info!("Deleted category '{}'", existing.fields.name);

        self.push(owner_id).await
    }

    async fn push(&mut self, owner_id: i64) -> Result<()> {
        if push_changes(&self.coordinator, owner_id, self.year).await {
            self.load().await?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Category name must not be empty".to_string(),
        ));
    }
    Ok(name)
}
