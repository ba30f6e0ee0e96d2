//! Model lifecycle
//!
//! Two stages, STAGED and PUBLISHED. Publish and Stage are the only stage
//! transitions and each is gated on the opposite current stage. Delete and
//! UpdateSignalType are STAGED-only and change data and version, never stage.
//!
//! | Operation          | From      | To        | Data                                 | Version   |
//! |--------------------|-----------|-----------|--------------------------------------|-----------|
//! | publish            | STAGED    | PUBLISHED | staging → production, staging cleared | major + 1 |
//! | stage              | PUBLISHED | STAGED    | production → staging, production cleared | minor + 1 |
//! | delete             | STAGED    | STAGED    | staging cleared                      | 0.1.0     |
//! | update_signal_type | STAGED    | STAGED    | staging cleared                      | patch + 1 |
//!
//! Keyspace migration is copy-then-truncate and is not transactional: a crash
//! between the copy and the truncate leaves the records in both keyspaces.
//! Re-running the same transition is not possible afterwards because the
//! stage was not yet switched, so an operator must truncate by hand.
//!
//! The lifecycle holds no locks. Callers serialize transitions per model.

use std::sync::Arc;

use reco_common::store::Store;
use reco_common::{Error, Result};

use crate::db;
use crate::models::record::decode_items;
use crate::models::{ItemScore, Model, SemVer, Stage};

/// Stage/version owner for recommendation models
#[derive(Clone)]
pub struct ModelLifecycle {
    store: Arc<dyn Store>,
}

impl ModelLifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a STAGED model at version 0.1.0.
    ///
    /// Shape validation runs before anything touches the store.
    pub async fn create(
        &self,
        name: &str,
        concatenator: &str,
        signal_order: Vec<String>,
    ) -> Result<Model> {
        let model = Model::new(name, concatenator, signal_order)?;

        if db::models::load_model(self.store.as_ref(), name).await?.is_some() {
            return Err(Error::Conflict(format!("Model already exists: {}", name)));
        }

        db::models::save_model(self.store.as_ref(), &model).await?;

        tracing::info!(
            model = %model.name,
            version = %model.version,
            signal_order = ?model.signal_order,
            "Model created"
        );
        Ok(model)
    }

    pub async fn get(&self, name: &str) -> Result<Model> {
        db::models::require_model(self.store.as_ref(), name).await
    }

    /// STAGED → PUBLISHED: move staged records into production, bump major
    pub async fn publish(&self, name: &str) -> Result<Model> {
        let mut model = self.get(name).await?;
        if model.stage != Stage::Staged {
            return Err(Error::Conflict(format!("Model {} is already published", name)));
        }

        let moved = self
            .migrate(&model.staging_table(), &model.production_table())
            .await?;

        let old_version = model.version;
        model.stage = Stage::Published;
        model.version = model.version.bump_major();
        model.touch();
        db::models::save_model(self.store.as_ref(), &model).await?;

        tracing::info!(
            model = %model.name,
            old_version = %old_version,
            new_version = %model.version,
            records = moved,
            "Model published"
        );
        Ok(model)
    }

    /// PUBLISHED → STAGED: move production records back to staging, bump minor
    pub async fn stage(&self, name: &str) -> Result<Model> {
        let mut model = self.get(name).await?;
        if model.stage != Stage::Published {
            return Err(Error::Conflict(format!("Model {} is already staged", name)));
        }

        let moved = self
            .migrate(&model.production_table(), &model.staging_table())
            .await?;

        let old_version = model.version;
        model.stage = Stage::Staged;
        model.version = model.version.bump_minor();
        model.touch();
        db::models::save_model(self.store.as_ref(), &model).await?;

        tracing::info!(
            model = %model.name,
            old_version = %old_version,
            new_version = %model.version,
            records = moved,
            "Model staged"
        );
        Ok(model)
    }

    /// Clear a STAGED model's data and reset its version to 0.1.0
    pub async fn delete(&self, name: &str) -> Result<Model> {
        let mut model = self.get(name).await?;
        if model.stage != Stage::Staged {
            return Err(Error::Conflict(format!(
                "Cannot delete a published model: {}",
                name
            )));
        }

        self.store.truncate(&model.active_table()).await?;

        let old_version = model.version;
        model.version = SemVer::INITIAL;
        model.touch();
        db::models::save_model(self.store.as_ref(), &model).await?;

        tracing::info!(
            model = %model.name,
            old_version = %old_version,
            new_version = %model.version,
            "Model data deleted"
        );
        Ok(model)
    }

    /// Replace the signal shape of a STAGED model.
    ///
    /// Existing signals no longer fit the new arity, so the staged data is
    /// cleared. `concatenator` keeps the current one when `None`. The new
    /// shape is validated before any data is removed.
    pub async fn update_signal_type(
        &self,
        name: &str,
        signal_order: Vec<String>,
        concatenator: Option<String>,
    ) -> Result<Model> {
        let mut model = self.get(name).await?;
        if model.stage != Stage::Staged {
            return Err(Error::Conflict(format!(
                "Cannot change the signal type of a published model: {}",
                name
            )));
        }

        let concatenator = concatenator.unwrap_or_else(|| model.concatenator.clone());
        crate::models::model::validate_signal_shape(&concatenator, &signal_order)?;

        self.store.truncate(&model.active_table()).await?;

        let old_version = model.version;
        model.signal_order = signal_order;
        model.concatenator = concatenator;
        model.version = model.version.bump_patch();
        model.touch();
        db::models::save_model(self.store.as_ref(), &model).await?;

        tracing::info!(
            model = %model.name,
            old_version = %old_version,
            new_version = %model.version,
            signal_order = ?model.signal_order,
            "Model signal type updated"
        );
        Ok(model)
    }

    /// Remove one signal from a STAGED model
    pub async fn remove_signal(&self, name: &str, signal: &str) -> Result<()> {
        let model = self.get(name).await?;
        if model.stage != Stage::Staged {
            return Err(Error::Conflict(format!(
                "Model {} is published and read-only",
                name
            )));
        }

        let table = model.active_table();
        if self.store.get(&table, signal).await?.is_none() {
            return Err(Error::NotFound(format!(
                "Signal {} not found in model {}",
                signal, name
            )));
        }
        self.store.delete(&table, signal).await
    }

    /// Serving read: the production list stored under `signal`
    pub async fn recommendations(&self, name: &str, signal: &str) -> Result<Vec<ItemScore>> {
        let model = self.get(name).await?;
        if !model.is_published() {
            return Err(Error::Conflict(format!("Model {} is not published", name)));
        }

        let value = self
            .store
            .get(&model.production_table(), signal)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Signal {} not found in model {}", signal, name))
            })?;

        decode_items(&value).map_err(|e| {
            Error::Internal(format!("Stored items for {}/{} are unreadable: {}", name, signal, e))
        })
    }

    /// Copy every record of `from` into `to`, then truncate `from`
    async fn migrate(&self, from: &str, to: &str) -> Result<usize> {
        let records = self.store.scan_all(from).await?;

        let mut batch = self.store.batch();
        for record in &records {
            batch.buffered_put(to, &record.key, &record.value);
        }
        batch.flush().await?;

        self.store.truncate(from).await?;

        tracing::debug!(from, to, records = records.len(), "Keyspace migrated");
        Ok(records.len())
    }
}
