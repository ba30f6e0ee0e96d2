//! Model metadata persistence

use reco_common::store::Store;
use reco_common::{Error, Result};

use super::MODELS_TABLE;
use crate::models::Model;

pub async fn save_model(store: &dyn Store, model: &Model) -> Result<()> {
    let value = serde_json::to_string(model)?;
    store.put(MODELS_TABLE, &model.name, &value).await
}

pub async fn load_model(store: &dyn Store, name: &str) -> Result<Option<Model>> {
    match store.get(MODELS_TABLE, name).await? {
        Some(value) => {
            let model = serde_json::from_str(&value).map_err(|e| {
                Error::Internal(format!("Failed to deserialize model {}: {}", name, e))
            })?;
            Ok(Some(model))
        }
        None => Ok(None),
    }
}

/// Load a model or fail with `NotFound`
pub async fn require_model(store: &dyn Store, name: &str) -> Result<Model> {
    load_model(store, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Model not found: {}", name)))
}
