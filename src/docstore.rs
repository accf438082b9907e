//! Document store access - aggregation pipelines against MongoDB

use crate::config::DocStoreSettings;
use crate::error::{Result, TabulatorError};
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document};
use mongodb::{Client, Database};
use serde_json::Value;
use tracing::{debug, info};

pub struct DocStore {
    database: Database,
}

impl DocStore {
    pub async fn connect(settings: &DocStoreSettings) -> Result<Self> {
        debug!("Connecting to document store database {}", settings.database);
        let client = Client::with_uri_str(&settings.uri).await?;
        Ok(Self {
            database: client.database(&settings.database),
        })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Run `pipeline` on `collection` and return every result document as
    /// relaxed extended JSON.
    pub async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Value>> {
        info!(
            "Running {}-stage pipeline on {}.{}",
            pipeline.len(),
            self.database.name(),
            collection
        );

        let mut cursor = self
            .database
            .collection::<Document>(collection)
            .aggregate(pipeline, None)
            .await?;

        let mut results = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            results.push(Bson::Document(doc).into_relaxed_extjson());
        }

        debug!("Pipeline returned {} documents", results.len());
        Ok(results)
    }
}

/// Convert a JSON array of stage objects into BSON documents.
pub fn pipeline_from_json(value: &Value) -> Result<Vec<Document>> {
    let stages = value
        .as_array()
        .ok_or_else(|| TabulatorError::Config("aggregation pipeline must be a JSON array".to_string()))?;

    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            if !stage.is_object() {
                return Err(TabulatorError::Config(format!("pipeline stage {} is not an object", i)));
            }
            bson::to_document(stage)
                .map_err(|e| TabulatorError::Config(format!("pipeline stage {}: {}", i, e)))
        })
        .collect()
}
