//! Insert Task Module
//!
//! The unit of work the concurrent strategy hands to the worker pool.

use crate::{SubBatch, store::RecordStore};
use std::sync::Arc;
use tracing::{error, info};

/// Inserts one sub-batch in its own transaction
///
/// Owns its rows; shares the store with its siblings.
pub struct InsertTask {
    batch: SubBatch,
    store: Arc<RecordStore>,
}

impl InsertTask {
    pub fn new(batch: SubBatch, store: Arc<RecordStore>) -> Self {
        Self { batch, store }
    }

    pub fn batch(&self) -> &SubBatch {
        &self.batch
    }

    /// Insert the sub-batch
    ///
    /// Errors never escape: they are logged and reported as `false`, so a
    /// failing sub-batch cannot take its siblings down with it.
    ///
    /// # Returns
    /// `true` if every row was committed, `false` if the batch was rolled back
    pub async fn run(self) -> bool {
        for row in &self.batch.rows {
            info!("Working data: {}, {}", row.first_name, row.last_name);
        }

        match self.store.insert_batch(&self.batch.rows).await {
            Ok(_) => true,
            Err(e) => {
                error!(sub_batch = self.batch.index, "Insert task failed: {}", e);
                false
            }
        }
    }
}
