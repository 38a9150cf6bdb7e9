//! Transaction Repository — `user_transactions`, an append-only log used
//! only to compute `transactionCount` per node for detail reporting.

use std::collections::HashMap;

use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database};

use crate::error::Result;
use crate::model::Transaction;

#[derive(Clone)]
pub struct TransactionRepository {
    collection: Collection<Document>,
}

impl TransactionRepository {
    pub fn new(db: Database) -> Self {
        Self { collection: db.collection("user_transactions") }
    }

    pub async fn insert(&self, txn: &Transaction) -> Result<()> {
        let mut doc = bson::to_document(txn)?;
        doc.insert("_id", &txn.id);
        self.collection.insert_one(doc).await?;
        Ok(())
    }

    pub async fn counts_by_node(&self, flow_id: &str) -> Result<HashMap<String, u64>> {
        let docs: Vec<Document> = self
            .collection
            .find(doc! { "flow_id": flow_id })
            .await?
            .try_collect()
            .await?;

        let mut counts = HashMap::new();
        for d in docs {
            if let Ok(node_id) = d.get_str("node_id") {
                *counts.entry(node_id.to_string()).or_insert(0u64) += 1;
            }
        }
        Ok(counts)
    }
}
