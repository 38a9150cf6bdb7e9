//! Variable Context Repository — `flow_user_context`, one document per
//! `(user_state_key, flow_id)`.

use std::collections::HashMap;

use bson::{doc, Document};
use mongodb::{Collection, Database};

use crate::error::Result;
use crate::model::UserStateKey;

#[derive(Clone)]
pub struct VariableContextRepository {
    collection: Collection<Document>,
}

impl VariableContextRepository {
    pub fn new(db: Database) -> Self {
        Self { collection: db.collection("flow_user_context") }
    }

    fn doc_id(key: &UserStateKey, flow_id: &str) -> String {
        format!("{}:{}", key.as_id(), flow_id)
    }

    pub async fn get(&self, key: &UserStateKey, flow_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self.snapshot(key, flow_id).await?.get(name).cloned())
    }

    pub async fn set(&self, key: &UserStateKey, flow_id: &str, name: &str, value: &str) -> Result<()> {
        let id = Self::doc_id(key, flow_id);
        let mut set_doc = Document::new();
        set_doc.insert(format!("vars.{name}"), value);
        set_doc.insert("user_state_key", bson::to_bson(key)?);
        set_doc.insert("flow_id", flow_id);

        self.collection
            .update_one(doc! { "_id": &id }, doc! { "$set": set_doc })
            .upsert(true)
            .await?;
        Ok(())
    }

    pub async fn snapshot(&self, key: &UserStateKey, flow_id: &str) -> Result<HashMap<String, String>> {
        let id = Self::doc_id(key, flow_id);
        let Some(doc) = self.collection.find_one(doc! { "_id": &id }).await? else {
            return Ok(HashMap::new());
        };
        let vars = doc.get_document("vars").cloned().unwrap_or_default();
        Ok(vars
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect())
    }
}
