//! User State Repository — one document per user-state key.

use bson::{doc, Document};
use mongodb::{Collection, Database};

use crate::error::Result;
use crate::model::{UserState, UserStateKey};

#[derive(Clone)]
pub struct UserStateRepository {
    collection: Collection<Document>,
}

impl UserStateRepository {
    pub fn new(db: Database) -> Self {
        Self { collection: db.collection("users") }
    }

    pub async fn get(&self, key: &UserStateKey) -> Result<Option<UserState>> {
        let id = key.as_id();
        let Some(mut doc) = self.collection.find_one(doc! { "_id": &id }).await? else {
            return Ok(None);
        };
        doc.remove("_id");
        Ok(Some(bson::from_document(doc)?))
    }

    pub async fn save(&self, state: &UserState) -> Result<()> {
        let mut doc = bson::to_document(state)?;
        doc.insert("_id", state.key.as_id());
        self.collection
            .replace_one(doc! { "_id": state.key.as_id() }, doc)
            .upsert(true)
            .await?;
        Ok(())
    }
}
