//! Delay Timer Repository — `delays`. Claiming is a single
//! `find_one_and_update` per candidate so two scheduler ticks (or a tick
//! racing a real inbound reply) can never both win the same row.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::error::Result;
use crate::model::{DelayTimer, UserStateKey};

#[derive(Clone)]
pub struct DelayTimerRepository {
    collection: Collection<Document>,
}

impl DelayTimerRepository {
    pub fn new(db: Database) -> Self {
        Self { collection: db.collection("delays") }
    }

    pub async fn insert(&self, timer: &DelayTimer) -> Result<()> {
        let mut doc = bson::to_document(timer)?;
        doc.insert("_id", &timer.id);
        self.collection.insert_one(doc).await?;
        Ok(())
    }

    pub async fn claim_expired(&self, now: DateTime<Utc>) -> Result<Vec<DelayTimer>> {
        let candidates: Vec<Document> = self
            .collection
            .find(doc! {
                "processed": false,
                "completes_at": { "$lte": bson::DateTime::from_chrono(now) },
            })
            .await?
            .try_collect()
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for doc in candidates {
            let Some(id) = doc.get_str("_id").ok().map(str::to_string) else { continue };
            let updated = self
                .collection
                .find_one_and_update(
                    doc! { "_id": &id, "processed": false },
                    doc! { "$set": { "processed": true } },
                )
                .return_document(ReturnDocument::After)
                .await?;
            if let Some(mut d) = updated {
                d.remove("_id");
                if let Ok(timer) = bson::from_document::<DelayTimer>(d) {
                    claimed.push(timer);
                }
            }
        }
        Ok(claimed)
    }

    pub async fn clear_for_user(&self, key: &UserStateKey) -> Result<()> {
        let key_bson = bson::to_bson(key)?;
        self.collection
            .delete_many(doc! { "user_state_key": key_bson, "processed": false })
            .await?;
        Ok(())
    }
}
