//! Trigger Projection Repository
//!
//! `flow_triggers` is a denormalized read-side projection rebuilt whenever a
//! flow is upserted or changes status, so the Trigger Matcher never has to
//! scan every node of every flow.

use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database};

use crate::error::Result;
use crate::model::{Flow, FlowNodeType, FlowStatus, NodeBody, TriggerProjection};

#[derive(Clone)]
pub struct TriggerProjectionRepository {
    collection: Collection<Document>,
}

impl TriggerProjectionRepository {
    pub fn new(db: Database) -> Self {
        Self { collection: db.collection("flow_triggers") }
    }

    pub async fn rebuild_for_flow(&self, flow: &Flow) -> Result<()> {
        self.collection.delete_many(doc! { "flow_id": &flow.id }).await?;

        let rows: Vec<TriggerProjection> = flow
            .nodes
            .iter()
            .filter(|n| n.flow_node_type == FlowNodeType::Trigger)
            .map(|n| TriggerProjection {
                node_id: n.id.clone(),
                flow_id: flow.id.clone(),
                brand_id: flow.brand_id.clone(),
                status: flow.status,
                updated_at: flow.updated_at,
                trigger_keywords: match &n.body {
                    NodeBody::TriggerKeyword { trigger_keywords } => Some(trigger_keywords.clone()),
                    _ => None,
                },
                trigger_template_id: match &n.body {
                    NodeBody::TriggerTemplate { trigger_template_id, .. } => Some(trigger_template_id.clone()),
                    _ => None,
                },
            })
            .collect();

        if rows.is_empty() {
            return Ok(());
        }

        let docs: Vec<Document> = rows
            .iter()
            .map(|r| {
                let mut d = bson::to_document(r).expect("trigger projection always serializes");
                d.insert("_id", format!("{}:{}", r.flow_id, r.node_id));
                d
            })
            .collect();
        self.collection.insert_many(docs).await?;
        Ok(())
    }

    pub async fn update_status_for_flow(&self, flow_id: &str, status: FlowStatus) -> Result<()> {
        let status_bson = bson::to_bson(&status)?;
        self.collection
            .update_many(doc! { "flow_id": flow_id }, doc! { "$set": { "status": status_bson } })
            .await?;
        Ok(())
    }

    pub async fn list_for_brand(&self, brand_id: &str) -> Result<Vec<TriggerProjection>> {
        let docs: Vec<Document> = self
            .collection
            .find(doc! { "brand_id": brand_id, "status": "published" })
            .await?
            .try_collect()
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|mut d| {
                d.remove("_id");
                bson::from_document(d).ok()
            })
            .collect())
    }
}
