//! Flow Repository
//!
//! `flows` holds aggregate metadata; the graph is normalized across
//! `flow_nodes` / `flow_edges` and assembled on read.

use bson::{doc, Document};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::model::{Edge, Flow, FlowStatus, Node};

#[derive(Clone)]
pub struct FlowRepository {
    flows: Collection<Document>,
    nodes: Collection<Document>,
    edges: Collection<Document>,
}

impl FlowRepository {
    pub fn new(db: Database) -> Self {
        Self {
            flows: db.collection("flows"),
            nodes: db.collection("flow_nodes"),
            edges: db.collection("flow_edges"),
        }
    }

    pub async fn get(&self, flow_id: &str) -> Result<Option<Flow>> {
        let Some(meta) = self.flows.find_one(doc! { "_id": flow_id }).await? else {
            return Ok(None);
        };
        let flow = self.assemble(meta).await?;
        Ok(Some(flow))
    }

    async fn assemble(&self, meta: Document) -> Result<Flow> {
        let flow_id = meta.get_str("_id").unwrap_or_default().to_string();

        let mut node_docs: Vec<Document> = self
            .nodes
            .find(doc! { "flow_id": &flow_id })
            .await?
            .try_collect()
            .await?;
        node_docs.sort_by(|a, b| a.get_str("id").unwrap_or("").cmp(b.get_str("id").unwrap_or("")));

        let nodes: Vec<Node> = node_docs
            .into_iter()
            .filter_map(|mut d| {
                d.remove("flow_id");
                d.remove("_id");
                match bson::from_document::<Node>(d) {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(flow_id = %flow_id, error = %e, "dropping unparseable node document");
                        None
                    }
                }
            })
            .collect();

        let mut edge_docs: Vec<Document> = self
            .edges
            .find(doc! { "flow_id": &flow_id })
            .await?
            .try_collect()
            .await?;
        edge_docs.sort_by(|a, b| a.get_str("id").unwrap_or("").cmp(b.get_str("id").unwrap_or("")));

        let edges: Vec<Edge> = edge_docs
            .into_iter()
            .filter_map(|mut d| {
                d.remove("flow_id");
                d.remove("_id");
                bson::from_document::<Edge>(d).ok()
            })
            .collect();

        let mut rebuilt = meta.clone();
        rebuilt.remove("_id");
        let mut flow: Flow = bson::from_document(rebuilt).map_err(StoreError::BsonDe)?;
        flow.id = flow_id;
        flow.nodes = nodes;
        flow.edges = edges;
        Ok(flow)
    }

    pub async fn upsert(&self, flow: &Flow) -> Result<()> {
        let mut meta = bson::to_document(flow)?;
        meta.remove("nodes");
        meta.remove("edges");
        meta.insert("_id", &flow.id);

        self.flows
            .replace_one(doc! { "_id": &flow.id }, meta)
            .upsert(true)
            .await?;

        self.nodes.delete_many(doc! { "flow_id": &flow.id }).await?;
        if !flow.nodes.is_empty() {
            let docs: Vec<Document> = flow
                .nodes
                .iter()
                .map(|n| {
                    let mut d = bson::to_document(n).expect("node always serializes");
                    d.insert("flow_id", &flow.id);
                    d.insert("_id", format!("{}:{}", flow.id, n.id));
                    d
                })
                .collect();
            self.nodes.insert_many(docs).await?;
        }

        self.edges.delete_many(doc! { "flow_id": &flow.id }).await?;
        if !flow.edges.is_empty() {
            let docs: Vec<Document> = flow
                .edges
                .iter()
                .map(|e| {
                    let mut d = bson::to_document(e).expect("edge always serializes");
                    d.insert("flow_id", &flow.id);
                    d.insert("_id", format!("{}:{}", flow.id, e.id));
                    d
                })
                .collect();
            self.edges.insert_many(docs).await?;
        }

        Ok(())
    }

    pub async fn list_by_owner(&self, user_id: &str, brand_id: Option<&str>) -> Result<Vec<Flow>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(brand) = brand_id {
            filter.insert("brand_id", brand);
        }
        let docs: Vec<Document> = self.flows.find(filter).await?.try_collect().await?;
        let mut flows = Vec::with_capacity(docs.len());
        for mut d in docs {
            let id = d.get_str("_id").unwrap_or_default().to_string();
            d.remove("_id");
            let mut flow: Flow = bson::from_document(d)?;
            flow.id = id;
            flows.push(flow);
        }
        Ok(flows)
    }

    pub async fn set_status(&self, flow_id: &str, status: FlowStatus) -> Result<Flow> {
        let Some(meta) = self.flows.find_one(doc! { "_id": flow_id }).await? else {
            return Err(StoreError::NotFound { entity: "flow", id: flow_id.to_string() });
        };
        let current: FlowStatus = bson::from_bson(meta.get("status").cloned().unwrap_or(bson::Bson::Null))?;
        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: format!("{current:?}"),
                to: format!("{status:?}"),
            });
        }

        let status_bson = bson::to_bson(&status)?;
        self.flows
            .update_one(
                doc! { "_id": flow_id },
                doc! { "$set": { "status": status_bson, "updated_at": bson::DateTime::from_chrono(Utc::now()) } },
            )
            .await?;

        self.get(flow_id).await?.ok_or_else(|| StoreError::NotFound { entity: "flow", id: flow_id.to_string() })
    }
}
