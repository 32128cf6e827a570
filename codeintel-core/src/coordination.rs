//! # Agent Coordination Engine
//!
//! Claim lifecycle over the shared graph store: acquire with conflict
//! detection, idempotent release, staleness invalidation after builds,
//! TTL expiry, and per-project overviews. The engine holds no state of
//! its own; every claim is a CLAIM node and closure is a property merge
//! that never touches `valid_from`.

use crate::constants::coordination::{DEFAULT_CLAIM_MAX_AGE_MS, STATUS_RECENT_EPISODES};
use crate::error::Result;
use crate::store::{GraphStore, PropertyFilter, ids};
use crate::types::{EdgeKind, GraphEdge, GraphNode, NodeLabel, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What kind of thing a claim targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Task,
    File,
    Function,
    Feature,
}

/// Why a claim was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Released,
    CodeChanged,
    TaskCompleted,
    Expired,
}

impl InvalidationReason {
    fn as_str(self) -> &'static str {
        match self {
            InvalidationReason::Released => "released",
            InvalidationReason::CodeChanged => "code_changed",
            InvalidationReason::TaskCompleted => "task_completed",
            InvalidationReason::Expired => "expired",
        }
    }
}

/// Request to open a claim
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimInput {
    pub agent_id: String,
    pub session_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub claim_type: ClaimType,
    pub target_id: String,
    pub intent: String,
}

/// The open claim blocking an acquisition
#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub agent_id: String,
    pub intent: String,
    /// When the conflicting claim was opened, epoch ms
    pub since: i64,
}

/// Outcome of a claim attempt; a conflict is a successful return
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum ClaimResult {
    #[serde(rename = "ok")]
    Ok {
        claim_id: String,
        target_version_sha: String,
    },
    #[serde(rename = "CONFLICT")]
    Conflict { conflict: ConflictInfo },
}

/// Outcome of a release; releasing a closed claim is not an error
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseResult {
    pub found: bool,
    pub already_closed: bool,
}

/// An agent's current standing in a project
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub active_claims: Vec<ClaimSummary>,
    pub recent_episodes: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Condensed view of one claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimSummary {
    pub claim_id: String,
    pub agent_id: String,
    pub target_id: String,
    pub intent: String,
    pub since: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Project-wide coordination snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationOverview {
    pub active: Vec<ClaimSummary>,
    pub stale_count: usize,
    /// Targets claimed by more than one agent over time, with the agents
    pub contested_targets: Vec<(String, Vec<String>)>,
    pub per_agent: HashMap<String, usize>,
    pub total_claims: usize,
}

/// Stateless claim engine over the graph store
pub struct CoordinationEngine {
    graph: Arc<dyn GraphStore>,
}

impl CoordinationEngine {
    /// Engine over the shared store
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Attempt to open a claim.
    ///
    /// A claim on a target held open by a different agent returns a
    /// conflict. A claim on a nonexistent target succeeds with an
    /// `unknown` version stamp so agents can claim work they are about
    /// to create.
    pub async fn claim(&self, project_id: &str, input: &ClaimInput) -> Result<ClaimResult> {
        let open_on_target = self.open_claims_on(project_id, &input.target_id).await?;
        if let Some(other) = open_on_target
            .iter()
            .find(|c| c.prop_str("agent_id") != Some(input.agent_id.as_str()))
        {
            debug!(
                project_id,
                target = %input.target_id,
                holder = other.prop_str("agent_id").unwrap_or("?"),
                "claim conflict"
            );
            return Ok(ClaimResult::Conflict {
                conflict: ConflictInfo {
                    agent_id: other.prop_str("agent_id").unwrap_or_default().to_string(),
                    intent: other.prop_str("intent").unwrap_or_default().to_string(),
                    since: other.valid_from,
                },
            });
        }

        let target = self.lookup_target(project_id, &input.target_id).await?;
        let target_version_sha = target
            .as_ref()
            .map_or_else(|| "unknown".to_string(), GraphNode::version_sha);

        let claim_id = Uuid::new_v4().to_string();
        let mut node = GraphNode::new(&claim_id, NodeLabel::Claim, project_id)
            .with_prop("agent_id", input.agent_id.as_str())
            .with_prop("session_id", input.session_id.as_str())
            .with_prop("claim_type", serde_json::to_value(input.claim_type)?)
            .with_prop("target_id", input.target_id.as_str())
            .with_prop("intent", input.intent.as_str())
            .with_prop("target_version_sha", target_version_sha.as_str())
            .with_prop("valid_to", Value::Null);
        if let Some(task_id) = &input.task_id {
            node.properties
                .insert("task_id".into(), Value::String(task_id.clone()));
        }
        node.valid_from = now_ms();
        self.graph.upsert_nodes(std::slice::from_ref(&node)).await?;

        if let Some(target) = target {
            let edge = GraphEdge::new(&claim_id, &target.id, EdgeKind::Targets, project_id);
            self.graph.upsert_edges(std::slice::from_ref(&edge)).await?;
        }

        info!(project_id, claim_id = %claim_id, agent = %input.agent_id, "claim opened");
        Ok(ClaimResult::Ok {
            claim_id,
            target_version_sha,
        })
    }

    /// Close a claim. Idempotent: a second release reports
    /// `already_closed` and mutates nothing.
    pub async fn release(
        &self,
        project_id: &str,
        claim_id: &str,
        outcome: Option<&str>,
    ) -> Result<ReleaseResult> {
        let Some(claim) = self.graph.get_node(project_id, claim_id).await? else {
            return Ok(ReleaseResult {
                found: false,
                already_closed: false,
            });
        };
        if !is_open(&claim) {
            return Ok(ReleaseResult {
                found: true,
                already_closed: true,
            });
        }

        let mut props = close_props(InvalidationReason::Released);
        if let Some(outcome) = outcome {
            props.insert("outcome".into(), Value::String(outcome.to_string()));
        }
        self.graph.update_node(project_id, claim_id, props).await?;
        info!(project_id, claim_id, "claim released");
        Ok(ReleaseResult {
            found: true,
            already_closed: false,
        })
    }

    /// Close every open claim whose target changed after the claim was
    /// opened. Runs as a post-build hook.
    pub async fn invalidate_stale(&self, project_id: &str) -> Result<usize> {
        let mut closed = 0;
        for claim in self.open_claims(project_id).await? {
            let Some(target_id) = claim.prop_str("target_id") else {
                continue;
            };
            let Some(target) = self.lookup_target(project_id, target_id).await? else {
                // Forward claims have no node to go stale against
                continue;
            };
            if target.valid_from > claim.valid_from {
                self.graph
                    .update_node(
                        project_id,
                        &claim.id,
                        close_props(InvalidationReason::CodeChanged),
                    )
                    .await?;
                closed += 1;
            }
        }
        if closed > 0 {
            info!(project_id, closed, "stale claims invalidated");
        }
        Ok(closed)
    }

    /// Close every open claim older than `max_age_ms` (default 24h)
    pub async fn expire_old(&self, project_id: &str, max_age_ms: Option<i64>) -> Result<usize> {
        let cutoff = now_ms() - max_age_ms.unwrap_or(DEFAULT_CLAIM_MAX_AGE_MS);
        let mut closed = 0;
        for claim in self.open_claims(project_id).await? {
            if claim.valid_from < cutoff {
                self.graph
                    .update_node(project_id, &claim.id, close_props(InvalidationReason::Expired))
                    .await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Close every open claim on a finished task
    pub async fn on_task_completed(
        &self,
        project_id: &str,
        task_id: &str,
        agent_id: &str,
    ) -> Result<usize> {
        let mut closed = 0;
        for claim in self.open_claims(project_id).await? {
            if claim.prop_str("task_id") == Some(task_id) {
                self.graph
                    .update_node(
                        project_id,
                        &claim.id,
                        close_props(InvalidationReason::TaskCompleted),
                    )
                    .await?;
                closed += 1;
            }
        }
        if closed > 0 {
            info!(project_id, task_id, agent_id, closed, "task claims closed");
        }
        Ok(closed)
    }

    /// Active claims plus recent episodes for one agent
    pub async fn status(&self, project_id: &str, agent_id: &str) -> Result<AgentStatus> {
        let active: Vec<ClaimSummary> = self
            .open_claims(project_id)
            .await?
            .iter()
            .filter(|c| c.prop_str("agent_id") == Some(agent_id))
            .map(summarize)
            .collect();

        let current_task = active.iter().find_map(|c| c.task_id.clone());

        let filter = PropertyFilter::new().with("agent_id", agent_id);
        let mut episodes = self
            .graph
            .find_nodes(project_id, Some(NodeLabel::Episode), &filter)
            .await?;
        episodes.sort_by_key(|e| std::cmp::Reverse(e.valid_from));
        episodes.truncate(STATUS_RECENT_EPISODES);
        let recent_episodes = episodes
            .into_iter()
            .map(|e| {
                let mut value = Map::new();
                value.insert("id".into(), Value::String(e.id.clone()));
                value.insert("timestamp".into(), ids::narrow_js_int(e.valid_from));
                if let Some(t) = e.prop_str("episode_type") {
                    value.insert("type".into(), Value::String(t.to_string()));
                }
                if let Some(c) = e.prop_str("content") {
                    value.insert("content".into(), Value::String(c.to_string()));
                }
                Value::Object(value)
            })
            .collect();

        Ok(AgentStatus {
            agent_id: agent_id.to_string(),
            active_claims: active,
            recent_episodes,
            current_task,
        })
    }

    /// Project-wide snapshot of coordination state
    pub async fn overview(&self, project_id: &str) -> Result<CoordinationOverview> {
        let all = self
            .graph
            .find_nodes(project_id, Some(NodeLabel::Claim), &PropertyFilter::new())
            .await?;

        let active: Vec<ClaimSummary> = all.iter().filter(|c| is_open(c)).map(summarize).collect();
        let stale_count = all
            .iter()
            .filter(|c| c.prop_str("invalidation_reason") == Some("code_changed"))
            .count();

        let mut by_target: HashMap<&str, Vec<String>> = HashMap::new();
        for claim in &all {
            if let (Some(target), Some(agent)) =
                (claim.prop_str("target_id"), claim.prop_str("agent_id"))
            {
                let agents = by_target.entry(target).or_default();
                if !agents.iter().any(|a| a == agent) {
                    agents.push(agent.to_string());
                }
            }
        }
        let mut contested_targets: Vec<(String, Vec<String>)> = by_target
            .into_iter()
            .filter(|(_, agents)| agents.len() > 1)
            .map(|(target, agents)| (target.to_string(), agents))
            .collect();
        contested_targets.sort_by(|a, b| a.0.cmp(&b.0));

        let mut per_agent: HashMap<String, usize> = HashMap::new();
        for claim in &active {
            *per_agent.entry(claim.agent_id.clone()).or_insert(0) += 1;
        }

        Ok(CoordinationOverview {
            active,
            stale_count,
            contested_targets,
            per_agent,
            total_claims: all.len(),
        })
    }

    async fn open_claims(&self, project_id: &str) -> Result<Vec<GraphNode>> {
        let filter = PropertyFilter::new().with("valid_to", Value::Null);
        self.graph
            .find_nodes(project_id, Some(NodeLabel::Claim), &filter)
            .await
    }

    async fn open_claims_on(&self, project_id: &str, target_id: &str) -> Result<Vec<GraphNode>> {
        let filter = PropertyFilter::new()
            .with("valid_to", Value::Null)
            .with("target_id", target_id);
        self.graph
            .find_nodes(project_id, Some(NodeLabel::Claim), &filter)
            .await
    }

    /// Exact id first, then symbol-name fallback for `basename:name:line`
    /// shaped references
    async fn lookup_target(&self, project_id: &str, target_id: &str) -> Result<Option<GraphNode>> {
        if let Some(node) = self.graph.get_node(project_id, target_id).await? {
            return Ok(Some(node));
        }
        let Some(name) = ids::normalize_symbol_name(target_id) else {
            return Ok(None);
        };
        let filter = PropertyFilter::new().with("name", name);
        for label in [NodeLabel::Function, NodeLabel::Class, NodeLabel::File] {
            let mut matches = self.graph.find_nodes(project_id, Some(label), &filter).await?;
            if let Some(node) = matches.pop() {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }
}

fn is_open(claim: &GraphNode) -> bool {
    claim
        .properties
        .get("valid_to")
        .is_none_or(Value::is_null)
}

fn close_props(reason: InvalidationReason) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("valid_to".into(), Value::from(now_ms()));
    props.insert(
        "invalidation_reason".into(),
        Value::String(reason.as_str().to_string()),
    );
    props
}

fn summarize(claim: &GraphNode) -> ClaimSummary {
    ClaimSummary {
        claim_id: claim.id.clone(),
        agent_id: claim.prop_str("agent_id").unwrap_or_default().to_string(),
        target_id: claim.prop_str("target_id").unwrap_or_default().to_string(),
        intent: claim.prop_str("intent").unwrap_or_default().to_string(),
        since: claim.valid_from,
        task_id: claim.prop_str("task_id").map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_open_semantics() {
        let open = GraphNode::new("c1", NodeLabel::Claim, "p").with_prop("valid_to", Value::Null);
        assert!(is_open(&open));

        let missing = GraphNode::new("c2", NodeLabel::Claim, "p");
        assert!(is_open(&missing));

        let closed = GraphNode::new("c3", NodeLabel::Claim, "p").with_prop("valid_to", 99);
        assert!(!is_open(&closed));
    }

    #[test]
    fn test_close_props_shape() {
        let props = close_props(InvalidationReason::CodeChanged);
        assert!(props.get("valid_to").is_some_and(|v| v.is_i64()));
        assert_eq!(
            props.get("invalidation_reason").and_then(Value::as_str),
            Some("code_changed")
        );
    }

    #[test]
    fn test_reason_wire_format() {
        assert_eq!(
            serde_json::to_string(&InvalidationReason::TaskCompleted).unwrap(),
            "\"task_completed\""
        );
        assert_eq!(InvalidationReason::Expired.as_str(), "expired");
    }
}
