//! # Episode Engine
//!
//! Append-only episodic memory for agents. Episodes are EPISODE nodes
//! chained per `(agent_id, session_id)` with NEXT_EPISODE edges and
//! linked to the code they touch via INVOLVES. Recall rescoring blends
//! lexical overlap, temporal decay, and entity overlap; reflection folds
//! recent episodes into LEARNING nodes.

use crate::constants::coordination::{
    MAX_EPISODE_ENTITIES, MAX_RECALL_LIMIT, RECALL_CANDIDATES, RECALL_WEIGHTS, REFLECT_MAX_LEARNINGS,
    REFLECT_TOP_ENTITIES, REFLECT_WINDOW, TEMPORAL_DECAY_PER_DAY,
};
use crate::error::Result;
use crate::retrieval::bm25::tokenize;
use crate::store::{GraphStore, PropertyFilter};
use crate::types::{EdgeKind, GraphEdge, GraphNode, NodeLabel, now_ms};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Kinds of episodic records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeType {
    Observation,
    Decision,
    Edit,
    TestResult,
    Error,
    Reflection,
    Learning,
}

/// Request to append an episode
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeInput {
    pub agent_id: String,
    pub session_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(rename = "type")]
    pub episode_type: EpisodeType,
    pub content: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

/// Recall filter and ranking request
#[derive(Debug, Clone, Deserialize)]
pub struct RecallQuery {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub types: Option<Vec<EpisodeType>>,
    /// Epoch milliseconds lower bound
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default = "default_recall_limit")]
    pub limit: usize,
}

fn default_recall_limit() -> usize {
    10
}

impl Default for RecallQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            agent_id: None,
            task_id: None,
            types: None,
            since: None,
            limit: default_recall_limit(),
        }
    }
}

/// A recalled episode with its blended score
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeView {
    pub id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub episode_type: String,
    pub content: String,
    pub entities: Vec<String>,
    pub timestamp: i64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// A dominant entity surfaced by reflection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityPattern {
    pub entity: String,
    pub count: usize,
}

/// Output of a reflection pass
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionResult {
    pub episode_id: String,
    pub patterns: Vec<EntityPattern>,
    pub learning_ids: Vec<String>,
}

/// Scope of a reflection pass
#[derive(Debug, Clone, Deserialize)]
pub struct ReflectScope {
    pub agent_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Append-only episodic memory over the graph store
pub struct EpisodeEngine {
    graph: Arc<dyn GraphStore>,
}

impl EpisodeEngine {
    /// Engine over the shared store
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Append an episode, linking involved entities and the previous
    /// episode of the same `(agent_id, session_id)` chain
    pub async fn add(&self, project_id: &str, input: &EpisodeInput) -> Result<String> {
        let episode_id = Uuid::new_v4().to_string();
        let timestamp = now_ms();

        let entities: Vec<String> = input
            .entities
            .iter()
            .take(MAX_EPISODE_ENTITIES)
            .cloned()
            .collect();

        let mut node = GraphNode::new(&episode_id, NodeLabel::Episode, project_id)
            .with_prop("agent_id", input.agent_id.as_str())
            .with_prop("session_id", input.session_id.as_str())
            .with_prop("episode_type", serde_json::to_value(input.episode_type)?)
            .with_prop("content", input.content.as_str())
            .with_prop("entities", Value::from(entities.clone()))
            .with_prop("sensitive", input.sensitive)
            .with_prop("timestamp", timestamp);
        if let Some(task_id) = &input.task_id {
            node.properties
                .insert("task_id".into(), Value::String(task_id.clone()));
        }
        if let Some(outcome) = &input.outcome {
            node.properties
                .insert("outcome".into(), Value::String(outcome.clone()));
        }
        node.valid_from = timestamp;

        // Chain before inserting so the new episode cannot be its own
        // predecessor
        let previous = self.latest_episode(project_id, &input.agent_id, &input.session_id).await?;

        self.graph.upsert_nodes(std::slice::from_ref(&node)).await?;

        let mut edges = Vec::new();
        for entity in &entities {
            if self.graph.get_node(project_id, entity).await?.is_some() {
                edges.push(GraphEdge::new(
                    &episode_id,
                    entity,
                    EdgeKind::Involves,
                    project_id,
                ));
            }
        }
        if let Some(prev) = previous {
            edges.push(GraphEdge::new(
                &prev.id,
                &episode_id,
                EdgeKind::NextEpisode,
                project_id,
            ));
        }
        if !edges.is_empty() {
            self.graph.upsert_edges(&edges).await?;
        }

        debug!(project_id, episode_id = %episode_id, agent = %input.agent_id, "episode added");
        Ok(episode_id)
    }

    /// Ranked recall over up to 200 candidates, excluding sensitive
    /// episodes
    pub async fn recall(&self, project_id: &str, query: &RecallQuery) -> Result<Vec<EpisodeView>> {
        let mut filter = PropertyFilter::new();
        if let Some(agent_id) = &query.agent_id {
            filter = filter.with("agent_id", agent_id.as_str());
        }
        if let Some(task_id) = &query.task_id {
            filter = filter.with("task_id", task_id.as_str());
        }

        let mut candidates = self
            .graph
            .find_nodes(project_id, Some(NodeLabel::Episode), &filter)
            .await?;

        let allowed_types: Option<HashSet<String>> = query.types.as_ref().map(|types| {
            types
                .iter()
                .filter_map(|t| serde_json::to_value(t).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        });

        candidates.retain(|episode| {
            if episode.properties.get("sensitive") == Some(&Value::Bool(true)) {
                return false;
            }
            if let Some(since) = query.since
                && episode.valid_from < since
            {
                return false;
            }
            if let Some(allowed) = &allowed_types {
                return episode
                    .prop_str("episode_type")
                    .is_some_and(|t| allowed.contains(t));
            }
            true
        });

        candidates.sort_by_key(|e| std::cmp::Reverse(e.valid_from));
        candidates.truncate(RECALL_CANDIDATES);

        let now = now_ms();
        let query_tokens: HashSet<String> = tokenize(&query.text).into_iter().collect();
        let (w_lexical, w_temporal, w_entity) = RECALL_WEIGHTS;

        let mut scored: Vec<EpisodeView> = candidates
            .iter()
            .map(|episode| {
                let content_tokens: HashSet<String> =
                    tokenize(episode.prop_str("content").unwrap_or_default())
                        .into_iter()
                        .collect();
                let entities = episode_entities(episode);
                let entity_tokens: HashSet<String> = entities
                    .iter()
                    .flat_map(|e| tokenize(e))
                    .collect();

                let age_days = ((now - episode.valid_from).max(0)) as f64 / 86_400_000.0;
                let temporal = (-TEMPORAL_DECAY_PER_DAY * age_days).exp();
                let lexical = jaccard(&query_tokens, &content_tokens);
                let entity_overlap = jaccard(&query_tokens, &entity_tokens);
                let score = w_lexical * lexical + w_temporal * temporal + w_entity * entity_overlap;

                EpisodeView {
                    id: episode.id.clone(),
                    agent_id: episode.prop_str("agent_id").unwrap_or_default().to_string(),
                    episode_type: episode
                        .prop_str("episode_type")
                        .unwrap_or_default()
                        .to_string(),
                    content: episode.prop_str("content").unwrap_or_default().to_string(),
                    entities,
                    timestamp: episode.valid_from,
                    score,
                    task_id: episode.prop_str("task_id").map(str::to_string),
                    outcome: episode.prop_str("outcome").map(str::to_string),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(query.limit.clamp(1, MAX_RECALL_LIMIT));
        Ok(scored)
    }

    /// Fold recent episodes into a REFLECTION episode and LEARNING nodes
    /// linked to the dominant entities
    pub async fn reflect(&self, project_id: &str, scope: &ReflectScope) -> Result<ReflectionResult> {
        let recalled = self
            .recall(
                project_id,
                &RecallQuery {
                    text: String::new(),
                    agent_id: Some(scope.agent_id.clone()),
                    task_id: scope.task_id.clone(),
                    types: None,
                    since: None,
                    limit: REFLECT_WINDOW,
                },
            )
            .await?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for episode in &recalled {
            for entity in &episode.entities {
                *counts.entry(entity.as_str()).or_insert(0) += 1;
            }
        }
        let mut patterns: Vec<EntityPattern> = counts
            .into_iter()
            .map(|(entity, count)| EntityPattern {
                entity: entity.to_string(),
                count,
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.entity.cmp(&b.entity)));
        patterns.truncate(REFLECT_TOP_ENTITIES);

        let summary = if patterns.is_empty() {
            format!(
                "No dominant entities across the last {} episodes",
                recalled.len()
            )
        } else {
            let described: Vec<String> = patterns
                .iter()
                .map(|p| format!("{} ({})", p.entity, p.count))
                .collect();
            format!("Recent work concentrates on {}", described.join(", "))
        };

        let episode_id = self
            .add(
                project_id,
                &EpisodeInput {
                    agent_id: scope.agent_id.clone(),
                    session_id: format!("reflection:{}", scope.agent_id),
                    task_id: scope.task_id.clone(),
                    episode_type: EpisodeType::Reflection,
                    content: summary,
                    entities: patterns.iter().map(|p| p.entity.clone()).collect(),
                    outcome: None,
                    sensitive: false,
                },
            )
            .await?;

        let mut learning_ids = Vec::new();
        for pattern in patterns.iter().take(REFLECT_MAX_LEARNINGS) {
            let learning_id = Uuid::new_v4().to_string();
            let mut node = GraphNode::new(&learning_id, NodeLabel::Learning, project_id)
                .with_prop("agent_id", scope.agent_id.as_str())
                .with_prop(
                    "content",
                    format!(
                        "{} touched {} times in recent episodes",
                        pattern.entity, pattern.count
                    ),
                )
                .with_prop("entity", pattern.entity.as_str());
            node.valid_from = now_ms();
            self.graph.upsert_nodes(std::slice::from_ref(&node)).await?;

            if self.graph.get_node(project_id, &pattern.entity).await?.is_some() {
                let edge = GraphEdge::new(
                    &learning_id,
                    &pattern.entity,
                    EdgeKind::AppliesTo,
                    project_id,
                );
                self.graph.upsert_edges(std::slice::from_ref(&edge)).await?;
            }
            learning_ids.push(learning_id);
        }

        info!(
            project_id,
            agent = %scope.agent_id,
            episodes = recalled.len(),
            learnings = learning_ids.len(),
            "reflection complete"
        );
        Ok(ReflectionResult {
            episode_id,
            patterns,
            learning_ids,
        })
    }

    async fn latest_episode(
        &self,
        project_id: &str,
        agent_id: &str,
        session_id: &str,
    ) -> Result<Option<GraphNode>> {
        let filter = PropertyFilter::new()
            .with("agent_id", agent_id)
            .with("session_id", session_id);
        let episodes = self
            .graph
            .find_nodes(project_id, Some(NodeLabel::Episode), &filter)
            .await?;
        // Tie-break on id so same-millisecond episodes chain deterministically
        Ok(episodes
            .into_iter()
            .max_by(|a, b| a.valid_from.cmp(&b.valid_from).then_with(|| a.id.cmp(&b.id))))
    }
}

fn episode_entities(episode: &GraphNode) -> Vec<String> {
    episode
        .properties
        .get("entities")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
