use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AgentType {
    Sdr,
    Support,
    Marketing,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Training,
    Inactive,
}

#[derive(Clone, Debug, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub model: String,
    pub prompt: String,
    #[sqlx(json)]
    pub tools: Vec<String>,
    pub conversation_count: i64,
    pub accuracy: i64,
    pub created_at: DateTime<Utc>,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

const fn default_accuracy() -> i64 {
    90
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_accuracy")]
    pub accuracy: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentChanges {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub agent_type: Option<AgentType>,
    pub status: Option<AgentStatus>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub tools: Option<Vec<String>>,
    pub accuracy: Option<i64>,
}

impl Agent {
    #[must_use]
    pub fn create(tenant_id: &str, new_agent: NewAgent, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            tenant_id: tenant_id.to_string(),
            name: new_agent.name,
            agent_type: new_agent.agent_type,
            status: new_agent.status,
            model: new_agent.model,
            prompt: new_agent.prompt,
            tools: new_agent.tools,
            conversation_count: 0,
            accuracy: new_agent.accuracy,
            created_at: now,
        }
    }

    /// Agents picked as default assignee for conversations opened by ingestion.
    #[must_use]
    pub fn is_default_assignee(&self) -> bool {
        self.agent_type == AgentType::Sdr && self.status == AgentStatus::Active
    }

    pub fn apply(&mut self, changes: AgentChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(agent_type) = changes.agent_type {
            self.agent_type = agent_type;
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(model) = changes.model {
            self.model = model;
        }
        if let Some(prompt) = changes.prompt {
            self.prompt = prompt;
        }
        if let Some(tools) = changes.tools {
            self.tools = tools;
        }
        if let Some(accuracy) = changes.accuracy {
            self.accuracy = accuracy;
        }
    }
}

const AGENT_COLUMNS: &str =
    "id, tenant_id, name, agent_type, status, model, prompt, tools, conversation_count, accuracy, created_at";

pub async fn insert_agent(db: &DbPool, agent: &Agent) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO agents (id, tenant_id, name, agent_type, status, model, prompt, tools, conversation_count, accuracy, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&agent.id)
    .bind(&agent.tenant_id)
    .bind(&agent.name)
    .bind(agent.agent_type)
    .bind(agent.status)
    .bind(&agent.model)
    .bind(&agent.prompt)
    .bind(Json(&agent.tools))
    .bind(agent.conversation_count)
    .bind(agent.accuracy)
    .bind(agent.created_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("Agent"))?;
    Ok(())
}

pub async fn select_agents(db: &DbPool, tenant_id: &str) -> StoreResult<Vec<Agent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE tenant_id = ? ORDER BY created_at, rowid");
    let agents = sqlx::query_as::<_, Agent>(&sql)
        .bind(tenant_id)
        .fetch_all(db)
        .await?;
    Ok(agents)
}

pub async fn select_agent(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<Agent> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE tenant_id = ? AND id = ?");
    sqlx::query_as::<_, Agent>(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("Agent"))
}

pub async fn select_default_agent(db: &DbPool, tenant_id: &str) -> StoreResult<Option<Agent>> {
    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents
         WHERE tenant_id = ? AND agent_type = ? AND status = ?
         ORDER BY created_at, rowid LIMIT 1"
    );
    let agent = sqlx::query_as::<_, Agent>(&sql)
        .bind(tenant_id)
        .bind(AgentType::Sdr)
        .bind(AgentStatus::Active)
        .fetch_optional(db)
        .await?;
    Ok(agent)
}

pub async fn update_agent_row(db: &DbPool, agent: &Agent) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        UPDATE agents
        SET name = ?, agent_type = ?, status = ?, model = ?, prompt = ?, tools = ?, accuracy = ?
        WHERE tenant_id = ? AND id = ?
        ",
    )
    .bind(&agent.name)
    .bind(agent.agent_type)
    .bind(agent.status)
    .bind(&agent.model)
    .bind(&agent.prompt)
    .bind(Json(&agent.tools))
    .bind(agent.accuracy)
    .bind(&agent.tenant_id)
    .bind(&agent.id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Agent"));
    }
    Ok(())
}

pub async fn delete_agent_row(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM agents WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Agent"));
    }
    Ok(())
}

/// Counts a newly opened conversation towards the agent's workload.
pub async fn increment_conversation_count(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<()> {
    sqlx::query("UPDATE agents SET conversation_count = conversation_count + 1 WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}
