use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

use crate::domain::entities::Agent;
use crate::domain::ports::agent_repository::AgentRepository;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::{get_enum, get_opt, get_ts, ts, Database};

const AGENT_COLUMNS: &str = "id, name, business_name, persona, timezone, channel, \
     reminder_settings, followup_config, summary_config, created_at, updated_at";

fn agent_from_row(row: &AnyRow) -> ApiResult<Agent> {
    let reminders: String = row.try_get("reminder_settings")?;
    let followup: String = row.try_get("followup_config")?;
    let summary: String = row.try_get("summary_config")?;

    Ok(Agent {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        business_name: get_opt(row, "business_name"),
        persona: get_opt(row, "persona"),
        timezone: row.try_get("timezone")?,
        channel: get_enum(row, "channel")?,
        reminders: serde_json::from_str(&reminders)?,
        followup: serde_json::from_str(&followup)?,
        summary: serde_json::from_str(&summary)?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[async_trait]
impl AgentRepository for Database {
    async fn get_agent(&self, id: i64) -> ApiResult<Option<Agent>> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn upsert_agent(&self, agent: &Agent) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, name, business_name, persona, timezone, channel,
                                 reminder_settings, followup_config, summary_config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                business_name = excluded.business_name,
                persona = excluded.persona,
                timezone = excluded.timezone,
                channel = excluded.channel,
                reminder_settings = excluded.reminder_settings,
                followup_config = excluded.followup_config,
                summary_config = excluded.summary_config,
                updated_at = excluded.updated_at",
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(&agent.business_name)
        .bind(&agent.persona)
        .bind(&agent.timezone)
        .bind(agent.channel.as_str())
        .bind(serde_json::to_string(&agent.reminders)?)
        .bind(serde_json::to_string(&agent.followup)?)
        .bind(serde_json::to_string(&agent.summary)?)
        .bind(ts(agent.created_at))
        .bind(ts(agent.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_agents(&self) -> ApiResult<Vec<Agent>> {
        let rows = sqlx::query(&format!("SELECT {} FROM agents ORDER BY id", AGENT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(agent_from_row).collect()
    }
}
