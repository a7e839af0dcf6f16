use async_trait::async_trait;
use sqlx::Row;

use crate::domain::entities::ApprovedTemplate;
use crate::domain::ports::template_catalog::TemplateCatalog;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::Database;

impl Database {
    /// Mirror a provider-approved template into the local catalog
    pub async fn upsert_approved_template(&self, template: &ApprovedTemplate) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO approved_templates (agent_id, name, language, category, body)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(agent_id, name, language) DO UPDATE SET
                category = excluded.category,
                body = excluded.body",
        )
        .bind(template.agent_id)
        .bind(&template.name)
        .bind(&template.language)
        .bind(&template.category)
        .bind(&template.body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TemplateCatalog for Database {
    async fn find_template(
        &self,
        agent_id: i64,
        name: &str,
        language: &str,
    ) -> ApiResult<Option<ApprovedTemplate>> {
        let row = sqlx::query(
            "SELECT agent_id, name, language, category, body
             FROM approved_templates
             WHERE agent_id = ? AND name = ? AND language = ?",
        )
        .bind(agent_id)
        .bind(name)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ApprovedTemplate {
            agent_id: row.try_get("agent_id")?,
            name: row.try_get("name")?,
            language: row.try_get("language")?,
            category: row.try_get("category")?,
            body: row.try_get("body")?,
        }))
    }
}
