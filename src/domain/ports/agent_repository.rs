use crate::domain::entities::Agent;
use crate::infrastructure::http::middleware::error::ApiResult;

#[async_trait::async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get_agent(&self, id: i64) -> ApiResult<Option<Agent>>;

    /// Insert or replace an agent together with its scheduling configuration
    async fn upsert_agent(&self, agent: &Agent) -> ApiResult<()>;

    async fn list_agents(&self) -> ApiResult<Vec<Agent>>;
}
