use crate::domain::entities::ApprovedTemplate;
use crate::infrastructure::http::middleware::error::ApiResult;

/// Read access to channel-approved templates
#[async_trait::async_trait]
pub trait TemplateCatalog: Send + Sync {
    async fn find_template(
        &self,
        agent_id: i64,
        name: &str,
        language: &str,
    ) -> ApiResult<Option<ApprovedTemplate>>;
}
