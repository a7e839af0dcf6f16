use crate::domain::entities::Appointment;
use crate::infrastructure::http::middleware::error::ApiResult;

/// Local mirror of calendar appointments, kept current from lifecycle events
#[async_trait::async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn upsert_appointment(&self, appointment: &Appointment) -> ApiResult<()>;

    async fn get_appointment(&self, id: i64) -> ApiResult<Option<Appointment>>;
}
