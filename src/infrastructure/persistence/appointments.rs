use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::domain::entities::Appointment;
use crate::domain::ports::appointment_repository::AppointmentRepository;
use crate::infrastructure::http::middleware::error::ApiResult;
use crate::infrastructure::persistence::{get_enum, get_opt, get_ts, ts, Database};

#[async_trait]
impl AppointmentRepository for Database {
    async fn upsert_appointment(&self, appointment: &Appointment) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO appointments (id, agent_id, conversation_id, customer_name, customer_phone,
                                       title, start_time, duration_minutes, status, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                customer_name = excluded.customer_name,
                customer_phone = excluded.customer_phone,
                title = excluded.title,
                start_time = excluded.start_time,
                duration_minutes = excluded.duration_minutes,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(appointment.id)
        .bind(appointment.agent_id)
        .bind(appointment.conversation_id)
        .bind(&appointment.customer_name)
        .bind(&appointment.customer_phone)
        .bind(&appointment.title)
        .bind(ts(appointment.start_time))
        .bind(appointment.duration_minutes)
        .bind(appointment.status.as_str())
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_appointment(&self, id: i64) -> ApiResult<Option<Appointment>> {
        let row = sqlx::query(
            "SELECT id, agent_id, conversation_id, customer_name, customer_phone,
                    title, start_time, duration_minutes, status
             FROM appointments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Appointment {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            conversation_id: get_opt(&row, "conversation_id"),
            customer_name: row.try_get("customer_name")?,
            customer_phone: row.try_get("customer_phone")?,
            title: row.try_get("title")?,
            start_time: get_ts(&row, "start_time")?,
            duration_minutes: row.try_get("duration_minutes")?,
            status: get_enum(&row, "status")?,
        }))
    }
}
