use crate::infrastructure::http as api;
use crate::infrastructure::http::middleware::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let jobs = Router::new()
        .route(
            "/api/agents/:id/reminder-jobs",
            get(api::jobs::list_reminder_jobs),
        )
        .route(
            "/api/agents/:id/followup-jobs",
            get(api::jobs::list_followup_jobs),
        )
        .route(
            "/api/agents/:id/summary-jobs",
            get(api::jobs::list_summary_jobs),
        )
        .route(
            "/api/reminder-jobs/:id",
            get(api::jobs::get_reminder_job).delete(api::jobs::delete_reminder_job),
        )
        .route(
            "/api/followup-jobs/:id",
            get(api::jobs::get_followup_job).delete(api::jobs::delete_followup_job),
        )
        .route(
            "/api/summary-jobs/:id",
            get(api::jobs::get_summary_job).delete(api::jobs::delete_summary_job),
        );

    let agents = Router::new()
        .route(
            "/api/agents/:id",
            get(api::agents::get_agent).put(api::agents::upsert_agent),
        )
        .route(
            "/api/agents/:id/reminders/test",
            post(api::test_trigger::trigger_test_reminder),
        );

    let events = Router::new()
        .route("/api/events/messages", post(api::events::ingest_message))
        .route(
            "/api/events/appointments",
            post(api::events::ingest_appointment),
        )
        .route(
            "/api/events/conversations/:id/delete",
            post(api::events::ingest_conversation_deleted),
        );

    Router::new()
        .route("/health", get(health_handler))
        .merge(jobs)
        .merge(agents)
        .merge(events)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}
