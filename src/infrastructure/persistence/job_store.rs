use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{JobKind, JobStatus};
use crate::domain::ports::job_store::{JobStore, JobTransition};
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};
use crate::infrastructure::persistence::{get_enum, placeholders, ts, Database};

/// Column layout of one job table
struct JobTable {
    table: &'static str,
    status: &'static str,
    error: &'static str,
    due: &'static str,
}

fn job_table(kind: JobKind) -> JobTable {
    match kind {
        JobKind::Reminder => JobTable {
            table: "reminder_jobs",
            status: "status",
            error: "error_message",
            due: "scheduled_for",
        },
        JobKind::Followup => JobTable {
            table: "followup_jobs",
            status: "status",
            error: "error_message",
            due: "scheduled_for",
        },
        JobKind::Summary => JobTable {
            table: "summary_jobs",
            status: "webhook_status",
            error: "webhook_last_error",
            due: "next_retry_at",
        },
    }
}

/// SET assignments for a transition, excluding status, lease and updated_at
fn assignments(
    kind: JobKind,
    cols: &JobTable,
    transition: &JobTransition,
) -> Vec<(String, Option<String>)> {
    match transition {
        JobTransition::Sent { at, meta } => {
            let mut sets = vec![("sent_at".to_string(), Some(ts(*at)))];
            if kind == JobKind::Summary {
                sets.push(("next_retry_at".to_string(), None));
            }
            if kind == JobKind::Followup {
                sets.push((
                    "sent_via".to_string(),
                    meta.sent_via.map(|v| v.as_str().to_string()),
                ));
                sets.push(("content".to_string(), meta.content.clone()));
                sets.push(("template_name".to_string(), meta.template_name.clone()));
                sets.push(("ai_reason".to_string(), meta.ai_reason.clone()));
            }
            sets
        }
        JobTransition::Failed { error } => {
            let mut sets = vec![(cols.error.to_string(), Some(error.clone()))];
            if kind == JobKind::Summary {
                sets.push(("next_retry_at".to_string(), None));
            }
            sets
        }
        JobTransition::Skipped { reason, ai_reason } => {
            let mut sets = vec![("status_reason".to_string(), Some(reason.clone()))];
            if kind == JobKind::Followup && ai_reason.is_some() {
                sets.push(("ai_reason".to_string(), ai_reason.clone()));
            }
            sets
        }
        JobTransition::Cancelled { reason } => {
            vec![("status_reason".to_string(), Some(reason.clone()))]
        }
        JobTransition::Deferred { until, reason } => vec![
            (cols.due.to_string(), Some(ts(*until))),
            ("status_reason".to_string(), Some(reason.clone())),
        ],
        JobTransition::Released => Vec::new(),
    }
}

#[async_trait]
impl JobStore for Database {
    async fn job_status(&self, kind: JobKind, id: &str) -> ApiResult<Option<JobStatus>> {
        let cols = job_table(kind);
        let row = sqlx::query(&format!(
            "SELECT {} AS status FROM {} WHERE id = ?",
            cols.status, cols.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(|r| get_enum(r, "status")).transpose()
    }

    async fn apply_transition(
        &self,
        kind: JobKind,
        id: &str,
        from: &[JobStatus],
        transition: &JobTransition,
        now: DateTime<Utc>,
    ) -> ApiResult<bool> {
        if from.is_empty() {
            return Err(ApiError::Internal(format!(
                "No source states for {} job {}",
                kind, id
            )));
        }

        let cols = job_table(kind);
        let sets = assignments(kind, &cols, transition);

        let mut clauses = vec![format!("{} = ?", cols.status)];
        clauses.extend(sets.iter().map(|(col, _)| format!("{} = ?", col)));
        clauses.push("locked_until = NULL".to_string());
        clauses.push("updated_at = ?".to_string());

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? AND {} IN ({})",
            cols.table,
            clauses.join(", "),
            cols.status,
            placeholders(from.len())
        );

        let mut query = sqlx::query(&sql).bind(transition.target().as_str());
        for (_, value) in &sets {
            query = query.bind(value.clone());
        }
        query = query.bind(ts(now)).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{DeliveryMeta, SentVia};

    #[test]
    fn test_followup_sent_records_delivery_meta() {
        let cols = job_table(JobKind::Followup);
        let transition = JobTransition::Sent {
            at: Utc::now(),
            meta: DeliveryMeta {
                sent_via: Some(SentVia::AiText),
                content: Some("hello".into()),
                ..Default::default()
            },
        };

        let sets = assignments(JobKind::Followup, &cols, &transition);
        let columns: Vec<&str> = sets.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(
            columns,
            vec!["sent_at", "sent_via", "content", "template_name", "ai_reason"]
        );
        assert_eq!(sets[1].1.as_deref(), Some("ai"));
    }

    #[test]
    fn test_summary_deferral_moves_next_retry() {
        let cols = job_table(JobKind::Summary);
        let transition = JobTransition::Deferred {
            until: Utc::now(),
            reason: "retry".into(),
        };

        let sets = assignments(JobKind::Summary, &cols, &transition);
        assert_eq!(sets[0].0, "next_retry_at");
    }

    #[test]
    fn test_failed_uses_kind_error_column() {
        let failed = JobTransition::Failed {
            error: "boom".into(),
        };
        let summary = assignments(JobKind::Summary, &job_table(JobKind::Summary), &failed);
        let reminder = assignments(JobKind::Reminder, &job_table(JobKind::Reminder), &failed);
        assert_eq!(summary[0].0, "webhook_last_error");
        assert_eq!(reminder[0].0, "error_message");
    }
}
