mod helpers;

use autoreach::application::services::{DispatchOutcome, JobFilter};
use autoreach::domain::entities::{Channel, JobStatus, MessageAuthor, SummaryJob, SummaryWebhookPayload};
use autoreach::domain::services::webhook_signature::SIGNATURE_HEADER;
use autoreach::infrastructure::providers::ReqwestWebhookSender;
use chrono::Duration;
use helpers::*;
use httpmock::prelude::*;
use std::sync::Arc;

const CONVERSATION: i64 = 900;

async fn summary_agent(harness: &Harness, url: &str, retry_count: i64) {
    let mut agent = test_agent(Channel::Whatsapp);
    agent.summary.enabled = true;
    agent.summary.delay_minutes = 30;
    agent.summary.min_messages = 2;
    agent.summary.webhook_url = url.to_string();
    agent.summary.webhook_retry_count = retry_count;
    agent.summary.webhook_retry_delay = 60;
    save_agent(&harness.db, &agent).await;
}

async fn seed_conversation(harness: &Harness) {
    deliver_message(harness, message(1, CONVERSATION, MessageAuthor::Customer, "Can I book a cleaning?", at(2026, 3, 2, 10, 0))).await;
    deliver_message(harness, message(2, CONVERSATION, MessageAuthor::Agent, "Sure, Tuesday at 11?", at(2026, 3, 2, 10, 1))).await;
}

async fn summary_jobs(harness: &Harness) -> Vec<SummaryJob> {
    harness
        .engine
        .job_query_service
        .list_summary_jobs(AGENT_ID, JobFilter::default())
        .await
        .unwrap()
        .jobs
}

#[tokio::test]
async fn test_summary_delivered_after_three_server_errors() {
    let harness = harness_with_statuses(at(2026, 3, 2, 10, 0), &[500, 500, 500, 200]).await;
    summary_agent(&harness, "http://hooks.test/summary", 3).await;
    seed_conversation(&harness).await;

    // Not idle long enough yet
    harness.clock.set(at(2026, 3, 2, 10, 30));
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.summaries_created, 0);

    harness.clock.set(at(2026, 3, 2, 10, 31));
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.summaries_created, 1);
    assert_eq!(report.count(DispatchOutcome::Retrying), 1);

    for _ in 0..2 {
        harness.clock.advance(Duration::seconds(60));
        let report = harness.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.count(DispatchOutcome::Retrying), 1);
    }

    harness.clock.advance(Duration::seconds(60));
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.count(DispatchOutcome::Sent), 1);
    assert_eq!(report.summaries_created, 0);

    let attempts = harness.webhooks.attempts();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert_eq!(pair[1].0 - pair[0].0, Duration::seconds(60));
    }
    // Every attempt describes the same conversation
    assert!(attempts.iter().all(|(_, body, _)| {
        let payload: SummaryWebhookPayload = serde_json::from_str(body).unwrap();
        payload.conversation_id == CONVERSATION && payload.message_count == 2
    }));

    // Generated once, reused for retries
    assert_eq!(harness.generator.requests().len(), 1);

    let job = &summary_jobs(&harness).await[0];
    assert_eq!(job.webhook_status, JobStatus::Sent);
    assert_eq!(job.webhook_attempts, 4);
    assert!(job.summary_text.is_some());
}

#[tokio::test]
async fn test_attempts_never_exceed_retry_count_plus_one() {
    let harness = harness_with_statuses(at(2026, 3, 2, 10, 0), &[503; 10]).await;
    summary_agent(&harness, "http://hooks.test/summary", 2).await;
    seed_conversation(&harness).await;

    harness.clock.set(at(2026, 3, 2, 10, 31));
    for _ in 0..6 {
        harness.engine.scheduler.tick().await.unwrap();
        harness.clock.advance(Duration::seconds(60));
    }

    assert_eq!(harness.webhooks.attempts().len(), 3);
    let job = &summary_jobs(&harness).await[0];
    assert_eq!(job.webhook_status, JobStatus::Failed);
    assert_eq!(job.webhook_attempts, 3);
    assert!(job.webhook_last_error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn test_client_error_fails_without_retry() {
    let harness = harness_with_statuses(at(2026, 3, 2, 10, 0), &[404]).await;
    summary_agent(&harness, "http://hooks.test/summary", 3).await;
    seed_conversation(&harness).await;

    harness.clock.set(at(2026, 3, 2, 10, 31));
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.count(DispatchOutcome::Failed), 1);

    harness.clock.advance(Duration::minutes(5));
    harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(harness.webhooks.attempts().len(), 1);
}

#[tokio::test]
async fn test_missing_webhook_url_skips_summary() {
    let harness = harness_at(at(2026, 3, 2, 10, 0)).await;
    summary_agent(&harness, "", 3).await;
    seed_conversation(&harness).await;

    harness.clock.set(at(2026, 3, 2, 10, 31));
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.count(DispatchOutcome::Skipped), 1);
    assert!(harness.webhooks.attempts().is_empty());
}

#[tokio::test]
async fn test_new_customer_message_starts_new_summary_episode() {
    let harness = harness_at(at(2026, 3, 2, 10, 0)).await;
    summary_agent(&harness, "http://hooks.test/summary", 0).await;
    seed_conversation(&harness).await;

    harness.clock.set(at(2026, 3, 2, 10, 31));
    harness.engine.scheduler.tick().await.unwrap();
    // Still idle: the same episode is not summarized twice
    harness.clock.set(at(2026, 3, 2, 11, 30));
    assert_eq!(harness.engine.scheduler.tick().await.unwrap().summaries_created, 0);

    deliver_message(&harness, message(3, CONVERSATION, MessageAuthor::Customer, "One more thing", at(2026, 3, 2, 12, 0))).await;
    harness.clock.set(at(2026, 3, 2, 12, 31));
    assert_eq!(harness.engine.scheduler.tick().await.unwrap().summaries_created, 1);
    assert_eq!(summary_jobs(&harness).await.len(), 2);
}

#[tokio::test]
async fn test_http_webhook_retries_until_success() {
    let server = MockServer::start_async().await;
    let harness = harness_with_sender(
        at(2026, 3, 2, 10, 0),
        Arc::new(ReqwestWebhookSender::new(std::time::Duration::from_secs(5))),
        Some("s3cret"),
    )
    .await;
    summary_agent(&harness, &server.url("/summary"), 3).await;
    seed_conversation(&harness).await;

    let mut failing = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/summary")
                .header("content-type", "application/json")
                .header_exists(SIGNATURE_HEADER.to_lowercase());
            then.status(500);
        })
        .await;

    harness.clock.set(at(2026, 3, 2, 10, 31));
    for _ in 0..3 {
        let report = harness.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.count(DispatchOutcome::Retrying), 1);
        harness.clock.advance(Duration::seconds(60));
    }
    failing.assert_calls_async(3).await;
    failing.delete_async().await;

    let ok = server
        .mock_async(|when, then| {
            when.method(POST).path("/summary");
            then.status(200);
        })
        .await;
    let report = harness.engine.scheduler.tick().await.unwrap();
    assert_eq!(report.count(DispatchOutcome::Sent), 1);
    ok.assert_async().await;

    let job = &summary_jobs(&harness).await[0];
    assert_eq!(job.webhook_status, JobStatus::Sent);
    assert_eq!(job.webhook_attempts, 4);
}
