use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of work the scheduler knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Reminder,
    Followup,
    Summary,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Reminder => "reminder",
            JobKind::Followup => "followup",
            JobKind::Summary => "summary",
        }
    }

    /// Summary jobs deliver over HTTP and are the only kind that is retried by the engine
    pub fn is_webhook(&self) -> bool {
        matches!(self, JobKind::Summary)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status shared by every job kind.
///
/// `Evaluating` is only observable on follow-up jobs while a worker holds them.
/// A webhook job waiting for its next attempt stays `Pending` with `next_retry_at` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Evaluating,
    Sent,
    Failed,
    Cancelled,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Evaluating => "evaluating",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Sent | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Skipped
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "evaluating" => Ok(JobStatus::Evaluating),
            "sent" => Ok(JobStatus::Sent),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "skipped" => Ok(JobStatus::Skipped),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// How a message job's content was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentVia {
    #[serde(rename = "template")]
    FixedTemplate,
    #[serde(rename = "ai")]
    AiText,
    #[serde(rename = "meta_template")]
    ApprovedTemplate,
}

impl SentVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentVia::FixedTemplate => "template",
            SentVia::AiText => "ai",
            SentVia::ApprovedTemplate => "meta_template",
        }
    }
}

impl FromStr for SentVia {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template" => Ok(SentVia::FixedTemplate),
            "ai" => Ok(SentVia::AiText),
            "meta_template" => Ok(SentVia::ApprovedTemplate),
            _ => Err(format!("Invalid sent_via: {}", s)),
        }
    }
}

/// Details recorded on a job when it transitions to `sent`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryMeta {
    pub sent_via: Option<SentVia>,
    pub content: Option<String>,
    pub template_name: Option<String>,
    pub ai_reason: Option<String>,
    pub provider_message_id: Option<String>,
}

/// A unit of work handed from the scheduler loop to a worker
#[derive(Debug, Clone)]
pub enum ClaimedJob {
    Reminder(super::ReminderJob),
    Followup(super::FollowupJob),
    Summary(super::SummaryJob),
}

impl ClaimedJob {
    pub fn kind(&self) -> JobKind {
        match self {
            ClaimedJob::Reminder(_) => JobKind::Reminder,
            ClaimedJob::Followup(_) => JobKind::Followup,
            ClaimedJob::Summary(_) => JobKind::Summary,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ClaimedJob::Reminder(job) => &job.id,
            ClaimedJob::Followup(job) => &job.id,
            ClaimedJob::Summary(job) => &job.id,
        }
    }

    /// Jobs sharing a key never dispatch concurrently
    pub fn dispatch_key(&self) -> String {
        match self {
            ClaimedJob::Reminder(job) => job.dispatch_key(),
            ClaimedJob::Followup(job) => format!("conversation:{}", job.conversation_id),
            ClaimedJob::Summary(job) => format!("conversation:{}", job.conversation_id),
        }
    }
}
