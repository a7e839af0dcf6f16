use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Appointment, JobStatus, ReminderRule};

/// Who a reminder is addressed to. Each recipient gets its own job so their
/// outcomes are tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Customer,
    Business,
}

impl Recipient {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recipient::Customer => "customer",
            Recipient::Business => "business",
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Recipient {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Recipient::Customer),
            "business" => Ok(Recipient::Business),
            _ => Err(format!("Invalid recipient: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: String,
    pub agent_id: i64,
    pub appointment_id: i64,
    pub conversation_id: Option<i64>,
    pub rule_index: i64,
    /// Snapshot of the rule taken when the job was spawned
    pub rule: ReminderRule,
    pub recipient: Recipient,
    /// Channel address (phone number, chat id) the reminder goes to
    pub destination: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub status_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReminderJob {
    pub fn new(
        appointment: &Appointment,
        rule_index: i64,
        rule: ReminderRule,
        recipient: Recipient,
        destination: String,
    ) -> Self {
        let now = Utc::now();
        let scheduled_for = appointment.start_time - Duration::minutes(rule.minutes_before);
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: appointment.agent_id,
            appointment_id: appointment.id,
            conversation_id: appointment.conversation_id,
            rule_index,
            rule,
            recipient,
            destination,
            scheduled_for,
            status: JobStatus::Pending,
            status_reason: None,
            sent_at: None,
            error_message: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key that serializes dispatches to the same customer thread
    pub fn dispatch_key(&self) -> String {
        match (self.recipient, self.conversation_id) {
            (Recipient::Customer, Some(conversation_id)) => {
                format!("conversation:{}", conversation_id)
            }
            _ => format!("destination:{}", self.destination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AppointmentStatus, MessageContent};

    #[test]
    fn test_scheduled_for_is_start_minus_offset() {
        let start = Utc::now() + Duration::days(2);
        let appointment = Appointment {
            id: 7,
            agent_id: 1,
            conversation_id: Some(3),
            customer_name: "Ana".to_string(),
            customer_phone: "+5511999".to_string(),
            title: "Haircut".to_string(),
            start_time: start,
            duration_minutes: 45,
            status: AppointmentStatus::Scheduled,
        };
        let rule = ReminderRule {
            minutes_before: 60,
            content: MessageContent::FixedTemplate {
                body: "See you soon".to_string(),
            },
        };

        let job = ReminderJob::new(&appointment, 0, rule, Recipient::Customer, "+5511999".into());

        assert_eq!(job.scheduled_for, start - Duration::minutes(60));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.dispatch_key(), "conversation:3");
    }
}
