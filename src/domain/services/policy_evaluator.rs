use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::entities::{
    Appointment, AppointmentStatus, Conversation, FollowupConfig, FollowupJob,
};

/// Outcome of evaluating a due job against its kind's policy rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Fire,
    Defer {
        until: DateTime<Utc>,
        reason: String,
    },
    Skip {
        reason: String,
    },
    Cancel {
        reason: String,
    },
}

/// Counters and state a follow-up evaluation reads. `sent_today` is the number of
/// follow-ups already sent to this conversation on the current local calendar day.
#[derive(Debug, Clone)]
pub struct FollowupPolicyInput<'a> {
    pub job: &'a FollowupJob,
    pub config: &'a FollowupConfig,
    pub conversation: &'a Conversation,
    pub sent_today: i64,
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// Ordered follow-up rules, first match wins:
/// active hours, daily cap, cooldown, customer reply, fire.
pub fn evaluate_followup(
    input: &FollowupPolicyInput<'_>,
    now: DateTime<Utc>,
    tz: Tz,
) -> PolicyDecision {
    let local = now.with_timezone(&tz);
    let hours = input.config.active_hours;

    if !hours.contains(local.time()) {
        let date = if local.time() < hours.start {
            local.date_naive()
        } else {
            local.date_naive() + Duration::days(1)
        };
        return PolicyDecision::Defer {
            until: local_instant(tz, date, hours.start),
            reason: "outside active hours".to_string(),
        };
    }

    if let Some(cap) = input.config.max_per_day.filter(|cap| *cap > 0) {
        if input.sent_today >= cap {
            return PolicyDecision::Defer {
                until: next_local_midnight(now, tz),
                reason: format!("daily follow-up cap of {} reached", cap),
            };
        }
    }

    if let (Some(hours), Some(last_sent)) = (input.config.cooldown_hours, input.last_sent_at) {
        let expires = last_sent + Duration::seconds((hours.max(0.0) * 3600.0).round() as i64);
        if now < expires {
            return PolicyDecision::Defer {
                until: expires,
                reason: "cooldown active".to_string(),
            };
        }
    }

    // The anchor is the last customer message when the sequence started, so any
    // later customer message arrived after this job was created.
    if let Some(last_customer) = input.conversation.last_customer_message_at {
        if last_customer > input.job.episode_anchor {
            return PolicyDecision::Cancel {
                reason: "customer replied".to_string(),
            };
        }
    }

    PolicyDecision::Fire
}

pub fn evaluate_reminder(appointment: Option<&Appointment>, now: DateTime<Utc>) -> PolicyDecision {
    let appointment = match appointment {
        Some(a) if a.status != AppointmentStatus::Cancelled => a,
        Some(_) => {
            return PolicyDecision::Cancel {
                reason: "appointment cancelled".to_string(),
            }
        }
        None => {
            return PolicyDecision::Cancel {
                reason: "appointment not found".to_string(),
            }
        }
    };

    if now >= appointment.start_time {
        return PolicyDecision::Skip {
            reason: "appointment already started".to_string(),
        };
    }

    PolicyDecision::Fire
}

/// Start of the next calendar day in `tz`
pub fn next_local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let tomorrow = now.with_timezone(&tz).date_naive() + Duration::days(1);
    local_instant(tz, tomorrow, NaiveTime::MIN)
}

/// Calendar day key in `tz`, as used by the daily send counters
pub fn local_day(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Resolve a local wall-clock time to an instant. Times that fall into a DST gap
/// move forward by an hour; ambiguous times take the earlier instant.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ActiveHours, FollowupStep};

    fn config() -> FollowupConfig {
        FollowupConfig {
            enabled: true,
            sequence: vec![FollowupStep {
                delay_hours: 3.0,
                instruction: String::new(),
            }],
            active_hours: ActiveHours {
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
            ..Default::default()
        }
    }

    fn fixtures(anchor: DateTime<Utc>) -> (FollowupJob, Conversation) {
        let job = FollowupJob::new(1, 10, 1, anchor, anchor + Duration::hours(3));
        let mut conversation = Conversation::new(10, 1, "Ana".into(), "+5511999".into());
        conversation.last_customer_message_at = Some(anchor);
        conversation.last_message_at = Some(anchor + Duration::minutes(1));
        (job, conversation)
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_fires_inside_active_hours() {
        let config = config();
        let (job, conversation) = fixtures(utc(2026, 5, 4, 8, 0));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 0,
            last_sent_at: None,
        };

        let decision = evaluate_followup(&input, utc(2026, 5, 4, 11, 0), Tz::UTC);
        assert_eq!(decision, PolicyDecision::Fire);
    }

    #[test]
    fn test_defers_to_next_start_after_window() {
        let config = config();
        let (job, conversation) = fixtures(utc(2026, 5, 4, 16, 0));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 0,
            last_sent_at: None,
        };

        let decision = evaluate_followup(&input, utc(2026, 5, 4, 20, 0), Tz::UTC);
        match decision {
            PolicyDecision::Defer { until, .. } => assert_eq!(until, utc(2026, 5, 5, 9, 0)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_defers_to_same_day_start_before_window() {
        let config = config();
        let (job, conversation) = fixtures(utc(2026, 5, 4, 1, 0));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 0,
            last_sent_at: None,
        };

        match evaluate_followup(&input, utc(2026, 5, 4, 4, 0), Tz::UTC) {
            PolicyDecision::Defer { until, .. } => assert_eq!(until, utc(2026, 5, 4, 9, 0)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_active_hours_use_agent_timezone() {
        let config = config();
        let (job, conversation) = fixtures(utc(2026, 1, 10, 10, 0));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 0,
            last_sent_at: None,
        };

        // 13:00 UTC is 10:00 in Sao Paulo (UTC-3)
        let tz: Tz = "America/Sao_Paulo".parse().unwrap();
        assert_eq!(evaluate_followup(&input, utc(2026, 1, 10, 13, 0), tz), PolicyDecision::Fire);

        // 22:00 UTC is 19:00 local, so defer to 09:00 local tomorrow = 12:00 UTC
        match evaluate_followup(&input, utc(2026, 1, 10, 22, 0), tz) {
            PolicyDecision::Defer { until, .. } => assert_eq!(until, utc(2026, 1, 11, 12, 0)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_cap_defers_to_local_midnight() {
        let mut config = config();
        config.max_per_day = Some(2);
        let (job, conversation) = fixtures(utc(2026, 5, 4, 8, 0));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 2,
            last_sent_at: None,
        };

        match evaluate_followup(&input, utc(2026, 5, 4, 12, 0), Tz::UTC) {
            PolicyDecision::Defer { until, .. } => assert_eq!(until, utc(2026, 5, 5, 0, 0)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_cooldown_defers_to_expiry() {
        let mut config = config();
        config.cooldown_hours = Some(4.0);
        let (job, conversation) = fixtures(utc(2026, 5, 4, 8, 0));
        let last_sent = utc(2026, 5, 4, 10, 0);
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 1,
            last_sent_at: Some(last_sent),
        };

        match evaluate_followup(&input, utc(2026, 5, 4, 12, 0), Tz::UTC) {
            PolicyDecision::Defer { until, .. } => assert_eq!(until, utc(2026, 5, 4, 14, 0)),
            other => panic!("expected defer, got {:?}", other),
        }
    }

    #[test]
    fn test_customer_reply_cancels() {
        let config = config();
        let (job, mut conversation) = fixtures(utc(2026, 5, 4, 8, 0));
        conversation.last_customer_message_at = Some(utc(2026, 5, 4, 9, 30));
        let input = FollowupPolicyInput {
            job: &job,
            config: &config,
            conversation: &conversation,
            sent_today: 0,
            last_sent_at: None,
        };

        assert!(matches!(
            evaluate_followup(&input, utc(2026, 5, 4, 11, 0), Tz::UTC),
            PolicyDecision::Cancel { .. }
        ));
    }

    #[test]
    fn test_reminder_rules() {
        let now = utc(2026, 5, 4, 12, 0);
        let mut appointment = Appointment {
            id: 1,
            agent_id: 1,
            conversation_id: None,
            customer_name: "Ana".into(),
            customer_phone: "+5511999".into(),
            title: "Consult".into(),
            start_time: now + Duration::hours(1),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
        };

        assert_eq!(evaluate_reminder(Some(&appointment), now), PolicyDecision::Fire);

        appointment.start_time = now;
        assert!(matches!(
            evaluate_reminder(Some(&appointment), now),
            PolicyDecision::Skip { .. }
        ));

        appointment.status = AppointmentStatus::Cancelled;
        assert!(matches!(
            evaluate_reminder(Some(&appointment), now),
            PolicyDecision::Cancel { .. }
        ));
        assert!(matches!(evaluate_reminder(None, now), PolicyDecision::Cancel { .. }));
    }

    #[test]
    fn test_local_day_follows_timezone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        // 16:00 UTC is 01:00 the next day in Tokyo
        assert_eq!(local_day(utc(2026, 5, 4, 16, 0), tz), "2026-05-05");
        assert_eq!(next_local_midnight(utc(2026, 5, 4, 16, 0), tz), utc(2026, 5, 5, 15, 0));
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // 2026-03-08 02:30 does not exist in New York
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let instant = local_instant(tz, date, NaiveTime::from_hms_opt(2, 30, 0).unwrap());
        assert_eq!(instant, utc(2026, 3, 8, 7, 30));
    }
}
