use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An autonomous messaging agent and the scheduling configuration it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub business_name: Option<String>,
    pub persona: Option<String>,
    /// IANA timezone name, e.g. "America/Sao_Paulo"
    pub timezone: String,
    pub channel: Channel,
    pub reminders: ReminderSettings,
    pub followup: FollowupConfig,
    pub summary: SummaryConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: i64, name: String, timezone: String, channel: Channel) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            business_name: None,
            persona: None,
            timezone,
            channel,
            reminders: ReminderSettings::default(),
            followup: FollowupConfig::default(),
            summary: SummaryConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Parsed timezone; an unknown name falls back to UTC
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(
                "Agent {} has invalid timezone '{}', using UTC",
                self.id,
                self.timezone
            );
            Tz::UTC
        })
    }

    pub fn business_display_name(&self) -> &str {
        self.business_name.as_deref().unwrap_or(&self.name)
    }
}

/// Chat channel the agent talks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Telegram,
    Web,
}

impl Channel {
    /// Interval after the last customer message during which free-form content is allowed.
    /// `None` means the channel has no such restriction.
    pub fn session_window(&self) -> Option<Duration> {
        match self {
            Channel::Whatsapp => Some(Duration::hours(24)),
            Channel::Telegram | Channel::Web => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Telegram => "telegram",
            Channel::Web => "web",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Channel::Whatsapp),
            "telegram" => Ok(Channel::Telegram),
            "web" => Ok(Channel::Web),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

// ========================================
// Reminder configuration
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub rules: Vec<ReminderRule>,
    pub notify_customer: bool,
    pub notify_business: bool,
    pub business_phone: Option<String>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rules: Vec::new(),
            notify_customer: true,
            notify_business: false,
            business_phone: None,
        }
    }
}

/// One reminder offset and the content it sends.
///
/// Stored in the wire shape `{minutes_before, content_type, template?, ai_prompt?,
/// meta_template_name?, meta_template_language?, parameter_mapping?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReminderRuleConfig", into = "ReminderRuleConfig")]
pub struct ReminderRule {
    pub minutes_before: i64,
    pub content: MessageContent,
}

/// Where a message's text comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Free text with `{{semantic_key}}` tokens
    FixedTemplate { body: String },
    /// Prompt handed to the text generator
    AiText { prompt: String },
    /// Provider-approved template with positional parameters
    ApprovedTemplate(TemplateRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub name: String,
    pub language: String,
    /// Semantic variable key for each placeholder, in placeholder order
    pub parameter_mapping: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Template,
    Ai,
    MetaTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRuleConfig {
    pub minutes_before: i64,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_template_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_mapping: Option<Vec<String>>,
}

impl TryFrom<ReminderRuleConfig> for ReminderRule {
    type Error = String;

    fn try_from(config: ReminderRuleConfig) -> Result<Self, Self::Error> {
        if config.minutes_before < 0 {
            return Err(format!(
                "minutes_before must be >= 0, got {}",
                config.minutes_before
            ));
        }

        let content = match config.content_type {
            ContentType::Template => MessageContent::FixedTemplate {
                body: config
                    .template
                    .filter(|t| !t.trim().is_empty())
                    .ok_or("content_type 'template' requires 'template'")?,
            },
            ContentType::Ai => MessageContent::AiText {
                prompt: config.ai_prompt.unwrap_or_default(),
            },
            ContentType::MetaTemplate => MessageContent::ApprovedTemplate(TemplateRef {
                name: config
                    .meta_template_name
                    .filter(|n| !n.trim().is_empty())
                    .ok_or("content_type 'meta_template' requires 'meta_template_name'")?,
                language: config
                    .meta_template_language
                    .unwrap_or_else(|| "en".to_string()),
                parameter_mapping: config.parameter_mapping.unwrap_or_default(),
            }),
        };

        Ok(ReminderRule {
            minutes_before: config.minutes_before,
            content,
        })
    }
}

impl From<ReminderRule> for ReminderRuleConfig {
    fn from(rule: ReminderRule) -> Self {
        let mut config = ReminderRuleConfig {
            minutes_before: rule.minutes_before,
            content_type: ContentType::Template,
            template: None,
            ai_prompt: None,
            meta_template_name: None,
            meta_template_language: None,
            parameter_mapping: None,
        };
        match rule.content {
            MessageContent::FixedTemplate { body } => {
                config.template = Some(body);
            }
            MessageContent::AiText { prompt } => {
                config.content_type = ContentType::Ai;
                config.ai_prompt = Some(prompt);
            }
            MessageContent::ApprovedTemplate(template) => {
                config.content_type = ContentType::MetaTemplate;
                config.meta_template_name = Some(template.name);
                config.meta_template_language = Some(template.language);
                config.parameter_mapping = Some(template.parameter_mapping);
            }
        }
        config
    }
}

// ========================================
// Follow-up configuration
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FollowupConfig {
    pub enabled: bool,
    pub sequence: Vec<FollowupStep>,
    pub active_hours: ActiveHours,
    pub min_messages: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_instruction: Option<String>,
    pub meta_templates: Vec<MetaTemplate>,
    /// Cap on follow-up sends per conversation per local calendar day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_day: Option<i64>,
    /// Minimum hours between two follow-up sends to the same conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_hours: Option<f64>,
}

impl FollowupConfig {
    /// Step definition for a 1-based follow-up number
    pub fn step(&self, followup_number: i64) -> Option<&FollowupStep> {
        usize::try_from(followup_number - 1)
            .ok()
            .and_then(|index| self.sequence.get(index))
    }

    /// Approved template to use for a step once the session window has closed.
    /// Steps beyond the list reuse its last entry.
    pub fn meta_template_for(&self, followup_number: i64) -> Option<&MetaTemplate> {
        let index = usize::try_from(followup_number - 1).unwrap_or(0);
        self.meta_templates
            .get(index)
            .or_else(|| self.meta_templates.last())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupStep {
    pub delay_hours: f64,
    #[serde(default)]
    pub instruction: String,
}

impl FollowupStep {
    pub fn delay(&self) -> Duration {
        Duration::seconds((self.delay_hours.max(0.0) * 3600.0).round() as i64)
    }
}

/// Local time-of-day window `[start, end)`. Equal bounds mean "always active";
/// `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }
}

impl ActiveHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTemplate {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub params: Vec<String>,
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}

// ========================================
// Summary configuration
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub delay_minutes: i64,
    pub min_messages: i64,
    pub webhook_url: String,
    pub webhook_retry_count: i64,
    /// Seconds between webhook attempts
    pub webhook_retry_delay: i64,
    pub summary_prompt: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_minutes: 30,
            min_messages: 5,
            webhook_url: String::new(),
            webhook_retry_count: 3,
            webhook_retry_delay: 60,
            summary_prompt: String::new(),
        }
    }
}
