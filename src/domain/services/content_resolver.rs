use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::entities::{
    Agent, Appointment, Conversation, ConversationMessage, DeliveryMeta, FollowupConfig,
    FollowupJob, MessageContent, SentVia, SummaryConfig, TemplateRef,
};
use crate::domain::errors::{GenerationError, ResolutionError};
use crate::domain::ports::channel_adapter::MessagePayload;
use crate::domain::ports::template_catalog::TemplateCatalog;
use crate::domain::ports::text_generator::{GenerationRequest, TextGenerator};
use crate::domain::services::placeholders;

const DEFAULT_SUMMARY_PROMPT: &str = "Summarize this conversation for the business team. \
Cover what the customer wanted, what was agreed and any open follow-up items.";

/// Semantic values available to templates and parameter mappings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    values: HashMap<String, String>,
}

impl TemplateVariables {
    pub const KEYS: [&'static str; 9] = [
        "customer_name",
        "customer_phone",
        "appointment_title",
        "appointment_date",
        "appointment_time",
        "appointment_day",
        "appointment_duration",
        "agent_name",
        "business_name",
    ];

    pub fn for_appointment(agent: &Agent, appointment: &Appointment) -> Self {
        let local = appointment.start_time.with_timezone(&agent.tz());
        let mut vars = Self::for_agent(agent);
        vars.insert("customer_name", &appointment.customer_name);
        vars.insert("customer_phone", &appointment.customer_phone);
        vars.insert("appointment_title", &appointment.title);
        vars.insert("appointment_date", &local.format("%Y-%m-%d").to_string());
        vars.insert("appointment_time", &local.format("%H:%M").to_string());
        vars.insert("appointment_day", &local.format("%A").to_string());
        vars.insert(
            "appointment_duration",
            &format!("{} min", appointment.duration_minutes),
        );
        vars
    }

    pub fn for_conversation(agent: &Agent, conversation: &Conversation) -> Self {
        let mut vars = Self::for_agent(agent);
        vars.insert("customer_name", &conversation.customer_name);
        vars.insert("customer_phone", &conversation.customer_phone);
        vars
    }

    fn for_agent(agent: &Agent) -> Self {
        let mut vars = Self::default();
        vars.insert("agent_name", &agent.name);
        vars.insert("business_name", agent.business_display_name());
        vars
    }

    fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.values
    }
}

/// Content ready to hand to a channel adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    pub payload: MessagePayload,
    pub sent_via: SentVia,
    pub ai_reason: Option<String>,
}

impl ResolvedContent {
    pub fn meta(&self) -> DeliveryMeta {
        let template_name = match &self.payload {
            MessagePayload::Template { name, .. } => Some(name.clone()),
            MessagePayload::Text { .. } => None,
        };
        DeliveryMeta {
            sent_via: Some(self.sent_via),
            content: Some(self.payload.preview().to_string()),
            template_name,
            ai_reason: self.ai_reason.clone(),
            provider_message_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FollowupDecision {
    send: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: String,
}

/// Turns a job's configured content into concrete message text or template parameters
#[derive(Clone)]
pub struct ContentResolver {
    templates: Arc<dyn TemplateCatalog>,
    generator: Arc<dyn TextGenerator>,
    ai_timeout: Duration,
}

impl ContentResolver {
    pub fn new(
        templates: Arc<dyn TemplateCatalog>,
        generator: Arc<dyn TextGenerator>,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            templates,
            generator,
            ai_timeout,
        }
    }

    pub async fn resolve_reminder(
        &self,
        agent: &Agent,
        content: &MessageContent,
        vars: &TemplateVariables,
        history: Vec<ConversationMessage>,
    ) -> Result<ResolvedContent, ResolutionError> {
        match content {
            MessageContent::FixedTemplate { body } => Ok(ResolvedContent {
                payload: MessagePayload::Text {
                    body: placeholders::fill_named(body, vars.as_map()),
                },
                sent_via: SentVia::FixedTemplate,
                ai_reason: None,
            }),
            MessageContent::AiText { prompt } => {
                let request = GenerationRequest {
                    agent_id: agent.id,
                    system_prompt: system_prompt(agent),
                    instruction: placeholders::fill_named(prompt, vars.as_map()),
                    history,
                };
                let body = self.generate(&request).await?;
                Ok(ResolvedContent {
                    payload: MessagePayload::Text { body },
                    sent_via: SentVia::AiText,
                    ai_reason: None,
                })
            }
            MessageContent::ApprovedTemplate(template) => {
                self.resolve_approved(agent.id, template, vars).await
            }
        }
    }

    /// Inside the channel's session window the step is written by the AI; outside it
    /// only approved templates may be sent.
    pub async fn resolve_followup(
        &self,
        agent: &Agent,
        config: &FollowupConfig,
        job: &FollowupJob,
        conversation: &Conversation,
        history: Vec<ConversationMessage>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedContent, ResolutionError> {
        let vars = TemplateVariables::for_conversation(agent, conversation);

        if !conversation.session_open(agent.channel, now) {
            let template = config
                .meta_template_for(job.followup_number)
                .ok_or(ResolutionError::NoTemplateAvailable)?;
            let template = TemplateRef {
                name: template.name.clone(),
                language: template.language.clone(),
                parameter_mapping: template.params.clone(),
            };
            return self.resolve_approved(agent.id, &template, &vars).await;
        }

        let step_instruction = config
            .step(job.followup_number)
            .map(|step| step.instruction.as_str())
            .unwrap_or_default();
        let mut instruction = String::new();
        if let Some(general) = config.general_instruction.as_deref() {
            instruction.push_str(general.trim());
            instruction.push_str("\n\n");
        }
        instruction.push_str(&format!(
            "The customer has not replied. Write follow-up message #{} to re-engage them.",
            job.followup_number
        ));
        if !step_instruction.trim().is_empty() {
            instruction.push('\n');
            instruction.push_str(step_instruction.trim());
        }
        instruction.push_str(
            "\n\nIf a follow-up would be inappropriate, answer with JSON \
             {\"send\": false, \"reason\": \"...\"}. Otherwise answer with \
             {\"send\": true, \"message\": \"...\", \"reason\": \"...\"} or just the message text.",
        );

        let request = GenerationRequest {
            agent_id: agent.id,
            system_prompt: system_prompt(agent),
            instruction: placeholders::fill_named(&instruction, vars.as_map()),
            history,
        };
        let raw = self.generate(&request).await?;

        match parse_decision(&raw) {
            Some(decision) if !decision.send => Err(ResolutionError::Declined(decision.reason)),
            Some(decision) => {
                if decision.message.trim().is_empty() {
                    return Err(GenerationError::Empty.into());
                }
                Ok(ResolvedContent {
                    payload: MessagePayload::Text {
                        body: decision.message,
                    },
                    sent_via: SentVia::AiText,
                    ai_reason: Some(decision.reason).filter(|r| !r.is_empty()),
                })
            }
            None => Ok(ResolvedContent {
                payload: MessagePayload::Text { body: raw },
                sent_via: SentVia::AiText,
                ai_reason: None,
            }),
        }
    }

    pub async fn generate_summary(
        &self,
        agent: &Agent,
        config: &SummaryConfig,
        history: Vec<ConversationMessage>,
    ) -> Result<String, GenerationError> {
        let instruction = if config.summary_prompt.trim().is_empty() {
            DEFAULT_SUMMARY_PROMPT.to_string()
        } else {
            config.summary_prompt.clone()
        };
        let request = GenerationRequest {
            agent_id: agent.id,
            system_prompt: system_prompt(agent),
            instruction,
            history,
        };
        self.generate(&request).await
    }

    async fn resolve_approved(
        &self,
        agent_id: i64,
        template: &TemplateRef,
        vars: &TemplateVariables,
    ) -> Result<ResolvedContent, ResolutionError> {
        let live = self
            .templates
            .find_template(agent_id, &template.name, &template.language)
            .await
            .map_err(|e| ResolutionError::Storage(e.to_string()))?
            .ok_or_else(|| ResolutionError::TemplateNotFound {
                name: template.name.clone(),
                language: template.language.clone(),
            })?;

        let expected = live.placeholder_count();
        if expected != template.parameter_mapping.len() {
            return Err(ResolutionError::MappingMismatch {
                template: live.name,
                expected,
                actual: template.parameter_mapping.len(),
            });
        }

        let parameters = template
            .parameter_mapping
            .iter()
            .map(|key| {
                vars.get(key)
                    .map(str::to_string)
                    .ok_or_else(|| ResolutionError::UnknownVariable(key.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedContent {
            payload: MessagePayload::Template {
                preview: placeholders::fill_numbered(&live.body, &parameters),
                name: live.name,
                language: live.language,
                parameters,
            },
            sent_via: SentVia::ApprovedTemplate,
            ai_reason: None,
        })
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let text = tokio::time::timeout(self.ai_timeout, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.ai_timeout.as_secs()))??;

        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

fn system_prompt(agent: &Agent) -> String {
    match agent.persona.as_deref() {
        Some(persona) if !persona.trim().is_empty() => persona.to_string(),
        _ => format!(
            "You are {}, a messaging assistant for {}.",
            agent.name,
            agent.business_display_name()
        ),
    }
}

fn parse_decision(raw: &str) -> Option<FollowupDecision> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if !unfenced.starts_with('{') {
        return None;
    }
    serde_json::from_str(unfenced).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AppointmentStatus, ApprovedTemplate, Channel, MetaTemplate};
    use crate::infrastructure::http::middleware::error::ApiResult;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    struct StaticCatalog(Vec<ApprovedTemplate>);

    #[async_trait]
    impl TemplateCatalog for StaticCatalog {
        async fn find_template(
            &self,
            agent_id: i64,
            name: &str,
            language: &str,
        ) -> ApiResult<Option<ApprovedTemplate>> {
            Ok(self
                .0
                .iter()
                .find(|t| t.agent_id == agent_id && t.name == name && t.language == language)
                .cloned())
        }
    }

    struct CannedGenerator {
        reply: Result<String, GenerationError>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl CannedGenerator {
        fn new(reply: Result<String, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    fn agent() -> Agent {
        let mut agent = Agent::new(1, "Lia".into(), "UTC".into(), Channel::Whatsapp);
        agent.business_name = Some("Bright Smiles".into());
        agent
    }

    fn appointment() -> Appointment {
        Appointment {
            id: 5,
            agent_id: 1,
            conversation_id: Some(9),
            customer_name: "Ana".into(),
            customer_phone: "+5511999".into(),
            title: "Cleaning".into(),
            start_time: Utc.with_ymd_and_hms(2026, 6, 1, 14, 30, 0).unwrap(),
            duration_minutes: 45,
            status: AppointmentStatus::Scheduled,
        }
    }

    fn reminder_template() -> ApprovedTemplate {
        ApprovedTemplate {
            agent_id: 1,
            name: "appt_reminder".into(),
            language: "en".into(),
            category: "UTILITY".into(),
            body: "Hi {{1}}, see you at {{2}}.".into(),
        }
    }

    fn resolver(generator: Arc<dyn TextGenerator>) -> ContentResolver {
        ContentResolver::new(
            Arc::new(StaticCatalog(vec![reminder_template()])),
            generator,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_approved_template_maps_parameters_in_order() {
        let resolver = resolver(CannedGenerator::new(Ok("unused".into())));
        let vars = TemplateVariables::for_appointment(&agent(), &appointment());
        let content = MessageContent::ApprovedTemplate(TemplateRef {
            name: "appt_reminder".into(),
            language: "en".into(),
            parameter_mapping: vec!["customer_name".into(), "appointment_time".into()],
        });

        let resolved = resolver
            .resolve_reminder(&agent(), &content, &vars, vec![])
            .await
            .unwrap();

        assert_eq!(resolved.sent_via, SentVia::ApprovedTemplate);
        match resolved.payload {
            MessagePayload::Template {
                name,
                parameters,
                preview,
                ..
            } => {
                assert_eq!(name, "appt_reminder");
                assert_eq!(parameters, vec!["Ana".to_string(), "14:30".to_string()]);
                assert_eq!(preview, "Hi Ana, see you at 14:30.");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mapping_length_mismatch_is_config_defect() {
        let resolver = resolver(CannedGenerator::new(Ok("unused".into())));
        let vars = TemplateVariables::for_appointment(&agent(), &appointment());
        let content = MessageContent::ApprovedTemplate(TemplateRef {
            name: "appt_reminder".into(),
            language: "en".into(),
            parameter_mapping: vec!["customer_name".into()],
        });

        let err = resolver
            .resolve_reminder(&agent(), &content, &vars, vec![])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::MappingMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert!(err.is_config_defect());
    }

    #[tokio::test]
    async fn test_fixed_template_substitutes_semantic_keys() {
        let resolver = resolver(CannedGenerator::new(Ok("unused".into())));
        let vars = TemplateVariables::for_appointment(&agent(), &appointment());
        let content = MessageContent::FixedTemplate {
            body: "{{customer_name}}, your {{appointment_title}} at {{business_name}} is on {{appointment_day}}".into(),
        };

        let resolved = resolver
            .resolve_reminder(&agent(), &content, &vars, vec![])
            .await
            .unwrap();

        assert_eq!(
            resolved.payload.preview(),
            "Ana, your Cleaning at Bright Smiles is on Monday"
        );
    }

    #[tokio::test]
    async fn test_ai_text_used_verbatim() {
        let generator = CannedGenerator::new(Ok("  See you tomorrow, Ana!  ".into()));
        let resolver = resolver(generator.clone());
        let vars = TemplateVariables::for_appointment(&agent(), &appointment());
        let content = MessageContent::AiText {
            prompt: "Remind {{customer_name}} kindly".into(),
        };

        let resolved = resolver
            .resolve_reminder(&agent(), &content, &vars, vec![])
            .await
            .unwrap();

        assert_eq!(resolved.payload.preview(), "  See you tomorrow, Ana!  ");
        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].instruction, "Remind Ana kindly");
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let resolver = resolver(Arc::new(SlowGenerator));
        let vars = TemplateVariables::for_appointment(&agent(), &appointment());
        let content = MessageContent::AiText {
            prompt: "hi".into(),
        };

        let err = resolver
            .resolve_reminder(&agent(), &content, &vars, vec![])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::Generation(GenerationError::Timeout(1))
        ));
        assert!(!err.is_config_defect());
    }

    fn followup_fixture(
        last_customer: DateTime<Utc>) -> (FollowupConfig, FollowupJob, Conversation,
    ) {
        let config = FollowupConfig {
            enabled: true,
            sequence: vec![crate::domain::entities::FollowupStep {
                delay_hours: 3.0,
                instruction: "Ask if they still want the quote".into(),
            }],
            ..Default::default()
        };
        let due = last_customer + ChronoDuration::hours(3);
        let job = FollowupJob::new(1, 9, 1, last_customer, due);
        let mut conversation = Conversation::new(9, 1, "Ana".into(), "+5511999".into());
        conversation.last_customer_message_at = Some(last_customer);
        conversation.last_message_at = Some(last_customer + ChronoDuration::minutes(2));
        (config, job, conversation)
    }

    #[tokio::test]
    async fn test_followup_outside_session_without_templates_is_skipped() {
        let resolver = resolver(CannedGenerator::new(Ok("unused".into())));
        let now = Utc::now();
        let (config, job, conversation) = followup_fixture(now - ChronoDuration::hours(30));

        let err = resolver
            .resolve_followup(&agent(), &config, &job, &conversation, vec![], now)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolutionError::NoTemplateAvailable));
        assert_eq!(err.to_string(), "no template available");
    }

    #[tokio::test]
    async fn test_followup_outside_session_uses_meta_template() {
        let resolver = resolver(CannedGenerator::new(Ok("unused".into())));
        let now = Utc::now();
        let (mut config, job, conversation) = followup_fixture(now - ChronoDuration::hours(30));
        config.meta_templates = vec![MetaTemplate {
            name: "appt_reminder".into(),
            language: "en".into(),
            params: vec!["customer_name".into(), "business_name".into()],
        }];

        let resolved = resolver
            .resolve_followup(&agent(), &config, &job, &conversation, vec![], now)
            .await
            .unwrap();

        assert_eq!(resolved.sent_via, SentVia::ApprovedTemplate);
        assert_eq!(resolved.payload.preview(), "Hi Ana, see you at Bright Smiles.");
    }

    #[tokio::test]
    async fn test_followup_ai_decline_is_recorded() {
        let generator = CannedGenerator::new(Ok(
            "```json\n{\"send\": false, \"reason\": \"customer said goodbye\"}\n```".into(),
        ));
        let resolver = resolver(generator);
        let now = Utc::now();
        let (config, job, conversation) = followup_fixture(now - ChronoDuration::hours(4));

        let err = resolver
            .resolve_followup(&agent(), &config, &job, &conversation, vec![], now)
            .await
            .unwrap_err();

        match err {
            ResolutionError::Declined(reason) => assert_eq!(reason, "customer said goodbye"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_followup_ai_decision_message() {
        let generator = CannedGenerator::new(Ok(
            r#"{"send": true, "message": "Still interested, Ana?", "reason": "quote pending"}"#.into(),
        ));
        let resolver = resolver(generator.clone());
        let now = Utc::now();
        let (config, job, conversation) = followup_fixture(now - ChronoDuration::hours(4));

        let resolved = resolver
            .resolve_followup(&agent(), &config, &job, &conversation, vec![], now)
            .await
            .unwrap();

        assert_eq!(resolved.payload.preview(), "Still interested, Ana?");
        assert_eq!(resolved.ai_reason.as_deref(), Some("quote pending"));
        let requests = generator.requests.lock().unwrap();
        assert!(requests[0].instruction.contains("Ask if they still want the quote"));
    }

    #[test]
    fn test_parse_decision_ignores_plain_text() {
        assert!(parse_decision("Hi there!").is_none());
        assert!(parse_decision("{not json").is_none());
        assert!(parse_decision(r#"{"send": true, "message": "x"}"#).unwrap().send);
    }
}
