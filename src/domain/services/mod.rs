pub mod content_resolver;
pub mod placeholders;
pub mod policy_evaluator;
pub mod retry_policy;
pub mod state_machine;
pub mod webhook_signature;

pub use content_resolver::{ContentResolver, ResolvedContent, TemplateVariables};
pub use policy_evaluator::{
    evaluate_followup, evaluate_reminder, local_day, next_local_midnight, FollowupPolicyInput,
    PolicyDecision,
};
pub use retry_policy::{next_attempt, RetryDecision};
pub use state_machine::{source_states, validate_transition};
