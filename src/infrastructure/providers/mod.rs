pub mod http_channel;
pub mod mock_channel;
pub mod openai_generator;
pub mod webhook_client;

pub use http_channel::HttpChannelAdapter;
pub use mock_channel::MockChannelAdapter;
pub use openai_generator::OpenAiTextGenerator;
pub use webhook_client::ReqwestWebhookSender;
