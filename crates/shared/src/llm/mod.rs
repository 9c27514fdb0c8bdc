pub mod gateway;
pub mod openrouter;
pub mod prompts;

pub use gateway::{
    ChatMessage, LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest,
    LlmGatewayResponse, LlmTokenUsage,
};
pub use openrouter::{
    OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig, OpenRouterModelRoute,
};
pub use prompts::DEFAULT_SYSTEM_PROMPT;
