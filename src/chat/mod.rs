//! 对话路径：重分配意图解析 + 对话助手

pub mod assistant;
pub mod parser;

pub use assistant::{ChatAssistant, ChatMessage, ChatReply, Sender, GREETING};
pub use parser::{
    HybridParser, LlmReallocationParser, ReallocationParser, ReallocationRequest, RuleBasedParser,
};
