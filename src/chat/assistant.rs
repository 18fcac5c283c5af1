//! 对话助手：维护消息历史，把重分配请求转给 Dashboard，其余走后端通用聊天

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::chat::parser::ReallocationParser;
use crate::core::error::ChatError;
use crate::core::orchestrator::JobTicket;
use crate::core::Dashboard;

pub const GREETING: &str = "Hi, I'm the AI bot. How can I help you today?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    /// 毫秒时间戳
    pub sent_at: i64,
}

impl ChatMessage {
    fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            sent_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 一次发送的结果
#[derive(Clone, Debug)]
pub struct ChatReply {
    pub message: ChatMessage,
    /// 触发了重分配时带回任务回执
    pub reallocation: Option<JobTicket>,
}

pub struct ChatAssistant {
    parser: Arc<dyn ReallocationParser>,
    history: Vec<ChatMessage>,
}

impl ChatAssistant {
    pub fn new(parser: Arc<dyn ReallocationParser>) -> Self {
        Self {
            parser,
            history: vec![ChatMessage::new(Sender::Bot, GREETING)],
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// 发送一条用户消息；失败时用户消息仍保留在历史中
    pub async fn send(&mut self, dashboard: &Dashboard, text: &str) -> Result<ChatReply, ChatError> {
        self.history.push(ChatMessage::new(Sender::User, text));

        let (content, reallocation) = match self.parser.parse(text).await {
            Some(request) => {
                tracing::info!(
                    "Chat requested reallocation of participant {} to class {}",
                    request.target,
                    request.class
                );
                let ticket = dashboard.reallocate(request.target, request.class).await?;
                (request.suggestion, Some(ticket))
            }
            None => (dashboard.chat_reply(text).await?, None),
        };

        let message = ChatMessage::new(Sender::Bot, content);
        self.history.push(message.clone());
        Ok(ChatReply {
            message,
            reallocation,
        })
    }
}
