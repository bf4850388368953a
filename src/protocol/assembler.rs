//! Response assembler: builds protocol-shaped completion objects.
//!
//! Token usage is a whitespace-token count of the formatted prompt and of the
//! generated text. It approximates, and is not, a tokenizer count.

use serde::{Deserialize, Serialize};

use crate::config::ResponseConfig;
use crate::inference::backend::FinishReason;
use crate::inference::engine::GenerationResult;
use crate::unix_now;

pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";
pub const TEXT_COMPLETION_OBJECT: &str = "text_completion";

/// Whitespace-delimited token count.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn count(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = count_tokens(prompt);
        let completion_tokens = count_tokens(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Completion envelope shared by the chat and text shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse<C> {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<C>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChoice {
    pub text: String,
    pub index: usize,
    pub finish_reason: String,
}

pub type ChatCompletionResponse = CompletionResponse<ChatChoice>;
pub type TextCompletionResponse = CompletionResponse<TextChoice>;

#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler {
    report_engine_finish_reason: bool,
}

impl ResponseAssembler {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            report_engine_finish_reason: config.report_engine_finish_reason,
        }
    }

    /// Protocol finish reason for a successful generation. Unless configured
    /// otherwise this is always `stop`, whatever the engine reported.
    pub fn finish_reason(&self, engine: FinishReason) -> &'static str {
        if self.report_engine_finish_reason {
            engine.as_str()
        } else {
            FinishReason::Stop.as_str()
        }
    }

    fn envelope<C>(
        &self,
        object: &str,
        id: String,
        model: &str,
        prompt: &str,
        result: &GenerationResult,
        choice: C,
    ) -> CompletionResponse<C> {
        CompletionResponse {
            id,
            object: object.to_string(),
            created: unix_now().as_secs(),
            model: model.to_string(),
            choices: vec![choice],
            usage: Usage::count(prompt, &result.text),
        }
    }

    /// Chat-shaped response; `prompt` is the formatted conversation.
    pub fn chat(&self, model: &str, prompt: &str, result: &GenerationResult) -> ChatCompletionResponse {
        let choice = ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: result.text.clone(),
            },
            finish_reason: self.finish_reason(result.finish_reason).to_string(),
        };
        self.envelope(
            CHAT_COMPLETION_OBJECT,
            format!("chatcmpl-{}", result.request_id),
            model,
            prompt,
            result,
            choice,
        )
    }

    /// Text-completion-shaped response.
    pub fn text(&self, model: &str, prompt: &str, result: &GenerationResult) -> TextCompletionResponse {
        let choice = TextChoice {
            text: result.text.clone(),
            index: 0,
            finish_reason: self.finish_reason(result.finish_reason).to_string(),
        };
        self.envelope(
            TEXT_COMPLETION_OBJECT,
            format!("cmpl-{}", result.request_id),
            model,
            prompt,
            result,
            choice,
        )
    }
}
