// ==========================================
// 服务排程编排系统 - 外部顾问: 传输层
// ==========================================
// AdvisorTransport: 可注入的远程文本推理接口（测试用桩实现）
// HttpAdvisorTransport: OpenAI 兼容的 chat/completions 接口
// ==========================================

use super::prompt::AdvisorPrompt;
use crate::engine::error::{SchedulingError, SchedulingResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait AdvisorTransport: Send + Sync {
    /// 发送提示词，返回原始文本响应
    async fn complete(&self, prompt: &AdvisorPrompt) -> SchedulingResult<String>;
}

#[derive(Debug, Clone)]
pub struct HttpAdvisorConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl HttpAdvisorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

pub struct HttpAdvisorTransport {
    client: reqwest::Client,
    config: HttpAdvisorConfig,
}

impl HttpAdvisorTransport {
    pub fn new(config: HttpAdvisorConfig) -> SchedulingResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SchedulingError::Configuration("外部顾问缺少 API key".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SchedulingError::Configuration(format!("HTTP 客户端构建失败: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl AdvisorTransport for HttpAdvisorTransport {
    async fn complete(&self, prompt: &AdvisorPrompt) -> SchedulingResult<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| SchedulingError::Configuration(e.to_string()))?,
        );

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| SchedulingError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SchedulingError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SchedulingError::Transport(format!("响应解析失败: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SchedulingError::Transport("响应缺少 choices".to_string()))
    }
}
