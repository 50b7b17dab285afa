// ==========================================
// 服务排程编排系统 - 外部顾问策略（"llm_based"）
// ==========================================
// 流程: 构造提示词 → 查缓存 → 带超时/指数退避的远程调用 →
//       解析校验 → 生成访问列表
// 任何一步失败都退化为综合评分选择
// ==========================================

pub mod cache;
pub mod parser;
pub mod prompt;
pub mod transport;

pub use transport::{AdvisorTransport, HttpAdvisorConfig, HttpAdvisorTransport};

use crate::domain::context::SchedulingContext;
use crate::domain::result::StrategyResult;
use crate::domain::types::StrategyKind;
use crate::engine::calendar;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::{self, CompositeWeights};
use crate::engine::strategies::weights_from_config;
use crate::engine::strategy::{composite_selection, SchedulingStrategy, StrategyConfig, MIN_FEASIBLE_CONFIDENCE};
use async_trait::async_trait;
use cache::ResponseCache;
use parser::AdvisorRecommendation;
use prompt::AdvisorPrompt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 未在参数中给出 api_key 时读取的环境变量
pub const API_KEY_ENV: &str = "SERVICE_VISIT_APS_ADVISOR_API_KEY";

#[derive(Debug, Clone, Serialize)]
pub struct AdvisorParameters {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub weights: CompositeWeights,
}

impl Default for AdvisorParameters {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            cache_ttl_secs: cache::DEFAULT_TTL.as_secs(),
            cache_max_entries: cache::DEFAULT_MAX_ENTRIES,
            endpoint: None,
            model: None,
            temperature: None,
            weights: CompositeWeights::default(),
        }
    }
}

/// 一次成功的顾问调用
struct AdvisorReply {
    recommendation: AdvisorRecommendation,
    cached: bool,
}

pub struct ExternalAdvisorStrategy {
    id: String,
    version: String,
    params: AdvisorParameters,
    transport: Option<Arc<dyn AdvisorTransport>>,
    cache: ResponseCache,
}

impl ExternalAdvisorStrategy {
    pub fn new() -> Self {
        Self {
            id: StrategyKind::LlmBased.as_str().to_string(),
            version: "1.0.0".to_string(),
            params: AdvisorParameters::default(),
            transport: None,
            cache: ResponseCache::default(),
        }
    }

    /// 注入传输实现（初始化时不再要求凭证）
    pub fn with_transport(transport: Arc<dyn AdvisorTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new()
        }
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.params.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    /// 带超时与指数退避的调用
    async fn call_with_retry(&self, transport: &dyn AdvisorTransport, prompt: &AdvisorPrompt) -> SchedulingResult<String> {
        let attempts = self.params.max_retries.max(1);
        let per_call = Duration::from_millis(self.params.timeout_ms);
        let mut last_error = SchedulingError::Transport("未发起调用".to_string());

        for attempt in 0..attempts {
            match tokio::time::timeout(per_call, transport.complete(prompt)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "外部顾问调用失败");
                    last_error = e;
                }
                Err(_) => {
                    warn!(attempt, timeout_ms = self.params.timeout_ms, "外部顾问调用超时");
                    last_error = SchedulingError::Transport(format!("调用超时（{}ms）", self.params.timeout_ms));
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(last_error.into_scheduling())
    }

    async fn consult(&self, ctx: &SchedulingContext) -> SchedulingResult<AdvisorReply> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| SchedulingError::Configuration("外部顾问未初始化".to_string()))?;

        let prompt = prompt::build_prompt(ctx);
        let key = cache::cache_key(&prompt.cache_material());

        if let Some(text) = self.cache.get(&key) {
            debug!("外部顾问命中缓存");
            let recommendation = parser::parse_recommendation(&text, ctx)?;
            return Ok(AdvisorReply {
                recommendation,
                cached: true,
            });
        }

        let text = self.call_with_retry(transport.as_ref(), &prompt).await?;
        let recommendation = parser::parse_recommendation(&text, ctx)?;
        self.cache.put(key, text);
        Ok(AdvisorReply {
            recommendation,
            cached: false,
        })
    }

    fn build_result(&self, ctx: &SchedulingContext, reply: AdvisorReply) -> SchedulingResult<StrategyResult> {
        let rec = reply.recommendation;
        let partner = ctx
            .find_partner(&rec.recommended_partner_id)
            .ok_or_else(|| SchedulingError::Scheduling(format!("合作方不存在: {}", rec.recommended_partner_id)))?;

        let mut plan = calendar::plan_visit_parameters(ctx);
        let bounds = calendar::effective_duration_bounds(ctx);
        if let Some(duration) = rec.duration_hours() {
            plan.duration_hours = calendar::clamp_duration(duration, bounds);
        }
        if let Some(visits) = rec.visits_per_month() {
            let min_visits = ctx.requirement.required_visit_frequency.min_visits_per_month();
            plan.visits_per_month = visits.max(min_visits);
        }
        // 每月次数 × 时长不得超过法规上限
        let plan = calendar::clamp_plan(ctx, plan);
        let preferred = rec.preferred_start().unwrap_or(ctx.installation.working_hours.start);

        let visits = calendar::normalize_visits(ctx, calendar::materialize_visits(ctx, plan, preferred));
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling("顾问参数下没有可排访问".to_string()));
        }

        let composite = scoring::composite_score(partner, ctx, &self.params.weights);
        info!(
            partner = %partner.id,
            confidence = rec.confidence,
            cached = reply.cached,
            "外部顾问生成排程"
        );

        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::LlmBased,
            partner.id.clone(),
            partner.name.clone(),
            composite.score,
            rec.confidence >= MIN_FEASIBLE_CONFIDENCE,
            rec.confidence,
            visits,
            serde_json::json!({
                "mode": "advisor",
                "cached": reply.cached,
                "reasoning": rec.reasoning,
                "visit_plan": plan,
                "alternatives": rec.alternatives,
                "risk_factors": rec.risk_factors,
            }),
        ))
    }
}

impl Default for ExternalAdvisorStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingStrategy for ExternalAdvisorStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LlmBased
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or_default()
    }

    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()> {
        let mut params = AdvisorParameters::default();
        if let Some(v) = config.param_u64("timeout_ms")? {
            params.timeout_ms = v;
        }
        if let Some(v) = config.param_u64("max_retries")? {
            params.max_retries = v.clamp(1, 10) as u32;
        }
        if let Some(v) = config.param_u64("backoff_base_ms")? {
            params.backoff_base_ms = v;
        }
        if let Some(v) = config.param_u64("cache_ttl_secs")? {
            params.cache_ttl_secs = v;
        }
        if let Some(v) = config.param_u64("cache_max_entries")? {
            params.cache_max_entries = v as usize;
        }
        params.endpoint = config.param_str("endpoint")?;
        params.model = config.param_str("model")?;
        params.temperature = config.param_f64("temperature")?;
        if let Some(w) = weights_from_config(config)? {
            params.weights = w;
        }

        if self.transport.is_none() {
            let api_key = match config.param_str("api_key")? {
                Some(key) => key,
                None => std::env::var(API_KEY_ENV).unwrap_or_default(),
            };
            let mut http = HttpAdvisorConfig::new(api_key);
            if let Some(endpoint) = &params.endpoint {
                http.endpoint = endpoint.clone();
            }
            if let Some(model) = &params.model {
                http.model = model.clone();
            }
            if let Some(t) = params.temperature {
                http.temperature = t as f32;
            }
            http.timeout_secs = (params.timeout_ms / 1000).max(1);
            let transport = HttpAdvisorTransport::new(http)?;
            info!(model = transport.model(), "外部顾问 HTTP 传输已就绪");
            self.transport = Some(Arc::new(transport));
        }

        self.cache = ResponseCache::new(Duration::from_secs(params.cache_ttl_secs), params.cache_max_entries);
        self.params = params;
        self.version = config.version.clone();
        Ok(())
    }

    #[instrument(skip_all, fields(run_id = %context.run_id))]
    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        let ctx = context.as_ref();
        let outcome = match self.consult(ctx).await {
            Ok(reply) => self.build_result(ctx, reply),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(error = %e, "外部顾问失败，退化为综合评分");
                composite_selection(&self.id, StrategyKind::LlmBased, ctx, &self.params.weights, &e.to_string())
            }
        }
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
