// ==========================================
// Mock 策略 - 用于编排器集成测试
// ==========================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;
use service_visit_aps::domain::result::StrategyResult;
use service_visit_aps::domain::schedule::Visit;
use service_visit_aps::domain::types::{StrategyKind, VisitType};
use service_visit_aps::domain::SchedulingContext;
use service_visit_aps::engine::calendar;
use service_visit_aps::engine::error::{SchedulingError, SchedulingResult};
use service_visit_aps::engine::strategy::{SchedulingStrategy, StrategyConfig};

/// 永不返回的策略（用于超时测试）
pub struct NeverReturningStrategy {
    pub id: String,
}

impl NeverReturningStrategy {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl SchedulingStrategy for NeverReturningStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LlmBased
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    async fn initialize(&mut self, _config: &StrategyConfig) -> SchedulingResult<()> {
        Ok(())
    }

    async fn generate_schedule(&self, _context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        std::future::pending::<SchedulingResult<StrategyResult>>().await
    }
}

/// 总是失败的策略
pub struct FailingStrategy {
    pub id: String,
    pub kind: StrategyKind,
    pub calls: AtomicUsize,
}

impl FailingStrategy {
    pub fn new(id: &str, kind: StrategyKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SchedulingStrategy for FailingStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    async fn initialize(&mut self, _config: &StrategyConfig) -> SchedulingResult<()> {
        Ok(())
    }

    async fn generate_schedule(&self, _context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SchedulingError::Scheduling(format!("{} 无可行合作方", self.id)))
    }
}

/// 初始化即失败的策略（注册时被排除）
#[derive(Debug)]
pub struct MisconfiguredStrategy;

#[async_trait]
impl SchedulingStrategy for MisconfiguredStrategy {
    fn id(&self) -> &str {
        "misconfigured"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LlmBased
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    async fn initialize(&mut self, _config: &StrategyConfig) -> SchedulingResult<()> {
        Err(SchedulingError::Configuration("缺少凭证".to_string()))
    }

    async fn generate_schedule(&self, _context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        Err(SchedulingError::Internal("不应被调用".to_string()))
    }
}

/// 固定选择某合作方的策略
pub struct FixedPartnerStrategy {
    pub id: String,
    pub kind: StrategyKind,
    pub partner_id: String,
    pub score: f64,
    pub confidence: f64,
    pub feasible: bool,
}

impl FixedPartnerStrategy {
    pub fn new(id: &str, partner_id: &str, score: f64, confidence: f64) -> Self {
        Self {
            id: id.to_string(),
            kind: StrategyKind::RuleBased,
            partner_id: partner_id.to_string(),
            score,
            confidence,
            feasible: true,
        }
    }

    pub fn infeasible(mut self) -> Self {
        self.feasible = false;
        self
    }
}

#[async_trait]
impl SchedulingStrategy for FixedPartnerStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "partner_id": self.partner_id })
    }

    async fn initialize(&mut self, _config: &StrategyConfig) -> SchedulingResult<()> {
        Ok(())
    }

    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        let name = context
            .find_partner(&self.partner_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        Ok(StrategyResult::new(
            self.id.clone(),
            self.kind,
            self.partner_id.clone(),
            name,
            self.score,
            self.feasible,
            self.confidence,
            calendar::default_visits(&context),
            serde_json::json!({ "mode": "fixed" }),
        ))
    }
}

/// 返回排程期外、周末夜间访问的策略
pub struct OffCalendarStrategy {
    pub id: String,
    pub partner_id: String,
}

impl OffCalendarStrategy {
    pub fn new(id: &str, partner_id: &str) -> Self {
        Self {
            id: id.to_string(),
            partner_id: partner_id.to_string(),
        }
    }
}

#[async_trait]
impl SchedulingStrategy for OffCalendarStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LinearProgramming
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    async fn initialize(&mut self, _config: &StrategyConfig) -> SchedulingResult<()> {
        Ok(())
    }

    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        // 周六 22:00 开始 3 小时，跨零点
        let date = context.end_date + chrono::Duration::days(4);
        let visit = Visit::new(
            date,
            NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            3.0,
            VisitType::Initial,
        );
        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::LinearProgramming,
            self.partner_id.clone(),
            self.partner_id.clone(),
            1.0,
            true,
            1.0,
            vec![visit],
            serde_json::json!({ "mode": "off_calendar" }),
        ))
    }
}
