// ==========================================
// 服务排程编排系统 - 排程 API
// ==========================================
// 职责:
// - 对外暴露排程生成（类型化与 JSON 两种入口）
// - 查询算法表现台账与策略注册状态
// - 清空策略实例缓存
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::algorithm::AlgorithmRecord;
use crate::domain::context::ScheduleRequest;
use crate::domain::schedule::Schedule;
use crate::domain::types::StrategyKind;
use crate::engine::orchestrator::{OrchestrationOutcome, SchedulingOrchestrator};
use crate::engine::strategies::PatternMatchStrategy;
use crate::repository::schedule_repo::SqliteScheduleStore;

/// 策略注册状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub strategy_id: String,
    pub registered: bool,
    pub excluded_reason: Option<String>,
}

pub struct ScheduleApi {
    orchestrator: Arc<SchedulingOrchestrator>,
    schedule_reader: Option<Arc<SqliteScheduleStore>>,
    pattern_feedback: Option<Arc<PatternMatchStrategy>>,
}

impl ScheduleApi {
    pub fn new(orchestrator: Arc<SchedulingOrchestrator>) -> Self {
        Self {
            orchestrator,
            schedule_reader: None,
            pattern_feedback: None,
        }
    }

    /// 挂接排程查询（已持久化排程的读取）
    pub fn with_schedule_reader(mut self, reader: Arc<SqliteScheduleStore>) -> Self {
        self.schedule_reader = Some(reader);
        self
    }

    /// 挂接模式匹配策略: 每次生成后回灌采用结果与预测命中
    pub fn with_pattern_feedback(mut self, strategy: Arc<PatternMatchStrategy>) -> Self {
        self.pattern_feedback = Some(strategy);
        self
    }

    fn reader(&self) -> ApiResult<&SqliteScheduleStore> {
        self.schedule_reader
            .as_deref()
            .ok_or_else(|| ApiError::InternalError("未配置排程存储".to_string()))
    }

    /// 生成排程
    ///
    /// # 返回
    /// - Ok(outcome): 正式排程 + 全部运行 + 表现对比
    /// - Err(ValidationError): 请求缺字段/日期非法/服务点或合同不存在
    /// - Err(NoFeasibleSchedule): 全部策略与兜底均失败
    #[instrument(skip_all, fields(
        contract = request.contract_code.as_deref().unwrap_or(""),
        installation = request.installation_code.as_deref().unwrap_or("")
    ))]
    pub async fn generate_schedule(&self, request: &ScheduleRequest) -> ApiResult<OrchestrationOutcome> {
        let outcome = self.orchestrator.generate(request).await?;
        info!(
            schedule_id = %outcome.schedule.schedule_id,
            strategy = %outcome.schedule.strategy_name,
            used_fallback = outcome.used_fallback,
            "排程已生成"
        );
        self.feed_pattern_model(&outcome);
        Ok(outcome)
    }

    /// 反馈失败只记日志，不影响已落盘的排程
    fn feed_pattern_model(&self, outcome: &OrchestrationOutcome) {
        let strategy = match self.pattern_feedback.as_ref() {
            Some(strategy) => strategy,
            None => return,
        };
        let actual = outcome.schedule.partner_id.as_str();
        let predicted = std::iter::once(&outcome.selected)
            .chain(outcome.alternatives.iter().filter_map(|run| run.result.as_ref()))
            .find(|result| result.strategy_id == StrategyKind::MachineLearning.as_str())
            .map(|result| result.partner_id.clone());

        if let Some(predicted) = predicted {
            if let Err(e) = strategy.record_prediction_feedback(&predicted, actual) {
                warn!(error = %e, "模式预测反馈写入失败");
            }
        }
        match strategy.record_outcome(&outcome.context, actual, outcome.selected.score) {
            Ok(()) => debug!(partner = actual, examples = strategy.example_count(), "采用结果已回灌模式模型"),
            Err(e) => warn!(error = %e, "模式样本写入失败"),
        }
    }

    /// JSON 入口：请求与结果均为 JSON 文本
    pub async fn generate_schedule_json(&self, request_json: &str) -> ApiResult<String> {
        let request: ScheduleRequest = serde_json::from_str(request_json)
            .map_err(|e| ApiError::InvalidInput(format!("请求 JSON 解析失败: {}", e)))?;
        let outcome = self.generate_schedule(&request).await?;
        serde_json::to_string_pretty(&outcome)
            .map_err(|e| ApiError::InternalError(format!("结果序列化失败: {}", e)))
    }

    /// 读取已保存的排程（含访问明细）
    pub fn get_schedule(&self, schedule_id: &str) -> ApiResult<Schedule> {
        self.reader()?
            .find_by_id(schedule_id)?
            .ok_or_else(|| ApiError::NotFound(format!("排程(id={})不存在", schedule_id)))
    }

    /// 某服务点的排程ID列表（新到旧）
    pub fn list_schedule_ids(&self, installation_code: &str) -> ApiResult<Vec<String>> {
        Ok(self.reader()?.list_ids_by_installation(installation_code)?)
    }

    /// 算法表现台账（按名称排序）
    pub fn algorithm_performance(&self) -> Vec<AlgorithmRecord> {
        self.orchestrator.ledger().snapshot()
    }

    pub fn strategy_status(&self) -> Vec<StrategyStatus> {
        let mut status: Vec<StrategyStatus> = self
            .orchestrator
            .strategy_ids()
            .into_iter()
            .map(|id| StrategyStatus {
                strategy_id: id,
                registered: true,
                excluded_reason: None,
            })
            .collect();
        status.extend(self.orchestrator.excluded().iter().map(|(id, reason)| StrategyStatus {
            strategy_id: id.clone(),
            registered: false,
            excluded_reason: Some(reason.clone()),
        }));
        status
    }

    pub fn clear_caches(&self) {
        self.orchestrator.clear_caches();
        info!("策略缓存已清空");
    }
}

/// 解析 YYYY-MM-DD 日期参数
pub fn parse_date(field: &str, raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::InvalidInput(format!("{} 日期格式错误，期望 YYYY-MM-DD，实际 {}", field, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("start_date", " 2026-03-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
        assert!(matches!(
            parse_date("start_date", "01/03/2026"),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
