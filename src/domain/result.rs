// ==========================================
// 服务排程编排系统 - 策略结果
// ==========================================
// 职责: 单个策略的输出（StrategyResult）与编排层封装（StrategyRun）
// 生命周期: 编排过程内创建，之后只读；仅聚合字段进入绩效台账
// ==========================================

use crate::domain::schedule::{total_hours, Visit};
use crate::domain::types::{RunStatus, StrategyKind};
use serde::{Deserialize, Serialize};

// ==========================================
// StrategyResult - 策略输出
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy_id: String,          // 策略标识
    pub kind: StrategyKind,           // 算法类型
    pub partner_id: String,           // 选中合作方
    pub partner_name: String,         // 合作方名称
    pub score: f64,                   // 原始优化评分 [0,1]
    pub feasible: bool,               // 是否可行
    pub confidence: f64,              // 置信度 [0,1]
    pub visits: Vec<Visit>,           // 访问列表（按时间排序）
    pub total_hours: f64,             // 总工时 = Σ visit.duration
    pub execution_time_ms: u64,       // 执行耗时
    pub metadata: serde_json::Value,  // 算法诊断信息
}

impl StrategyResult {
    /// 构造结果，total_hours 由访问列表推导，评分/置信度截断到 [0,1]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_id: impl Into<String>,
        kind: StrategyKind,
        partner_id: impl Into<String>,
        partner_name: impl Into<String>,
        score: f64,
        feasible: bool,
        confidence: f64,
        visits: Vec<Visit>,
        metadata: serde_json::Value,
    ) -> Self {
        let total = total_hours(&visits);
        Self {
            strategy_id: strategy_id.into(),
            kind,
            partner_id: partner_id.into(),
            partner_name: partner_name.into(),
            score: clamp_unit(score),
            feasible,
            confidence: clamp_unit(confidence),
            visits,
            total_hours: total,
            execution_time_ms: 0,
            metadata,
        }
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}

/// 截断到 [0,1]，NaN 视为 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ==========================================
// StrategyRun - 编排层的单次策略运行记录
// ==========================================
// 失败/超时的运行不携带 result，只记录错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRun {
    pub strategy_id: String,
    pub kind: StrategyKind,
    pub status: RunStatus,
    pub result: Option<StrategyResult>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl StrategyRun {
    pub fn completed(result: StrategyResult) -> Self {
        let status = if result.feasible {
            RunStatus::Succeeded
        } else {
            RunStatus::Infeasible
        };
        Self {
            strategy_id: result.strategy_id.clone(),
            kind: result.kind,
            status,
            execution_time_ms: result.execution_time_ms,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(strategy_id: impl Into<String>, kind: StrategyKind, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            kind,
            status: RunStatus::Failed,
            result: None,
            error: Some(error.into()),
            execution_time_ms: elapsed_ms,
        }
    }

    pub fn timed_out(strategy_id: impl Into<String>, kind: StrategyKind, elapsed_ms: u64) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            kind,
            status: RunStatus::TimedOut,
            result: None,
            error: Some(format!("策略执行超时（{}ms）", elapsed_ms)),
            execution_time_ms: elapsed_ms,
        }
    }

    /// 可参与排名的结果（完成且可行）
    pub fn feasible_result(&self) -> Option<&StrategyResult> {
        self.result.as_ref().filter(|r| r.feasible)
    }

    pub fn score(&self) -> f64 {
        self.result.as_ref().map(|r| r.score).unwrap_or(0.0)
    }
}

// ==========================================
// StrategyComparison - 绩效对比（返回给调用方）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub strategy_id: String,
    pub kind: StrategyKind,
    pub status: RunStatus,
    pub partner_id: Option<String>,
    pub score: f64,
    pub confidence: f64,
    pub reliability: f64,
    pub ranking_score: f64,
    pub execution_time_ms: u64,
    pub selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::VisitType;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_result_total_hours_and_clamp() {
        let d = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let visits = vec![
            Visit::new(d, start, 2.0, VisitType::Initial),
            Visit::new(d.succ_opt().unwrap(), start, 3.5, VisitType::Final),
        ];
        let result = StrategyResult::new(
            "s1",
            StrategyKind::RuleBased,
            "P1",
            "Partner 1",
            1.4,
            true,
            f64::NAN,
            visits,
            serde_json::json!({}),
        );
        assert_eq!(result.total_hours, 5.5);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_run_status_from_feasibility() {
        let result = StrategyResult::new(
            "s1",
            StrategyKind::RuleBased,
            "P1",
            "Partner 1",
            0.4,
            false,
            0.3,
            Vec::new(),
            serde_json::Value::Null,
        );
        let run = StrategyRun::completed(result);
        assert_eq!(run.status, RunStatus::Infeasible);
        assert!(run.feasible_result().is_none());

        let run = StrategyRun::timed_out("s2", StrategyKind::LlmBased, 300);
        assert_eq!(run.status, RunStatus::TimedOut);
        assert!(run.error.unwrap().contains("300"));
    }
}
