// ==========================================
// 服务排程编排系统 - 算法档案
// ==========================================
// 职责: 每个策略的身份（名称/类型/版本/参数）与滚动统计
// 生命周期: 进程级长期存在，跨运行持久化
// ==========================================

use crate::domain::types::StrategyKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// AlgorithmRecord - 算法档案
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmRecord {
    pub name: String,                   // 策略标识
    pub kind: StrategyKind,             // 算法类型
    pub version: String,                // 版本
    pub parameters: serde_json::Value,  // 可调参数
    pub total_runs: u64,                // 总运行次数
    pub successful_runs: u64,           // 成功（可行）次数
    pub avg_execution_time_ms: f64,     // 平均耗时
    pub avg_score: f64,                 // 平均评分
    #[serde(default)]
    pub last_run_at: Option<NaiveDateTime>,
}

impl AlgorithmRecord {
    pub fn new(name: impl Into<String>, kind: StrategyKind, version: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind,
            version: version.into(),
            parameters,
            total_runs: 0,
            successful_runs: 0,
            avg_execution_time_ms: 0.0,
            avg_score: 0.0,
            last_run_at: None,
        }
    }

    /// 可靠度（拉普拉斯平滑：无记录时为 0.5）
    pub fn reliability(&self) -> f64 {
        (self.successful_runs as f64 + 1.0) / (self.total_runs as f64 + 2.0)
    }

    /// 应用一次运行增量（滚动平均）
    pub fn apply(&mut self, delta: &AlgorithmRunDelta) {
        let n = self.total_runs as f64;
        self.total_runs += 1;
        if delta.success {
            self.successful_runs += 1;
        }
        let m = self.total_runs as f64;
        self.avg_execution_time_ms = (self.avg_execution_time_ms * n + delta.execution_time_ms as f64) / m;
        self.avg_score = (self.avg_score * n + delta.score) / m;
        self.last_run_at = Some(delta.recorded_at);
        self.version = delta.version.clone();
    }

    /// 由首个运行增量建档
    pub fn from_delta(delta: &AlgorithmRunDelta) -> Self {
        let mut record = Self::new(delta.name.clone(), delta.kind, delta.version.clone(), serde_json::json!({}));
        record.apply(delta);
        record
    }
}

// ==========================================
// AlgorithmRunDelta - 单次运行增量（批量写入指标存储）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmRunDelta {
    pub run_id: String,           // 编排运行ID
    pub name: String,             // 策略标识
    pub kind: StrategyKind,
    pub version: String,
    pub success: bool,            // 是否可行
    pub score: f64,
    pub execution_time_ms: u64,
    pub recorded_at: NaiveDateTime,
}
