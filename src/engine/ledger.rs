// ==========================================
// 服务排程编排系统 - 绩效台账
// ==========================================
// 职责: 记录每次策略运行的耗时/评分/可行性，计算滚动可靠度
// 并发: 所有更新在同一把锁内完成（不丢增量）
// 持久化: 每次编排的增量作为一个批次写入 MetricsStore
// ==========================================

use crate::domain::algorithm::{AlgorithmRecord, AlgorithmRunDelta};
use crate::domain::result::StrategyRun;
use crate::domain::types::{RunStatus, StrategyKind};
use crate::repository::collaborators::MetricsStore;
use crate::repository::error::RepositoryResult;
use chrono::Local;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 无记录时的可靠度
pub const DEFAULT_RELIABILITY: f64 = 0.5;

pub struct PerformanceLedger {
    records: Mutex<BTreeMap<String, AlgorithmRecord>>,
    store: Option<Arc<dyn MetricsStore>>,
}

impl PerformanceLedger {
    /// 纯内存台账
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            store: None,
        }
    }

    /// 带持久化的台账
    pub fn with_store(store: Arc<dyn MetricsStore>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            store: Some(store),
        }
    }

    /// 从存储恢复累计档案，返回恢复条数
    pub async fn restore(&self) -> RepositoryResult<usize> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(0),
        };
        let loaded = store.load_records().await?;
        let count = loaded.len();
        if let Ok(mut records) = self.records.lock() {
            for record in loaded {
                records.insert(record.name.clone(), record);
            }
        }
        debug!(count, "算法档案已从存储恢复");
        Ok(count)
    }

    /// 登记策略身份（已存在则只更新版本与参数）
    pub fn register(&self, name: &str, kind: StrategyKind, version: &str, parameters: serde_json::Value) {
        if let Ok(mut records) = self.records.lock() {
            records
                .entry(name.to_string())
                .and_modify(|r| {
                    r.kind = kind;
                    r.version = version.to_string();
                    r.parameters = parameters.clone();
                })
                .or_insert_with(|| AlgorithmRecord::new(name, kind, version, parameters));
        }
    }

    /// 滚动可靠度（未登记时为 0.5）
    pub fn reliability(&self, name: &str) -> f64 {
        self.records
            .lock()
            .ok()
            .and_then(|r| r.get(name).map(|rec| rec.reliability()))
            .unwrap_or(DEFAULT_RELIABILITY)
    }

    pub fn record(&self, name: &str) -> Option<AlgorithmRecord> {
        self.records.lock().ok()?.get(name).cloned()
    }

    /// 全部档案（按名称排序）
    pub fn snapshot(&self) -> Vec<AlgorithmRecord> {
        self.records
            .lock()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 把一次编排的全部运行记入台账并批量落盘
    ///
    /// 落盘失败只记日志，不影响本次编排结果
    pub async fn record_runs(&self, run_id: &str, runs: &[StrategyRun]) -> Vec<AlgorithmRunDelta> {
        let now = Local::now().naive_local();
        let deltas = {
            let mut records = match self.records.lock() {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "绩效台账锁已中毒，跳过记账");
                    return Vec::new();
                }
            };
            runs.iter()
                .map(|run| {
                    let record = records
                        .entry(run.strategy_id.clone())
                        .or_insert_with(|| AlgorithmRecord::new(&run.strategy_id, run.kind, "1.0.0", serde_json::json!({})));
                    let delta = AlgorithmRunDelta {
                        run_id: run_id.to_string(),
                        name: run.strategy_id.clone(),
                        kind: run.kind,
                        version: record.version.clone(),
                        success: run.status == RunStatus::Succeeded,
                        score: run.score(),
                        execution_time_ms: run.execution_time_ms,
                        recorded_at: now,
                    };
                    record.apply(&delta);
                    delta
                })
                .collect::<Vec<_>>()
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.append_run_deltas(&deltas).await {
                warn!(run_id, error = %e, "算法指标落盘失败");
            }
        }
        deltas
    }
}

impl Default for PerformanceLedger {
    fn default() -> Self {
        Self::new()
    }
}
