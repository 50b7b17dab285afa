// ==========================================
// 服务排程编排系统 - 策略契约
// ==========================================
// 职责: 五种排程策略共同实现的 trait 与策略配置
// 约定:
// - 每个策略只选一个合作方，输出非空访问列表
// - 能完成但置信度低时返回 feasible=false，而不是报错
// - 专用逻辑内部出错时退化为综合评分选择
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::result::StrategyResult;
use crate::domain::types::StrategyKind;
use crate::engine::calendar;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::{self, CompositeWeights};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 低于该置信度的结果标记为不可行
pub const MIN_FEASIBLE_CONFIDENCE: f64 = 0.2;

// ==========================================
// StrategyConfig - 单个策略的配置
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            version: default_version(),
            parameters: serde_json::json!({}),
        }
    }
}

impl StrategyConfig {
    pub fn with_parameters(parameters: serde_json::Value) -> Self {
        Self {
            parameters,
            ..Default::default()
        }
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key).filter(|v| !v.is_null())
    }

    pub fn param_f64(&self, key: &str) -> SchedulingResult<Option<f64>> {
        match self.param(key) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| {
                SchedulingError::Configuration(format!("参数 {} 必须是数字: {}", key, v))
            }),
        }
    }

    pub fn param_u64(&self, key: &str) -> SchedulingResult<Option<u64>> {
        match self.param(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                SchedulingError::Configuration(format!("参数 {} 必须是非负整数: {}", key, v))
            }),
        }
    }

    pub fn param_bool(&self, key: &str) -> SchedulingResult<Option<bool>> {
        match self.param(key) {
            None => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| {
                SchedulingError::Configuration(format!("参数 {} 必须是布尔值: {}", key, v))
            }),
        }
    }

    pub fn param_str(&self, key: &str) -> SchedulingResult<Option<String>> {
        match self.param(key) {
            None => Ok(None),
            Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
                SchedulingError::Configuration(format!("参数 {} 必须是字符串: {}", key, v))
            }),
        }
    }

    /// 比例类参数（必须落在 [0,1]）
    pub fn param_ratio(&self, key: &str) -> SchedulingResult<Option<f64>> {
        match self.param_f64(key)? {
            Some(v) if !(0.0..=1.0).contains(&v) => Err(SchedulingError::Configuration(format!(
                "参数 {} 超出 [0,1]: {}",
                key, v
            ))),
            other => Ok(other),
        }
    }
}

// ==========================================
// SchedulingStrategy - 策略契约
// ==========================================
#[async_trait]
pub trait SchedulingStrategy: Send + Sync {
    /// 策略标识（算法档案名称）
    fn id(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// 当前生效的可调参数
    fn parameters(&self) -> serde_json::Value;

    /// 初始化；参数或凭证缺失时返回 Configuration 错误
    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()>;

    /// 生成排程；没有任何可行合作方时返回 Scheduling 错误
    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult>;

    /// 清空实例内缓存
    fn clear_cache(&self) {}
}

// ==========================================
// 综合评分退化路径
// ==========================================

/// 按综合评分直接选择合作方并生成默认访问列表
///
/// 各策略专用逻辑失败时使用，编排层兜底也复用
pub fn composite_selection(
    strategy_id: &str,
    kind: StrategyKind,
    ctx: &SchedulingContext,
    weights: &CompositeWeights,
    reason: &str,
) -> SchedulingResult<StrategyResult> {
    let ranked = scoring::rank_by_composite(ctx, weights);
    let (partner, composite) = ranked
        .into_iter()
        .find(|(_, c)| c.score > 0.0)
        .ok_or_else(|| SchedulingError::Scheduling("没有综合评分大于 0 的合作方".to_string()))?;

    let visits = calendar::default_visits(ctx);
    if visits.is_empty() {
        return Err(SchedulingError::Scheduling("排程期内没有可排日期".to_string()));
    }

    let confidence = composite.score * 0.6;
    Ok(StrategyResult::new(
        strategy_id,
        kind,
        partner.id.clone(),
        partner.name.clone(),
        composite.score,
        confidence >= MIN_FEASIBLE_CONFIDENCE,
        confidence,
        visits,
        serde_json::json!({
            "mode": "composite_fallback",
            "reason": reason,
            "breakdown": composite.breakdown,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_helpers() {
        let cfg = StrategyConfig::with_parameters(serde_json::json!({
            "population_size": 20,
            "mutation_rate": 0.2,
            "bad_ratio": 1.5,
            "strict_mode": true,
            "model": "gpt",
            "nothing": null
        }));
        assert_eq!(cfg.param_u64("population_size").unwrap(), Some(20));
        assert_eq!(cfg.param_ratio("mutation_rate").unwrap(), Some(0.2));
        assert!(cfg.param_ratio("bad_ratio").is_err());
        assert_eq!(cfg.param_bool("strict_mode").unwrap(), Some(true));
        assert_eq!(cfg.param_str("model").unwrap().as_deref(), Some("gpt"));
        assert_eq!(cfg.param_f64("nothing").unwrap(), None);
        assert!(cfg.param_u64("model").is_err());
    }
}
