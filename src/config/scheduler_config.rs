// ==========================================
// 服务排程编排系统 - 编排配置
// ==========================================
// 来源（后者覆盖前者）:
// 1. 内置默认值
// 2. JSON 配置文件
// 3. 环境变量 SERVICE_VISIT_APS_*
// ==========================================

use crate::domain::types::StrategyKind;
use crate::engine::orchestrator::{OrchestratorSettings, RankingWeights};
use crate::engine::scoring::CompositeWeights;
use crate::engine::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_STRATEGY_TIMEOUT_SECS: &str = "SERVICE_VISIT_APS_STRATEGY_TIMEOUT_SECS";
pub const ENV_DB_PATH: &str = "SERVICE_VISIT_APS_DB_PATH";
pub const ENV_ADVISOR_API_KEY: &str = "SERVICE_VISIT_APS_ADVISOR_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置值无效 ({key}): {message}")]
    InvalidValue { key: String, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// OrchestratorConfig - 编排器配置
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_timeout_secs")]
    pub strategy_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub ranking: RankingWeights,
    #[serde(default)]
    pub fallback_weights: CompositeWeights,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_history_limit() -> usize {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_secs: default_timeout_secs(),
            history_limit: default_history_limit(),
            ranking: RankingWeights::default(),
            fallback_weights: CompositeWeights::default(),
        }
    }
}

// ==========================================
// SchedulerConfig - 顶层配置
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 数据库路径（None 时使用用户数据目录）
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// 按策略标识（如 "genetic_algorithm"）的配置
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyConfig>,
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: SchedulerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// 文件（可选）+ 环境变量
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 应用覆盖项（lookup 通常为环境变量读取）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_STRATEGY_TIMEOUT_SECS) {
            self.orchestrator.strategy_timeout_secs =
                raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: ENV_STRATEGY_TIMEOUT_SECS.to_string(),
                    message: e.to_string(),
                })?;
        }
        if let Some(raw) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            self.db_path = Some(raw.trim().to_string());
        }
        if let Some(key) = lookup(ENV_ADVISOR_API_KEY).filter(|k| !k.trim().is_empty()) {
            let advisor = self
                .strategies
                .entry(StrategyKind::LlmBased.as_str().to_string())
                .or_default();
            if !advisor.parameters.is_object() {
                advisor.parameters = serde_json::json!({});
            }
            advisor.parameters["api_key"] = serde_json::Value::String(key.trim().to_string());
        }
        self.validate()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.orchestrator.strategy_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "orchestrator.strategy_timeout_secs".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        for id in self.strategies.keys() {
            if matches!(id.parse::<StrategyKind>(), Err(_) | Ok(StrategyKind::Fallback)) {
                return Err(ConfigError::InvalidValue {
                    key: format!("strategies.{}", id),
                    message: "未知策略标识".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 单个策略的配置（未配置时为默认值）
    pub fn strategy(&self, id: &str) -> StrategyConfig {
        self.strategies.get(id).cloned().unwrap_or_default()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            strategy_timeout: Duration::from_secs(self.orchestrator.strategy_timeout_secs),
            history_limit: self.orchestrator.history_limit,
            ranking: self.orchestrator.ranking,
            fallback_weights: self.orchestrator.fallback_weights,
        }
    }

    pub fn resolved_db_path(&self) -> String {
        self.db_path.clone().unwrap_or_else(get_default_db_path)
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 开发环境: 用户数据目录/service-visit-aps-dev/service_visit_aps.db
/// - 生产环境: 用户数据目录/service-visit-aps/service_visit_aps.db
/// - 拿不到用户数据目录时: ./service_visit_aps.db
pub fn get_default_db_path() -> String {
    let mut path = PathBuf::from("./service_visit_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("service-visit-aps-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("service-visit-aps");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("service_visit_aps.db");
    }

    path.to_string_lossy().to_string()
}
