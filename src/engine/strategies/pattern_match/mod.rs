// ==========================================
// 服务排程编排系统 - 模式匹配策略（"machine_learning"）
// ==========================================
// 说明: 名称沿用“机器学习”，实际为特征质心 + 相似度的规则近似
// 流程:
// 1. 把上下文中的历史排程作为样本吸收（按排程ID去重）
// 2. 满足重训条件时重新计算合作方模式
// 3. 样本不足 10 条 → 基线模式（综合评分）
// 4. 否则逐个候选打分: 命中模式取 置信度 × 相似度，未命中取综合评分，取最高者
// ==========================================

pub mod features;
pub mod model;

use crate::domain::context::{months_touched, SchedulingContext};
use crate::domain::result::StrategyResult;
use crate::domain::types::StrategyKind;
use crate::engine::calendar::{self, VisitPlan};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::{self, CompositeWeights};
use crate::engine::strategies::weights_from_config;
use crate::engine::strategy::{composite_selection, SchedulingStrategy, StrategyConfig, MIN_FEASIBLE_CONFIDENCE};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use model::{PatternModel, TrainingExample};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PatternParameters {
    pub weights: CompositeWeights,
    /// 是否按历史平均时长调整单次访问时长
    pub use_history_duration: bool,
}

impl Default for PatternParameters {
    fn default() -> Self {
        Self {
            weights: CompositeWeights::default(),
            use_history_duration: true,
        }
    }
}

/// 单个合作方的预测
#[derive(Debug, Clone, Serialize)]
struct Prediction {
    partner_id: String,
    score: f64,
    matched: bool,
}

pub struct PatternMatchStrategy {
    id: String,
    version: String,
    params: PatternParameters,
    model: Mutex<PatternModel>,
}

impl PatternMatchStrategy {
    pub fn new() -> Self {
        Self {
            id: StrategyKind::MachineLearning.as_str().to_string(),
            version: "1.0.0".to_string(),
            params: PatternParameters::default(),
            model: Mutex::new(PatternModel::default()),
        }
    }

    fn lock(&self) -> SchedulingResult<MutexGuard<'_, PatternModel>> {
        self.model
            .lock()
            .map_err(|_| SchedulingError::Internal("模式模型锁已中毒".to_string()))
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// 当前样本数
    pub fn example_count(&self) -> usize {
        self.lock().map(|m| m.example_count()).unwrap_or(0)
    }

    /// 自上次训练以来的预测反馈数
    pub fn feedback_count(&self) -> usize {
        self.lock().map(|m| m.feedback_count()).unwrap_or(0)
    }

    /// 强制重训，返回模式数量
    pub fn retrain(&self) -> SchedulingResult<usize> {
        let mut model = self.lock()?;
        let count = model.train(Self::now());
        info!(patterns = count, examples = model.example_count(), "模式模型已重训");
        Ok(count)
    }

    /// 记录一次实际结果作为训练样本
    pub fn record_outcome(&self, ctx: &SchedulingContext, partner_id: &str, outcome: f64) -> SchedulingResult<()> {
        let example = TrainingExample {
            features: features::extract(ctx),
            partner_id: partner_id.to_string(),
            outcome: outcome.clamp(0.0, 1.0),
            recorded_at: Self::now(),
            source_id: None,
        };
        self.lock()?.add_example(example);
        Ok(())
    }

    /// 记录预测是否命中（实际采用的合作方与预测一致）
    pub fn record_prediction_feedback(&self, predicted_partner: &str, actual_partner: &str) -> SchedulingResult<()> {
        self.lock()?.record_feedback(predicted_partner == actual_partner);
        Ok(())
    }

    /// 吸收上下文中的历史排程
    fn ingest_history(model: &mut PatternModel, ctx: &SchedulingContext) -> usize {
        let mut added = 0;
        for history in &ctx.history {
            let months = months_touched(history.start_date, history.end_date) as f64;
            let monthly_hours = history.total_hours / months;
            let example = TrainingExample {
                features: features::extract_at(ctx, history.start_date, monthly_hours),
                partner_id: history.partner_id.clone(),
                outcome: history.optimization_score.clamp(0.0, 1.0),
                recorded_at: history
                    .completed_at
                    .unwrap_or(history.end_date)
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default(),
                source_id: None,
            };
            if model.ingest_once(&history.schedule_id, example) {
                added += 1;
            }
        }
        added
    }

    /// 每个候选都参与排序: 有命中模式取模式预测，否则取综合评分
    fn predict_all(&self, model: &PatternModel, ctx: &SchedulingContext) -> Vec<Prediction> {
        let current = features::extract(ctx);
        let mut predictions: Vec<Prediction> = ctx
            .partners
            .iter()
            .map(|partner| match model.predict(&partner.id, &current) {
                Some(score) => Prediction {
                    partner_id: partner.id.clone(),
                    score,
                    matched: true,
                },
                None => Prediction {
                    partner_id: partner.id.clone(),
                    score: scoring::composite_score(partner, ctx, &self.params.weights).score,
                    matched: false,
                },
            })
            .collect();
        predictions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.partner_id.cmp(&b.partner_id))
        });
        predictions
    }

    /// 访问参数: 合作方有历史时按历史平均时长调整
    fn visit_plan(&self, ctx: &SchedulingContext, partner_id: &str) -> VisitPlan {
        let mut plan = calendar::plan_visit_parameters(ctx);
        if !self.params.use_history_duration {
            return plan;
        }
        let durations: Vec<f64> = ctx
            .history
            .iter()
            .filter(|h| h.partner_id == partner_id)
            .filter_map(|h| h.average_visit_hours())
            .collect();
        if durations.is_empty() {
            return plan;
        }
        let bounds = calendar::effective_duration_bounds(ctx);
        let avg = durations.iter().sum::<f64>() / durations.len() as f64;
        let duration = calendar::clamp_duration(calendar::round_up_quarter(avg), bounds);
        let required = ctx.required_hours_per_month();
        let min_visits = ctx.requirement.required_visit_frequency.min_visits_per_month();
        let visits = ((required / duration).ceil() as u32).max(min_visits).max(1);
        plan.visits_per_month = visits;
        plan.duration_hours = calendar::clamp_duration(required / visits as f64, bounds);
        calendar::clamp_plan(ctx, plan)
    }

    fn run(&self, ctx: &SchedulingContext) -> SchedulingResult<StrategyResult> {
        let (baseline, predictions, examples) = {
            let mut model = self.lock()?;
            let added = Self::ingest_history(&mut model, ctx);
            if added > 0 {
                debug!(added, total = model.example_count(), "吸收历史排程样本");
            }
            let now = Self::now();
            if model.needs_retraining(now) {
                let patterns = model.train(now);
                info!(patterns, examples = model.example_count(), "模式模型自动重训");
            }
            let baseline = model.is_baseline();
            let predictions = if baseline {
                Vec::new()
            } else {
                self.predict_all(&model, ctx)
            };
            (baseline, predictions, model.example_count())
        };

        if baseline {
            debug!(examples, "样本不足，使用基线模式");
            let mut result = composite_selection(&self.id, StrategyKind::MachineLearning, ctx, &self.params.weights, "样本不足")?;
            result.metadata["mode"] = serde_json::json!("baseline");
            result.metadata["examples"] = serde_json::json!(examples);
            return Ok(result);
        }

        let best = predictions
            .iter()
            .find(|p| p.score > 0.0)
            .cloned()
            .ok_or_else(|| SchedulingError::Scheduling("没有预测评分大于 0 的合作方".to_string()))?;
        let partner = ctx
            .find_partner(&best.partner_id)
            .ok_or_else(|| SchedulingError::Internal(format!("合作方不存在: {}", best.partner_id)))?;

        let plan = self.visit_plan(ctx, &partner.id);
        let visits = calendar::materialize_visits(ctx, plan, ctx.installation.working_hours.start);
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling("排程期内没有可排日期".to_string()));
        }

        let confidence = if best.matched { best.score } else { best.score * 0.6 };
        info!(
            partner = %partner.id,
            matched = best.matched,
            score = best.score,
            "模式匹配生成排程"
        );

        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::MachineLearning,
            partner.id.clone(),
            partner.name.clone(),
            best.score,
            confidence >= MIN_FEASIBLE_CONFIDENCE,
            confidence,
            visits,
            serde_json::json!({
                "mode": if best.matched { "pattern" } else { "composite" },
                "examples": examples,
                "visit_plan": plan,
                "predictions": predictions,
            }),
        ))
    }
}

impl Default for PatternMatchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingStrategy for PatternMatchStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MachineLearning
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or_default()
    }

    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()> {
        let mut params = PatternParameters::default();
        if let Some(v) = config.param_bool("use_history_duration")? {
            params.use_history_duration = v;
        }
        if let Some(w) = weights_from_config(config)? {
            params.weights = w;
        }
        self.params = params;
        self.version = config.version.clone();
        Ok(())
    }

    #[instrument(skip_all, fields(run_id = %context.run_id))]
    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        let ctx = context.as_ref();
        match self.run(ctx) {
            Err(SchedulingError::Internal(msg)) => {
                warn!(error = %msg, "模式匹配内部错误，退化为综合评分");
                composite_selection(&self.id, StrategyKind::MachineLearning, ctx, &self.params.weights, &msg)
            }
            other => other,
        }
    }

    fn clear_cache(&self) {
        if let Ok(mut model) = self.model.lock() {
            model.clear();
        }
    }
}
