// ==========================================
// 服务排程编排系统 - 模式匹配: 样本集与模式
// ==========================================
// 样本: (特征, 合作方, 结果评分)
// 模式: 每个合作方成功样本（结果 > 0.7）的特征质心 + 置信度
// 重训触发: 距上次训练 ≥ 7 天 / 滚动准确率 < 0.7 /
//           新增样本 > 已训练样本的 10%
// 容量: 超过 1000 条时裁剪为最近 800 条（来源去重集合一并裁剪）
// ==========================================

use super::features::{similarity, FeatureVector, FEATURE_COUNT};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};

pub const SUCCESS_THRESHOLD: f64 = 0.7;
pub const MIN_TRAINING_EXAMPLES: usize = 10;
pub const MAX_EXAMPLES: usize = 1000;
pub const PRUNED_EXAMPLES: usize = 800;
pub const RETRAIN_INTERVAL_DAYS: i64 = 7;
pub const MIN_ACCURACY: f64 = 0.7;
pub const NEW_EXAMPLE_RATIO: f64 = 0.1;
/// 准确率滚动窗口
pub const ACCURACY_WINDOW: usize = 50;
/// 计算准确率所需的最少反馈数
pub const MIN_FEEDBACK: usize = 5;
/// 模式命中所需的最低相似度
pub const MATCH_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, Serialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub partner_id: String,
    pub outcome: f64,
    pub recorded_at: NaiveDateTime,
    /// 来源历史排程ID（反馈样本为 None）
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerPattern {
    pub partner_id: String,
    pub centroid: FeatureVector,
    pub confidence: f64,
    pub support: usize,
}

/// 模型状态（由策略实例独占，经 Mutex 访问）
#[derive(Debug, Default)]
pub struct PatternModel {
    examples: Vec<TrainingExample>,
    patterns: BTreeMap<String, PartnerPattern>,
    last_trained: Option<NaiveDateTime>,
    trained_count: usize,
    new_since_training: usize,
    feedback: VecDeque<bool>,
    ingested: HashSet<String>,
}

impl PatternModel {
    pub fn example_count(&self) -> usize {
        self.examples.len()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PartnerPattern> {
        self.patterns.values()
    }

    pub fn pattern_for(&self, partner_id: &str) -> Option<&PartnerPattern> {
        self.patterns.get(partner_id)
    }

    pub fn last_trained(&self) -> Option<NaiveDateTime> {
        self.last_trained
    }

    pub fn is_baseline(&self) -> bool {
        self.examples.len() < MIN_TRAINING_EXAMPLES
    }

    /// 追加样本（超出容量时裁剪，去重集合随之裁剪）
    pub fn add_example(&mut self, example: TrainingExample) {
        self.examples.push(example);
        self.new_since_training += 1;
        if self.examples.len() > MAX_EXAMPLES {
            let drop = self.examples.len() - PRUNED_EXAMPLES;
            for pruned in self.examples.drain(..drop) {
                if let Some(source) = pruned.source_id {
                    self.ingested.remove(&source);
                }
            }
        }
    }

    /// 按来源ID去重后追加；返回是否新增
    pub fn ingest_once(&mut self, source_id: &str, mut example: TrainingExample) -> bool {
        if !self.ingested.insert(source_id.to_string()) {
            return false;
        }
        example.source_id = Some(source_id.to_string());
        self.add_example(example);
        true
    }

    /// 去重集合大小
    pub fn ingested_count(&self) -> usize {
        self.ingested.len()
    }

    pub fn record_feedback(&mut self, correct: bool) {
        self.feedback.push_back(correct);
        while self.feedback.len() > ACCURACY_WINDOW {
            self.feedback.pop_front();
        }
    }

    pub fn feedback_count(&self) -> usize {
        self.feedback.len()
    }

    /// 滚动准确率（反馈不足时为 None）
    pub fn rolling_accuracy(&self) -> Option<f64> {
        if self.feedback.len() < MIN_FEEDBACK {
            return None;
        }
        let correct = self.feedback.iter().filter(|c| **c).count();
        Some(correct as f64 / self.feedback.len() as f64)
    }

    pub fn needs_retraining(&self, now: NaiveDateTime) -> bool {
        if self.is_baseline() {
            return false;
        }
        let last = match self.last_trained {
            None => return true,
            Some(last) => last,
        };
        if now - last >= Duration::days(RETRAIN_INTERVAL_DAYS) {
            return true;
        }
        if matches!(self.rolling_accuracy(), Some(acc) if acc < MIN_ACCURACY) {
            return true;
        }
        self.new_since_training as f64 > self.trained_count as f64 * NEW_EXAMPLE_RATIO
    }

    /// 重新计算全部合作方模式
    pub fn train(&mut self, now: NaiveDateTime) -> usize {
        let mut grouped: BTreeMap<&str, Vec<&TrainingExample>> = BTreeMap::new();
        for example in self.examples.iter().filter(|e| e.outcome > SUCCESS_THRESHOLD) {
            grouped.entry(example.partner_id.as_str()).or_default().push(example);
        }

        let mut patterns = BTreeMap::new();
        for (partner_id, group) in grouped {
            let n = group.len() as f64;
            let mut centroid = [0.0; FEATURE_COUNT];
            for example in &group {
                for (c, f) in centroid.iter_mut().zip(example.features.iter()) {
                    *c += f / n;
                }
            }
            let avg_outcome = group.iter().map(|e| e.outcome).sum::<f64>() / n;
            let support_factor = n / (n + 1.0);
            patterns.insert(
                partner_id.to_string(),
                PartnerPattern {
                    partner_id: partner_id.to_string(),
                    centroid,
                    confidence: (avg_outcome * support_factor).clamp(0.0, 1.0),
                    support: group.len(),
                },
            );
        }

        self.patterns = patterns;
        self.last_trained = Some(now);
        self.trained_count = self.examples.len();
        self.new_since_training = 0;
        self.feedback.clear();
        self.patterns.len()
    }

    /// 模式预测: 置信度 × 相似度（未命中返回 None）
    pub fn predict(&self, partner_id: &str, features: &FeatureVector) -> Option<f64> {
        let pattern = self.patterns.get(partner_id)?;
        let sim = similarity(features, &pattern.centroid);
        if sim < MATCH_SIMILARITY {
            return None;
        }
        Some((pattern.confidence * sim).clamp(0.0, 1.0))
    }

    pub fn clear(&mut self) {
        *self = PatternModel::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn example(partner: &str, value: f64, outcome: f64) -> TrainingExample {
        TrainingExample {
            features: [value; FEATURE_COUNT],
            partner_id: partner.to_string(),
            outcome,
            recorded_at: now(),
            source_id: None,
        }
    }

    #[test]
    fn test_train_builds_centroids_from_successes() {
        let mut model = PatternModel::default();
        for _ in 0..6 {
            model.add_example(example("A", 0.4, 0.9));
        }
        for _ in 0..6 {
            model.add_example(example("B", 0.6, 0.5));
        }
        assert!(model.needs_retraining(now()));
        assert_eq!(model.train(now()), 1);
        let pattern = model.pattern_for("A").unwrap();
        assert!((pattern.centroid[0] - 0.4).abs() < 1e-9);
        assert!(model.pattern_for("B").is_none());
        assert!(!model.needs_retraining(now()));
        assert!(model.predict("A", &[0.4; FEATURE_COUNT]).unwrap() > 0.7);
        assert!(model.predict("A", &[1.0; FEATURE_COUNT]).is_none());
    }

    #[test]
    fn test_retrain_triggers() {
        let mut model = PatternModel::default();
        for _ in 0..20 {
            model.add_example(example("A", 0.4, 0.9));
        }
        model.train(now());
        assert!(model.needs_retraining(now() + Duration::days(7)));

        // 新增样本超过 10%
        for _ in 0..3 {
            model.add_example(example("A", 0.4, 0.9));
        }
        assert!(model.needs_retraining(now()));
        model.train(now());

        // 滚动准确率过低
        for _ in 0..5 {
            model.record_feedback(false);
        }
        assert!(model.needs_retraining(now()));
    }

    #[test]
    fn test_prune_to_recent_examples() {
        let mut model = PatternModel::default();
        for i in 0..=MAX_EXAMPLES {
            model.add_example(example(&format!("P{}", i), 0.5, 0.8));
        }
        assert_eq!(model.example_count(), PRUNED_EXAMPLES);
        assert!(model.ingest_once("H1", example("A", 0.5, 0.8)));
        assert!(!model.ingest_once("H1", example("A", 0.5, 0.8)));
    }

    #[test]
    fn test_pruning_releases_ingested_source_ids() {
        let mut model = PatternModel::default();
        for i in 0..=MAX_EXAMPLES {
            assert!(model.ingest_once(&format!("H{}", i), example("A", 0.5, 0.8)));
        }
        // 去重集合与样本集同步裁剪
        assert_eq!(model.example_count(), PRUNED_EXAMPLES);
        assert_eq!(model.ingested_count(), PRUNED_EXAMPLES);
        // 被裁剪的最早来源可再次吸收，仍保留的来源不可
        assert!(model.ingest_once("H0", example("A", 0.5, 0.8)));
        assert!(!model.ingest_once(&format!("H{}", MAX_EXAMPLES), example("A", 0.5, 0.8)));
    }
}
