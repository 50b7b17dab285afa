// ==========================================
// 服务排程编排系统 - 模式匹配: 特征提取
// ==========================================
// 固定长度特征向量（各维归一化到约 [0,1]）:
//  0 员工人数        1 风险等级        2 服务类型编码
//  3 合同金额        4 合同期（月）    5 月需求工时
//  6 访问频率编码    7 月份            8 季节
//  9 候选池规模     10 候选池平均费率 11 候选池平均距离
// 12 历史样本数     13 历史平均评分
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::engine::scoring;
use chrono::{Datelike, NaiveDate};

pub const FEATURE_COUNT: usize = 14;

pub type FeatureVector = [f64; FEATURE_COUNT];

const SERVICE_TYPES: &[&str] = &[
    "medical_surveillance",
    "safety",
    "hygiene",
    "ergonomics",
    "training",
];

fn service_type_code(service_type: &str) -> f64 {
    let key = service_type.trim().to_lowercase();
    SERVICE_TYPES
        .iter()
        .position(|s| *s == key)
        .map(|i| (i + 1) as f64 / (SERVICE_TYPES.len() + 1) as f64)
        .unwrap_or(1.0)
}

/// 季节: 0 冬 / 1 春 / 2 夏 / 3 秋
pub fn season_of(date: NaiveDate) -> u32 {
    match date.month() {
        12 | 1 | 2 => 0,
        3..=5 => 1,
        6..=8 => 2,
        _ => 3,
    }
}

fn ratio(value: f64, scale: f64) -> f64 {
    if scale <= 0.0 || !value.is_finite() {
        0.0
    } else {
        (value / scale).clamp(0.0, 1.0)
    }
}

/// 以 anchor 日期（排程开始或历史开始）提取特征
pub fn extract_at(ctx: &SchedulingContext, anchor: NaiveDate, monthly_hours: f64) -> FeatureVector {
    let pool = ctx.partners.len();
    let (avg_rate, avg_distance) = if pool == 0 {
        (0.0, 0.0)
    } else {
        let rate: f64 = ctx.partners.iter().map(|p| p.hourly_rate).sum();
        let distance: f64 = ctx
            .partners
            .iter()
            .map(|p| scoring::estimate_distance(&p.city, &ctx.installation.address))
            .sum();
        (rate / pool as f64, distance / pool as f64)
    };
    let history_avg = if ctx.history.is_empty() {
        0.0
    } else {
        ctx.history.iter().map(|h| h.optimization_score).sum::<f64>() / ctx.history.len() as f64
    };

    [
        ratio(ctx.installation.employee_count as f64, 1000.0),
        ctx.installation.risk_category.tier() as f64 / 3.0,
        service_type_code(&ctx.service_type),
        ratio(ctx.contract.contract_value, 100_000.0),
        ratio(ctx.contract.duration_months() as f64, 24.0),
        ratio(monthly_hours, 100.0),
        ctx.requirement.required_visit_frequency.code(),
        anchor.month() as f64 / 12.0,
        season_of(anchor) as f64 / 3.0,
        ratio(pool as f64, 50.0),
        ratio(avg_rate, 100.0),
        ratio(avg_distance, 100.0),
        ratio(ctx.history.len() as f64, 50.0),
        history_avg.clamp(0.0, 1.0),
    ]
}

/// 当前请求的特征
pub fn extract(ctx: &SchedulingContext) -> FeatureVector {
    extract_at(ctx, ctx.start_date, ctx.required_hours_per_month())
}

/// 相似度 = 1 - 平均绝对差
pub fn similarity(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let diff: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
    (1.0 - diff / FEATURE_COUNT as f64).clamp(0.0, 1.0)
}
