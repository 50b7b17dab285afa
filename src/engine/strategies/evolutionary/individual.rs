// ==========================================
// 服务排程编排系统 - 遗传进化: 个体与适应度
// ==========================================
// 个体编码: {合作方, 单次时长, 每月次数, 访问列表}
// 适应度 = 综合评分 × 排程质量系数 × 法规合规系数 × (1 - 违规罚分)
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::schedule::{total_hours, Visit};
use crate::engine::calendar::{self, VisitPlan};
use crate::engine::scoring::{self, CompositeWeights};
use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use rand::Rng;
use std::collections::BTreeMap;

/// 每月访问次数上限
pub const MAX_VISITS_PER_MONTH: u32 = 10;
/// 违规罚分上限
pub const MAX_VIOLATION_PENALTY: f64 = 0.5;
/// 单条违规罚分
pub const VIOLATION_STEP: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct ScheduleIndividual {
    pub partner_index: usize,
    pub duration_hours: f64,
    pub visits_per_month: u32,
    pub visits: Vec<Visit>,
    pub fitness: f64,
}

impl ScheduleIndividual {
    /// 访问时长与基因保持一致
    pub fn sync_durations(&mut self) {
        let duration = self.duration_hours;
        for visit in self.visits.iter_mut() {
            visit.resize(duration);
        }
    }

    pub fn plan(&self) -> VisitPlan {
        VisitPlan {
            visits_per_month: self.visits_per_month,
            duration_hours: self.duration_hours,
        }
    }
}

// ==========================================
// FitnessModel - 适应度模型（每次运行构建一次）
// ==========================================
pub struct FitnessModel<'a> {
    pub ctx: &'a SchedulingContext,
    pub composites: Vec<f64>,
    pub bounds: (f64, f64),
    pub min_visits: u32,
    pub total_required: f64,
}

impl<'a> FitnessModel<'a> {
    pub fn new(ctx: &'a SchedulingContext, weights: &CompositeWeights) -> Self {
        let composites = ctx
            .partners
            .iter()
            .map(|p| scoring::composite_score(p, ctx, weights).score)
            .collect();
        Self {
            ctx,
            composites,
            bounds: calendar::effective_duration_bounds(ctx),
            min_visits: ctx.requirement.required_visit_frequency.min_visits_per_month(),
            total_required: ctx.total_required_hours(),
        }
    }

    pub fn partner_count(&self) -> usize {
        self.composites.len()
    }

    /// 综合评分最高的合作方 + 默认访问参数（基线个体）
    pub fn baseline(&self) -> ScheduleIndividual {
        let partner_index = self
            .composites
            .iter()
            .enumerate()
            .fold(0, |best, (i, s)| if *s > self.composites[best] { i } else { best });
        let plan = calendar::plan_visit_parameters(self.ctx);
        ScheduleIndividual {
            partner_index,
            duration_hours: plan.duration_hours,
            visits_per_month: plan.visits_per_month,
            visits: calendar::materialize_visits(self.ctx, plan, self.ctx.installation.working_hours.start),
            fitness: 0.0,
        }
    }

    /// 随机个体
    pub fn random_individual<R: Rng>(&self, rng: &mut R) -> ScheduleIndividual {
        let partner_index = rng.random_range(0..self.partner_count());
        let duration_hours = self.random_duration(rng);
        let visits_per_month = self.clamp_frequency(
            rng.random_range(self.min_visits..=self.min_visits + 3) as i64,
            duration_hours,
        );
        let mut ind = ScheduleIndividual {
            partner_index,
            duration_hours,
            visits_per_month,
            visits: Vec::new(),
            fitness: 0.0,
        };
        self.regenerate_visits(&mut ind, rng);
        ind
    }

    fn random_duration<R: Rng>(&self, rng: &mut R) -> f64 {
        let (lo, hi) = self.bounds;
        let steps = ((hi - lo) * 4.0).floor().max(0.0) as u32;
        lo + rng.random_range(0..=steps) as f64 / 4.0
    }

    /// 以随机开始时刻重新生成访问列表
    pub fn regenerate_visits<R: Rng>(&self, ind: &mut ScheduleIndividual, rng: &mut R) {
        let window = self.ctx.installation.working_hours;
        let slack = (window.span_hours() - ind.duration_hours).max(0.0);
        let steps = (slack * 4.0).floor() as i64;
        let offset = rng.random_range(0..=steps);
        let start = window.start + Duration::minutes(offset * 15);
        ind.visits = calendar::materialize_visits(self.ctx, ind.plan(), start);
    }

    pub fn clamp_duration(&self, hours: f64) -> f64 {
        calendar::clamp_duration(hours, self.bounds)
    }

    /// 频率截断: 不低于频率要求，且每月次数 × 时长不超过法规上限
    pub fn clamp_frequency(&self, visits: i64, duration_hours: f64) -> u32 {
        let upper = calendar::max_visits_per_month(self.ctx, duration_hours)
            .unwrap_or(MAX_VISITS_PER_MONTH)
            .min(MAX_VISITS_PER_MONTH)
            .max(self.min_visits);
        visits.clamp(self.min_visits as i64, upper as i64) as u32
    }

    // ==========================================
    // 适应度
    // ==========================================

    pub fn evaluate(&self, ind: &ScheduleIndividual) -> f64 {
        if ind.visits.is_empty() {
            return 0.0;
        }
        let composite = self.composites.get(ind.partner_index).copied().unwrap_or(0.0);
        composite * self.quality(ind) * self.compliance(ind) * (1.0 - self.violation_penalty(ind))
    }

    /// 排程质量系数
    ///
    /// - 单日超过 2 次访问: 每天 ×0.8
    /// - 开始时刻一致: ×1.1（差异 ≤ 1h: ×1.05）
    /// - 2–4h 时长占比奖励: ×(1 + 0.1 × 占比)
    pub fn quality(&self, ind: &ScheduleIndividual) -> f64 {
        let mut multiplier = 1.0;

        let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for visit in &ind.visits {
            *per_day.entry(visit.date).or_insert(0) += 1;
        }
        for count in per_day.values() {
            if *count > 2 {
                multiplier *= 0.8;
            }
        }

        let starts: Vec<u32> = ind
            .visits
            .iter()
            .map(|v| minutes_of_day(v.start_time))
            .collect();
        let spread = starts.iter().max().copied().unwrap_or(0) - starts.iter().min().copied().unwrap_or(0);
        if spread == 0 {
            multiplier *= 1.1;
        } else if spread <= 60 {
            multiplier *= 1.05;
        }

        let preferred = ind
            .visits
            .iter()
            .filter(|v| (2.0..=4.0).contains(&v.duration_hours))
            .count() as f64;
        multiplier *= 1.0 + 0.1 * preferred / ind.visits.len() as f64;

        multiplier.clamp(0.1, 1.25)
    }

    /// 法规合规系数（总工时不足时按比例下降）
    pub fn compliance(&self, ind: &ScheduleIndividual) -> f64 {
        if self.total_required <= 0.0 {
            return 1.0;
        }
        (total_hours(&ind.visits) / self.total_required).min(1.0)
    }

    /// 时间窗与周末/节假日违规罚分，累计上限 50%
    pub fn violation_penalty(&self, ind: &ScheduleIndividual) -> f64 {
        let window = self.ctx.installation.working_hours;
        let count = ind
            .visits
            .iter()
            .map(|v| {
                let mut n = 0;
                if !window.contains(v.start_time, v.end_time) {
                    n += 1;
                }
                if !calendar::is_eligible_day(v.date, &self.ctx.constraints) {
                    n += 1;
                }
                n
            })
            .sum::<u32>();
        (count as f64 * VIOLATION_STEP).min(MAX_VIOLATION_PENALTY)
    }
}

fn minutes_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}
