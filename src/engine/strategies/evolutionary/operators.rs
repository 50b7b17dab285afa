// ==========================================
// 服务排程编排系统 - 遗传进化: 遗传算子
// ==========================================
// 选择: 锦标赛
// 交叉: 四个基因字段上的单点交叉
// 变异: 合作方替换 5% / 时长 ±1h 20% / 频率 ±1 20% /
//       单次访问时刻平移 30% / 访问列表重生成 10%
// ==========================================

use super::individual::{FitnessModel, ScheduleIndividual};
use chrono::Duration;
use rand::Rng;

pub const PARTNER_SWAP_RATE: f64 = 0.05;
pub const DURATION_SHIFT_RATE: f64 = 0.2;
pub const FREQUENCY_SHIFT_RATE: f64 = 0.2;
pub const VISIT_TIME_SHIFT_RATE: f64 = 0.3;
pub const REGENERATION_RATE: f64 = 0.1;

/// 锦标赛选择，返回胜者下标（同分取先抽到者）
pub fn tournament_select<R: Rng>(population: &[ScheduleIndividual], size: usize, rng: &mut R) -> usize {
    let mut best = rng.random_range(0..population.len());
    for _ in 1..size.max(1) {
        let idx = rng.random_range(0..population.len());
        if population[idx].fitness > population[best].fitness {
            best = idx;
        }
    }
    best
}

/// 单点交叉
///
/// 基因顺序: 合作方 | 时长 | 频率 | 访问列表；
/// 切点之前取自一方父代，之后取自另一方
pub fn crossover<R: Rng>(
    p1: &ScheduleIndividual,
    p2: &ScheduleIndividual,
    rng: &mut R,
) -> (ScheduleIndividual, ScheduleIndividual) {
    let point = rng.random_range(1..4);
    let pick = |first: &ScheduleIndividual, second: &ScheduleIndividual| {
        let mut child = ScheduleIndividual {
            partner_index: first.partner_index,
            duration_hours: if point > 1 { first.duration_hours } else { second.duration_hours },
            visits_per_month: if point > 2 { first.visits_per_month } else { second.visits_per_month },
            visits: second.visits.clone(),
            fitness: 0.0,
        };
        child.sync_durations();
        child
    };
    (pick(p1, p2), pick(p2, p1))
}

/// 变异
pub fn mutate<R: Rng>(ind: &mut ScheduleIndividual, model: &FitnessModel<'_>, rng: &mut R) {
    if model.partner_count() > 1 && rng.random_bool(PARTNER_SWAP_RATE) {
        ind.partner_index = rng.random_range(0..model.partner_count());
    }

    if rng.random_bool(DURATION_SHIFT_RATE) {
        let delta = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        ind.duration_hours = model.clamp_duration(ind.duration_hours + delta);
        ind.visits_per_month = model.clamp_frequency(ind.visits_per_month as i64, ind.duration_hours);
        ind.sync_durations();
    }

    if rng.random_bool(FREQUENCY_SHIFT_RATE) {
        let delta = if rng.random_bool(0.5) { 1 } else { -1 };
        ind.visits_per_month = model.clamp_frequency(ind.visits_per_month as i64 + delta, ind.duration_hours);
        model.regenerate_visits(ind, rng);
    }

    for visit in ind.visits.iter_mut() {
        if rng.random_bool(VISIT_TIME_SHIFT_RATE) {
            let quarters = rng.random_range(-4i64..=4);
            visit.shift_to(visit.start_time + Duration::minutes(quarters * 15));
        }
    }

    if rng.random_bool(REGENERATION_RATE) {
        model.regenerate_visits(ind, rng);
    }
}
