// ==========================================
// 服务排程编排系统 - 访问日历
// ==========================================
// 职责: 可排日期、访问参数推导、访问列表生成/规范化/校验
// 红线: 所有策略与兜底共用本模块，保证 Visit 不变量一致:
//       - end = start + duration
//       - 时长在服务类型上下限内，且落在工作时间窗内
//       - 排除周末/节假日（按约束）
//       - 同日访问不重叠，相邻访问间隔不少于 min_hours_between_visits
//       - 每月总工时不超过法规上限
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::installation::WorkingHours;
use crate::domain::requirement::SchedulingConstraints;
use crate::domain::schedule::{duration_from_hours, Visit};
use crate::domain::types::{VisitFrequency, VisitType};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// 校正阶段要求的最小访问间隔（天）
pub const MIN_SPACING_DAYS: i64 = 3;

// 服务类型 → 单次访问时长上下限（小时）
const DURATION_BOUNDS: &[(&str, f64, f64)] = &[
    ("medical_surveillance", 1.0, 4.0),
    ("vigilancia_salud", 1.0, 4.0),
    ("safety", 2.0, 6.0),
    ("seguridad", 2.0, 6.0),
    ("hygiene", 2.0, 8.0),
    ("higiene", 2.0, 8.0),
    ("ergonomics", 1.0, 4.0),
    ("ergonomia", 1.0, 4.0),
    ("training", 2.0, 8.0),
];

const DEFAULT_DURATION_BOUNDS: (f64, f64) = (1.0, 8.0);

/// 服务类型对应的单次访问时长上下限
pub fn service_duration_bounds(service_type: &str) -> (f64, f64) {
    let key = service_type.trim().to_lowercase().replace('-', "_");
    DURATION_BOUNDS
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, lo, hi)| (*lo, *hi))
        .unwrap_or(DEFAULT_DURATION_BOUNDS)
}

/// 实际可用的时长上下限（与工作时间窗取交集）
pub fn effective_duration_bounds(ctx: &SchedulingContext) -> (f64, f64) {
    let (lo, hi) = service_duration_bounds(&ctx.service_type);
    let span = ctx.installation.working_hours.span_hours();
    let hi = hi.min(span);
    (lo.min(hi), hi)
}

/// 向上取整到 15 分钟
pub fn round_up_quarter(hours: f64) -> f64 {
    (hours * 4.0).ceil() / 4.0
}

/// 时长截断到上下限（按 15 分钟取整）
pub fn clamp_duration(hours: f64, bounds: (f64, f64)) -> f64 {
    let (lo, hi) = bounds;
    round_up_quarter(hours.max(lo)).min(hi)
}

// ==========================================
// 可排日期
// ==========================================

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 单日是否可排
pub fn is_eligible_day(date: NaiveDate, constraints: &SchedulingConstraints) -> bool {
    !(constraints.exclude_weekends && is_weekend(date)) && !constraints.is_excluded_holiday(date)
}

/// [start, end] 内的全部可排日期
pub fn eligible_days(start: NaiveDate, end: NaiveDate, constraints: &SchedulingConstraints) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        if is_eligible_day(cursor, constraints) {
            days.push(cursor);
        }
        match cursor.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    days
}

/// 按自然月切分排程期，返回每月的 [start, end]
pub fn month_slices(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut slices = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let (y, m) = if cursor.month() == 12 {
            (cursor.year() + 1, 1)
        } else {
            (cursor.year(), cursor.month() + 1)
        };
        let month_end = NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(end);
        let slice_end = month_end.min(end);
        slices.push((cursor, slice_end));
        match slice_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    slices
}

/// 在 n 个候选中均匀挑选 v 个位置: floor((k + 0.5) · n / v)
pub fn spread_indices(n: usize, v: usize) -> Vec<usize> {
    if n == 0 || v == 0 {
        return Vec::new();
    }
    if v >= n {
        return (0..n).collect();
    }
    (0..v)
        .map(|k| (((k as f64 + 0.5) * n as f64 / v as f64).floor() as usize).min(n - 1))
        .collect()
}

// ==========================================
// 访问参数
// ==========================================

/// 访问参数（每月次数 + 单次时长）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisitPlan {
    pub visits_per_month: u32,
    pub duration_hours: f64,
}

/// 根据法规要求推导访问参数
///
/// - 每周频率至少 4 次/月，每月频率至少 1 次/月
/// - 单次时长超过上限时增加次数: ceil(月工时 / 上限)
pub fn plan_visit_parameters(ctx: &SchedulingContext) -> VisitPlan {
    let bounds = effective_duration_bounds(ctx);
    let required = ctx.required_hours_per_month().max(0.0);
    let min_visits = ctx.requirement.required_visit_frequency.min_visits_per_month();

    let by_capacity = if bounds.1 > 0.0 {
        (required / bounds.1).ceil() as u32
    } else {
        min_visits
    };
    let visits = min_visits.max(by_capacity).max(1);
    let duration = clamp_duration(required / visits as f64, bounds);

    clamp_plan(
        ctx,
        VisitPlan {
            visits_per_month: visits,
            duration_hours: duration,
        },
    )
}

/// 时长向下取整到 15 分钟
pub fn round_down_quarter(hours: f64) -> f64 {
    (hours * 4.0 + 1e-9).floor() / 4.0
}

/// 给定单次时长下每月最多可排的次数（受每月工时上限约束）
pub fn max_visits_per_month(ctx: &SchedulingContext, duration_hours: f64) -> Option<u32> {
    let max_hours = ctx.requirement.maximum_hours_per_month;
    if max_hours <= 0.0 || duration_hours <= 0.0 {
        return None;
    }
    Some((max_hours / duration_hours + 1e-9).floor() as u32)
}

/// 访问参数截断: 时长落在上下限内，每月次数 × 时长不超过每月工时上限
///
/// 上限容纳不下频率要求的次数时先缩短时长；仍放不下则以工时上限为准
pub fn clamp_plan(ctx: &SchedulingContext, plan: VisitPlan) -> VisitPlan {
    let bounds = effective_duration_bounds(ctx);
    let mut duration = clamp_duration(plan.duration_hours, bounds);
    let mut visits = plan.visits_per_month.max(1);

    if let Some(cap) = max_visits_per_month(ctx, duration) {
        if visits > cap {
            let min_visits = ctx.requirement.required_visit_frequency.min_visits_per_month().max(1);
            if cap >= min_visits {
                visits = cap;
            } else {
                visits = min_visits;
                let max_hours = ctx.requirement.maximum_hours_per_month;
                duration = round_down_quarter(max_hours / visits as f64).max(bounds.0).min(bounds.1);
                let cap = max_visits_per_month(ctx, duration).unwrap_or(visits).max(1);
                visits = visits.min(cap);
            }
        }
    }

    VisitPlan {
        visits_per_month: visits,
        duration_hours: duration,
    }
}

/// 把开始时间放进时间窗: 保证 start ≥ 窗口开始，start + duration ≤ 窗口结束
pub fn fit_start(window: &WorkingHours, preferred: NaiveTime, duration_hours: f64) -> Option<NaiveTime> {
    let duration = duration_from_hours(duration_hours);
    if duration <= Duration::zero() {
        return None;
    }
    let latest = window.end - duration;
    if latest < window.start || window.end - window.start < duration {
        return None;
    }
    Some(preferred.clamp(window.start, latest))
}

// ==========================================
// 访问列表生成
// ==========================================

/// 按访问参数在排程期内生成访问列表
///
/// 每月在可排日期上均匀分布，同一天最多一次；
/// 可排日期不足时以实际可排天数为准
pub fn materialize_visits(ctx: &SchedulingContext, plan: VisitPlan, preferred_start: NaiveTime) -> Vec<Visit> {
    let window = ctx.installation.working_hours;
    let plan = clamp_plan(ctx, plan);
    let duration = plan.duration_hours;
    let start_time = match fit_start(&window, preferred_start, duration) {
        Some(t) => t,
        None => return Vec::new(),
    };

    let mut dates = Vec::new();
    for (month_start, month_end) in month_slices(ctx.start_date, ctx.end_date) {
        let days = eligible_days(month_start, month_end, &ctx.constraints);
        for idx in spread_indices(days.len(), plan.visits_per_month as usize) {
            dates.push(days[idx]);
        }
    }

    let total = dates.len();
    dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| Visit::new(date, start_time, duration, VisitType::for_position(i, total)))
        .collect()
}

/// 默认访问列表（时间窗开始时刻）
pub fn default_visits(ctx: &SchedulingContext) -> Vec<Visit> {
    let plan = plan_visit_parameters(ctx);
    materialize_visits(ctx, plan, ctx.installation.working_hours.start)
}

/// 规范化访问列表
///
/// - 排序、截断时长、拉回时间窗
/// - 不可排日期的访问移到最近的后续可排日期（超出排程期则丢弃）
/// - 同日重叠时顺延，放不下则丢弃
/// - 重新标注访问类型
pub fn normalize_visits(ctx: &SchedulingContext, mut visits: Vec<Visit>) -> Vec<Visit> {
    let window = ctx.installation.working_hours;
    let bounds = effective_duration_bounds(ctx);

    for visit in visits.iter_mut() {
        let duration = clamp_duration(visit.duration_hours, bounds);
        visit.resize(duration);
        if let Some(start) = fit_start(&window, visit.start_time, duration) {
            visit.shift_to(start);
        }
        if !is_eligible_day(visit.date, &ctx.constraints) {
            if let Some(next) = next_eligible_day(visit.date, ctx.end_date, &ctx.constraints) {
                visit.date = next;
            }
        }
    }

    visits.retain(|v| {
        v.date >= ctx.start_date
            && v.date <= ctx.end_date
            && is_eligible_day(v.date, &ctx.constraints)
            && window.contains(v.start_time, v.end_time)
    });
    visits.sort_by(|a, b| a.date.cmp(&b.date).then(a.start_time.cmp(&b.start_time)));

    let min_gap = min_gap(&ctx.constraints);
    let mut result: Vec<Visit> = Vec::with_capacity(visits.len());
    for mut visit in visits {
        if let Some(prev) = result.last() {
            let earliest = prev.end_at() + min_gap;
            if visit.start_at() < earliest {
                match next_slot(ctx, &visit, earliest) {
                    Some((date, start)) => {
                        visit.date = date;
                        visit.shift_to(start);
                    }
                    None => continue,
                }
            }
        }
        result.push(visit);
    }

    cap_monthly_hours(ctx, &mut result);
    relabel(&mut result);
    result
}

/// 相邻访问的最小间隔（上一次结束到下一次开始）
pub fn min_gap(constraints: &SchedulingConstraints) -> Duration {
    duration_from_hours(constraints.min_hours_between_visits)
}

/// 不早于 earliest 的第一个可用时段（保持时长，尽量保持开始时刻）
fn next_slot(ctx: &SchedulingContext, visit: &Visit, earliest: NaiveDateTime) -> Option<(NaiveDate, NaiveTime)> {
    let window = ctx.installation.working_hours;
    let first_day = earliest.date().max(visit.date);
    let mut cursor = first_day;
    while cursor <= ctx.end_date {
        if is_eligible_day(cursor, &ctx.constraints) {
            let preferred = if cursor == earliest.date() {
                visit.start_time.max(earliest.time())
            } else {
                visit.start_time
            };
            if let Some(start) = fit_start(&window, preferred, visit.duration_hours) {
                if cursor.and_time(start) >= earliest {
                    return Some((cursor, start));
                }
            }
        }
        cursor = cursor.succ_opt()?;
    }
    None
}

/// 按自然月累计工时，超出每月上限的访问丢弃（列表需已排序）
pub fn cap_monthly_hours(ctx: &SchedulingContext, visits: &mut Vec<Visit>) -> usize {
    let max_hours = ctx.requirement.maximum_hours_per_month;
    if max_hours <= 0.0 {
        return 0;
    }
    let mut booked: HashMap<(i32, u32), f64> = HashMap::new();
    let before = visits.len();
    visits.retain(|v| {
        let hours = booked.entry((v.date.year(), v.date.month())).or_insert(0.0);
        if *hours + v.duration_hours > max_hours + 1e-9 {
            return false;
        }
        *hours += v.duration_hours;
        true
    });
    before - visits.len()
}

/// 重新标注 initial / follow_up / final
pub fn relabel(visits: &mut [Visit]) {
    let total = visits.len();
    for (i, visit) in visits.iter_mut().enumerate() {
        visit.visit_type = VisitType::for_position(i, total);
    }
}

/// date 之后（含）的第一个可排日期
pub fn next_eligible_day(date: NaiveDate, limit: NaiveDate, constraints: &SchedulingConstraints) -> Option<NaiveDate> {
    let mut cursor = date;
    while cursor <= limit {
        if is_eligible_day(cursor, constraints) {
            return Some(cursor);
        }
        cursor = cursor.succ_opt()?;
    }
    None
}

// ==========================================
// 校验 / 校正
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarViolation {
    OutsidePeriod { date: NaiveDate },
    OutsideWorkingHours { date: NaiveDate },
    ExcludedDay { date: NaiveDate },
    Overlap { date: NaiveDate },
    DurationOutOfBounds { date: NaiveDate, hours: f64 },
    TooClose { date: NaiveDate, gap_days: i64 },
    FrequencyShortfall { month: u32, visits: u32, required: u32 },
}

impl CalendarViolation {
    /// 时间窗与周末/节假日违规（进化策略罚分用）
    pub fn is_window_or_day(&self) -> bool {
        matches!(
            self,
            CalendarViolation::OutsideWorkingHours { .. } | CalendarViolation::ExcludedDay { .. }
        )
    }

    /// 违反 Visit 不变量（编排层据此拒绝策略结果）
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            CalendarViolation::OutsidePeriod { .. }
                | CalendarViolation::OutsideWorkingHours { .. }
                | CalendarViolation::ExcludedDay { .. }
                | CalendarViolation::Overlap { .. }
                | CalendarViolation::DurationOutOfBounds { .. }
        )
    }
}

/// 校验访问列表，返回全部违规
pub fn validate_visits(ctx: &SchedulingContext, visits: &[Visit]) -> Vec<CalendarViolation> {
    let window = ctx.installation.working_hours;
    let (lo, hi) = effective_duration_bounds(ctx);
    let mut violations = Vec::new();

    for (i, visit) in visits.iter().enumerate() {
        if visit.date < ctx.start_date || visit.date > ctx.end_date {
            violations.push(CalendarViolation::OutsidePeriod { date: visit.date });
        }
        if !window.contains(visit.start_time, visit.end_time) {
            violations.push(CalendarViolation::OutsideWorkingHours { date: visit.date });
        }
        if !is_eligible_day(visit.date, &ctx.constraints) {
            violations.push(CalendarViolation::ExcludedDay { date: visit.date });
        }
        if visit.duration_hours < lo - 1e-9 || visit.duration_hours > hi + 1e-9 {
            violations.push(CalendarViolation::DurationOutOfBounds {
                date: visit.date,
                hours: visit.duration_hours,
            });
        }
        if visits[..i].iter().any(|other| other.overlaps(visit)) {
            violations.push(CalendarViolation::Overlap { date: visit.date });
        }
    }

    let mut sorted: Vec<NaiveDate> = visits.iter().map(|v| v.date).collect();
    sorted.sort();
    sorted.dedup();
    for pair in sorted.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        if gap < MIN_SPACING_DAYS {
            violations.push(CalendarViolation::TooClose {
                date: pair[1],
                gap_days: gap,
            });
        }
    }

    violations.extend(frequency_shortfalls(ctx, visits));
    violations
}

/// 每周频率要求每月至少 4 次，每月频率至少 1 次
pub fn frequency_shortfalls(ctx: &SchedulingContext, visits: &[Visit]) -> Vec<CalendarViolation> {
    let required = match ctx.requirement.required_visit_frequency {
        VisitFrequency::Weekly => 4,
        VisitFrequency::Monthly => 1,
    };
    month_slices(ctx.start_date, ctx.end_date)
        .into_iter()
        .filter_map(|(s, e)| {
            let available = eligible_days(s, e, &ctx.constraints).len() as u32;
            let needed = required.min(available);
            let count = visits.iter().filter(|v| v.date >= s && v.date <= e).count() as u32;
            if count < needed {
                Some(CalendarViolation::FrequencyShortfall {
                    month: s.month(),
                    visits: count,
                    required: needed,
                })
            } else {
                None
            }
        })
        .collect()
}

/// 校正阶段的日期间隔: 至少 3 天，且同一开始时刻下满足最小间隔小时数
fn spacing_days(ctx: &SchedulingContext, duration_hours: f64) -> i64 {
    let hours = ctx.constraints.min_hours_between_visits.max(0.0) + duration_hours.max(0.0);
    MIN_SPACING_DAYS.max((hours / 24.0).ceil() as i64)
}

/// 重新间隔: 与前一次访问间隔不足的访问后移到下一个未占用的可排日期
///
/// 找不到合适日期时保持原样（尽力而为）
pub fn respace_visits(ctx: &SchedulingContext, visits: &mut Vec<Visit>) -> usize {
    visits.sort_by(|a, b| a.date.cmp(&b.date).then(a.start_time.cmp(&b.start_time)));
    let mut used: HashSet<NaiveDate> = visits.iter().map(|v| v.date).collect();
    let mut moved = 0;

    for i in 1..visits.len() {
        let prev = visits[i - 1].date;
        let spacing = spacing_days(ctx, visits[i - 1].duration_hours);
        let gap = (visits[i].date - prev).num_days();
        if gap >= spacing {
            continue;
        }
        let earliest = prev + Duration::days(spacing);
        let limit = visits.get(i + 1).map(|v| v.date).unwrap_or(ctx.end_date);
        let mut cursor = earliest;
        let mut target = None;
        while cursor <= limit && cursor <= ctx.end_date {
            if is_eligible_day(cursor, &ctx.constraints) && !used.contains(&cursor) {
                target = Some(cursor);
                break;
            }
            match cursor.succ_opt() {
                Some(next) => cursor = next,
                None => break,
            }
        }
        if let Some(date) = target {
            used.remove(&visits[i].date);
            used.insert(date);
            visits[i].date = date;
            moved += 1;
        }
    }

    relabel(visits);
    moved
}

/// 把时间窗外的访问拉回窗内（保持时长）
pub fn pull_into_window(ctx: &SchedulingContext, visits: &mut [Visit]) -> usize {
    let window = ctx.installation.working_hours;
    let mut pulled = 0;
    for visit in visits.iter_mut() {
        if window.contains(visit.start_time, visit.end_time) {
            continue;
        }
        if let Some(start) = fit_start(&window, visit.start_time, visit.duration_hours) {
            visit.shift_to(start);
            pulled += 1;
        }
    }
    pulled
}
