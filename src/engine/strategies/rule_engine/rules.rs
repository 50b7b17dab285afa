// ==========================================
// 服务排程编排系统 - 规则引擎: 规则目录
// ==========================================
// 规则 = {id, 类型, 优先级, 权重, 条件函数 → [0,1], 动作}
// 动作:
// - hard_constraint      评分 < 1 视为违反（严格模式下直接淘汰）
// - schedule_constraint  排程生成后复核，违反记录但不立即淘汰
// - score_multiplier / boost_score / preference_score  计入加权总分
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::partner::{Partner, WEEKS_PER_MONTH};
use crate::domain::schedule::Visit;
use crate::engine::calendar;
use crate::engine::scoring::ScoreBreakdown;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Preference,
    Business,
    Efficiency,
    Qualification,
    Constraint,
    Regulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    HardConstraint,
    ScheduleConstraint,
    ScoreMultiplier,
    BoostScore,
    PreferenceScore,
}

/// 规则条件的输入
pub struct RuleInput<'a> {
    pub partner: &'a Partner,
    pub ctx: &'a SchedulingContext,
    pub breakdown: &'a ScoreBreakdown,
    pub visits: &'a [Visit],
}

pub type RuleCondition = fn(&RuleInput<'_>) -> f64;

#[derive(Clone)]
pub struct Rule {
    pub id: &'static str,
    pub rule_type: RuleType,
    pub priority: u8, // 数值越小越先执行
    pub weight: f64,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    pub fn evaluate(&self, input: &RuleInput<'_>) -> f64 {
        let score = (self.condition)(input);
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn is_hard(&self) -> bool {
        self.action == RuleAction::HardConstraint
    }

    pub fn is_schedule_aware(&self) -> bool {
        self.action == RuleAction::ScheduleConstraint
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("rule_type", &self.rule_type)
            .field("priority", &self.priority)
            .field("weight", &self.weight)
            .field("action", &self.action)
            .finish()
    }
}

// ==========================================
// 条件函数
// ==========================================

fn historical_success(input: &RuleInput<'_>) -> f64 {
    input.breakdown.historical
}

fn cost_efficiency(input: &RuleInput<'_>) -> f64 {
    input.breakdown.cost
}

fn location_proximity(input: &RuleInput<'_>) -> f64 {
    input.breakdown.location
}

fn specialty_match(input: &RuleInput<'_>) -> f64 {
    input.breakdown.specialty
}

/// 当月剩余工时覆盖月需求（无台账时按周上限折算）
fn availability_adequate(input: &RuleInput<'_>) -> f64 {
    let required = input.ctx.required_hours_per_month();
    if required <= 0.0 {
        return 1.0;
    }
    let free = input
        .partner
        .free_hours()
        .unwrap_or_else(|| input.partner.monthly_capacity());
    (free / required).min(1.0)
}

fn workload_balance(input: &RuleInput<'_>) -> f64 {
    input
        .partner
        .availability
        .map(|a| 1.0 - a.utilization())
        .unwrap_or(0.5)
}

fn client_satisfaction(input: &RuleInput<'_>) -> f64 {
    input.partner.satisfaction_score.unwrap_or(0.5)
}

/// 法定最低工时: 周上限 × 4.33 必须覆盖每月最低工时
fn sepe_minimum_hours(input: &RuleInput<'_>) -> f64 {
    let required = input.ctx.required_hours_per_month();
    if required <= 0.0 {
        return 1.0;
    }
    (input.partner.max_weekly_hours * WEEKS_PER_MONTH / required).min(1.0)
}

/// 专业资质: 匹配度 ≥ 0.8 视为合格
fn professional_qualification(input: &RuleInput<'_>) -> f64 {
    if input.breakdown.specialty >= 0.8 {
        1.0
    } else {
        input.breakdown.specialty
    }
}

fn visit_frequency_compliance(input: &RuleInput<'_>) -> f64 {
    let shortfalls = calendar::frequency_shortfalls(input.ctx, input.visits);
    let months = calendar::month_slices(input.ctx.start_date, input.ctx.end_date).len().max(1);
    1.0 - shortfalls.len() as f64 / months as f64
}

fn working_hours_compliance(input: &RuleInput<'_>) -> f64 {
    if input.visits.is_empty() {
        return 0.0;
    }
    let window = input.ctx.installation.working_hours;
    let inside = input
        .visits
        .iter()
        .filter(|v| window.contains(v.start_time, v.end_time))
        .count();
    inside as f64 / input.visits.len() as f64
}

fn consistent_timing(input: &RuleInput<'_>) -> f64 {
    let minutes: Vec<u32> = input
        .visits
        .iter()
        .map(|v| v.start_time.hour() * 60 + v.start_time.minute())
        .collect();
    let (Some(min), Some(max)) = (minutes.iter().min(), minutes.iter().max()) else {
        return 0.5;
    };
    let span = input.ctx.installation.working_hours.span_hours() * 60.0;
    if span <= 0.0 {
        return 0.5;
    }
    (1.0 - (max - min) as f64 / span).clamp(0.0, 1.0)
}

fn avoid_weekends(input: &RuleInput<'_>) -> f64 {
    if input.visits.is_empty() {
        return 0.5;
    }
    let weekdays = input
        .visits
        .iter()
        .filter(|v| !calendar::is_weekend(v.date))
        .count();
    weekdays as f64 / input.visits.len() as f64
}

fn prefer_mornings(input: &RuleInput<'_>) -> f64 {
    if input.visits.is_empty() {
        return 0.5;
    }
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    let mornings = input.visits.iter().filter(|v| v.start_time < noon).count();
    mornings as f64 / input.visits.len() as f64
}

// ==========================================
// 默认规则目录
// ==========================================

pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "sepe_minimum_hours",
            rule_type: RuleType::Regulatory,
            priority: 1,
            weight: 0.10,
            action: RuleAction::HardConstraint,
            condition: sepe_minimum_hours,
        },
        Rule {
            id: "professional_qualification",
            rule_type: RuleType::Regulatory,
            priority: 1,
            weight: 0.10,
            action: RuleAction::HardConstraint,
            condition: professional_qualification,
        },
        Rule {
            id: "availability_adequate",
            rule_type: RuleType::Constraint,
            priority: 2,
            weight: 0.10,
            action: RuleAction::HardConstraint,
            condition: availability_adequate,
        },
        Rule {
            id: "visit_frequency_compliance",
            rule_type: RuleType::Regulatory,
            priority: 2,
            weight: 0.05,
            action: RuleAction::ScheduleConstraint,
            condition: visit_frequency_compliance,
        },
        Rule {
            id: "working_hours_compliance",
            rule_type: RuleType::Constraint,
            priority: 2,
            weight: 0.05,
            action: RuleAction::ScheduleConstraint,
            condition: working_hours_compliance,
        },
        Rule {
            id: "specialty_match",
            rule_type: RuleType::Qualification,
            priority: 3,
            weight: 0.15,
            action: RuleAction::ScoreMultiplier,
            condition: specialty_match,
        },
        Rule {
            id: "location_proximity",
            rule_type: RuleType::Efficiency,
            priority: 4,
            weight: 0.15,
            action: RuleAction::ScoreMultiplier,
            condition: location_proximity,
        },
        Rule {
            id: "cost_efficiency",
            rule_type: RuleType::Efficiency,
            priority: 4,
            weight: 0.15,
            action: RuleAction::ScoreMultiplier,
            condition: cost_efficiency,
        },
        Rule {
            id: "historical_success",
            rule_type: RuleType::Preference,
            priority: 5,
            weight: 0.15,
            action: RuleAction::BoostScore,
            condition: historical_success,
        },
        Rule {
            id: "workload_balance",
            rule_type: RuleType::Business,
            priority: 6,
            weight: 0.05,
            action: RuleAction::PreferenceScore,
            condition: workload_balance,
        },
        Rule {
            id: "client_satisfaction",
            rule_type: RuleType::Business,
            priority: 6,
            weight: 0.05,
            action: RuleAction::BoostScore,
            condition: client_satisfaction,
        },
        Rule {
            id: "consistent_timing",
            rule_type: RuleType::Preference,
            priority: 7,
            weight: 0.03,
            action: RuleAction::PreferenceScore,
            condition: consistent_timing,
        },
        Rule {
            id: "avoid_weekends",
            rule_type: RuleType::Preference,
            priority: 7,
            weight: 0.03,
            action: RuleAction::PreferenceScore,
            condition: avoid_weekends,
        },
        Rule {
            id: "prefer_mornings",
            rule_type: RuleType::Preference,
            priority: 7,
            weight: 0.04,
            action: RuleAction::PreferenceScore,
            condition: prefer_mornings,
        },
    ]
}

// ==========================================
// 次级决胜规则（按顺序）
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakRule {
    PreferHistorical,
    CostEfficiency,
    Location,
}

impl TieBreakRule {
    pub fn ordered() -> [TieBreakRule; 3] {
        [
            TieBreakRule::PreferHistorical,
            TieBreakRule::CostEfficiency,
            TieBreakRule::Location,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreakRule::PreferHistorical => "prefer_historical",
            TieBreakRule::CostEfficiency => "cost_efficiency",
            TieBreakRule::Location => "location",
        }
    }

    /// 决胜维度上的取值（越大越好）
    pub fn criterion(&self, breakdown: &ScoreBreakdown) -> f64 {
        match self {
            TieBreakRule::PreferHistorical => breakdown.historical,
            TieBreakRule::CostEfficiency => breakdown.cost,
            TieBreakRule::Location => breakdown.location,
        }
    }
}
