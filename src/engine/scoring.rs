// ==========================================
// 服务排程编排系统 - 评分工具箱
// ==========================================
// 职责: 位置/可用性/成本/专业/历史子评分与加权综合评分
// 红线: 纯函数、无状态；相同输入必须得到相同输出
//       （兜底路径与各策略输出必须可比）
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::partner::Partner;
use crate::domain::schedule::HistoricalSchedule;
use serde::{Deserialize, Serialize};

/// 同城距离
pub const SAME_CITY_DISTANCE: f64 = 5.0;
/// 查表未命中时的默认距离
pub const DEFAULT_DISTANCE: f64 = 25.0;
/// 历史子评分的固定权重（叠加在四项基础权重之上）
pub const HISTORICAL_WEIGHT: f64 = 0.1;

// 粗粒度城市距离表（双向）
const CITY_DISTANCES: &[(&str, &str, f64)] = &[
    ("madrid", "getafe", 15.0),
    ("madrid", "mostoles", 20.0),
    ("madrid", "alcala de henares", 35.0),
    ("madrid", "guadalajara", 60.0),
    ("madrid", "toledo", 72.0),
    ("barcelona", "badalona", 10.0),
    ("barcelona", "sabadell", 25.0),
    ("barcelona", "terrassa", 30.0),
    ("barcelona", "girona", 100.0),
    ("valencia", "sagunto", 30.0),
    ("valencia", "castellon", 75.0),
    ("sevilla", "dos hermanas", 15.0),
    ("sevilla", "cadiz", 120.0),
    ("bilbao", "barakaldo", 10.0),
    ("bilbao", "vitoria", 65.0),
];

// 服务类型 → 专业同义词表
const SPECIALTY_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "medical_surveillance",
        &["medicina del trabajo", "occupational medicine", "medicina"],
    ),
    (
        "vigilancia_salud",
        &["medicina del trabajo", "occupational medicine", "medicina"],
    ),
    (
        "safety",
        &["seguridad en el trabajo", "prevencion", "safety engineering"],
    ),
    (
        "seguridad",
        &["seguridad en el trabajo", "prevencion", "safety engineering"],
    ),
    ("hygiene", &["higiene industrial", "industrial hygiene"]),
    ("higiene", &["higiene industrial", "industrial hygiene"]),
    ("ergonomics", &["ergonomia", "psicosociologia", "ergonomics"]),
    ("ergonomia", &["ergonomia", "psicosociologia", "ergonomics"]),
    ("training", &["formacion", "prevencion", "training"]),
];

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' => 'a',
            'é' | 'è' => 'e',
            'í' => 'i',
            'ó' | 'ò' => 'o',
            'ú' | 'ü' => 'u',
            '_' | '-' => ' ',
            other => other,
        })
        .collect()
}

// ==========================================
// 子评分
// ==========================================

/// 粗粒度通勤距离（非真实路网）
pub fn estimate_distance(partner_city: &str, installation_address: &str) -> f64 {
    let city = normalize(partner_city);
    let address = normalize(installation_address);
    if city.is_empty() || address.is_empty() {
        return DEFAULT_DISTANCE;
    }
    if address.contains(&city) {
        return SAME_CITY_DISTANCE;
    }
    CITY_DISTANCES
        .iter()
        .find(|(a, b, _)| (city == *a && address.contains(b)) || (city == *b && address.contains(a)))
        .map(|(_, _, d)| *d)
        .unwrap_or(DEFAULT_DISTANCE)
}

/// 位置评分 = max(0, 1 - 距离 / 最大距离)
pub fn location_score(partner_city: &str, installation_address: &str, max_distance: f64) -> f64 {
    if max_distance <= 0.0 {
        return 0.0;
    }
    let distance = estimate_distance(partner_city, installation_address);
    (1.0 - distance / max_distance).clamp(0.0, 1.0)
}

/// 可用性评分（剩余工时 / 所需工时，阶梯化）
pub fn availability_score(partner: &Partner, required_hours: f64) -> f64 {
    let free = match partner.free_hours() {
        Some(free) => free,
        None => return 0.5,
    };
    if required_hours <= 0.0 {
        return 1.0;
    }
    let ratio = free / required_hours;
    if ratio >= 1.0 {
        1.0
    } else if ratio >= 0.75 {
        0.8
    } else if ratio >= 0.5 {
        0.6
    } else if ratio >= 0.25 {
        0.3
    } else {
        0.1
    }
}

/// 成本评分 = 1 - 费用 / 预算；无预算时 0.5
pub fn cost_score(partner: &Partner, required_hours: f64, budget: Option<f64>) -> f64 {
    match budget {
        Some(budget) if budget > 0.0 => {
            (1.0 - partner.estimated_cost(required_hours) / budget).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}

/// 专业匹配评分: 精确 1.0 / 部分 0.8 / 其他 0.2
pub fn specialty_score(specialty: &str, service_type: &str) -> f64 {
    let specialty = normalize(specialty);
    let service = normalize(service_type);
    if specialty.is_empty() || service.is_empty() {
        return 0.2;
    }
    if specialty == service {
        return 1.0;
    }

    let synonyms = SPECIALTY_SYNONYMS
        .iter()
        .find(|(key, _)| normalize(key) == service)
        .map(|(_, list)| *list)
        .unwrap_or(&[]);

    if synonyms.iter().any(|s| normalize(s) == specialty) {
        return 1.0;
    }

    let partial = specialty.contains(&service)
        || service.contains(&specialty)
        || synonyms.iter().any(|s| {
            let s = normalize(s);
            specialty.contains(&s) || s.contains(&specialty)
        });
    if partial {
        0.8
    } else {
        0.2
    }
}

/// 历史表现评分
///
/// 同一合作方+服务点的平均分 +0.2；否则该合作方整体平均分 +0.1；否则 0.5
pub fn historical_score(partner_id: &str, installation_code: &str, history: &[HistoricalSchedule]) -> f64 {
    let pair: Vec<f64> = history
        .iter()
        .filter(|h| h.partner_id == partner_id && h.installation_code == installation_code)
        .map(|h| h.optimization_score)
        .collect();
    if !pair.is_empty() {
        return (mean(&pair) + 0.2).clamp(0.0, 1.0);
    }

    let anywhere: Vec<f64> = history
        .iter()
        .filter(|h| h.partner_id == partner_id)
        .map(|h| h.optimization_score)
        .collect();
    if !anywhere.is_empty() {
        return (mean(&anywhere) + 0.1).clamp(0.0, 1.0);
    }

    0.5
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// ==========================================
// 综合评分
// ==========================================

/// 四项基础权重（历史权重固定为 0.1，叠加在外）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub location: f64,
    pub availability: f64,
    pub cost: f64,
    pub specialty: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            location: 0.4,
            availability: 0.3,
            cost: 0.2,
            specialty: 0.1,
        }
    }
}

/// 子评分明细
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub location: f64,
    pub availability: f64,
    pub cost: f64,
    pub specialty: f64,
    pub historical: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// 子评分明细（可用性按月、成本按整个排程期）
pub fn score_breakdown(partner: &Partner, ctx: &SchedulingContext) -> ScoreBreakdown {
    ScoreBreakdown {
        location: location_score(
            &partner.city,
            &ctx.installation.address,
            ctx.constraints.max_travel_distance,
        ),
        availability: availability_score(partner, ctx.required_hours_per_month()),
        cost: cost_score(partner, ctx.total_required_hours(), ctx.contract.budget_limit),
        specialty: specialty_score(&partner.specialty, &ctx.service_type),
        historical: historical_score(&partner.id, &ctx.installation.code, &ctx.history),
    }
}

/// 加权综合评分，截断到 [0,1]
pub fn composite_score(partner: &Partner, ctx: &SchedulingContext, weights: &CompositeWeights) -> CompositeScore {
    let b = score_breakdown(partner, ctx);
    let raw = b.location * weights.location
        + b.availability * weights.availability
        + b.cost * weights.cost
        + b.specialty * weights.specialty
        + b.historical * HISTORICAL_WEIGHT;
    let score = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
    CompositeScore { score, breakdown: b }
}

/// 按综合评分降序排列全部候选（同分按合作方ID升序）
pub fn rank_by_composite<'a>(ctx: &'a SchedulingContext, weights: &CompositeWeights) -> Vec<(&'a Partner, CompositeScore)> {
    let mut ranked: Vec<(&Partner, CompositeScore)> = ctx
        .partners
        .iter()
        .map(|p| (p, composite_score(p, ctx, weights)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    ranked
}
