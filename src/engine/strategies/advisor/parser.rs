// ==========================================
// 服务排程编排系统 - 外部顾问: 响应解析
// ==========================================
// 容错: 允许 markdown 代码块包裹、前后夹杂说明文字
// 校验: 推荐合作方必须在候选列表中
// 截断: 置信度/备选评分 [0,1]，单次时长 [1,8] 小时，频率 [1,10] 次/月
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::result::clamp_unit;
use crate::engine::error::{SchedulingError, SchedulingResult};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

pub const MIN_DURATION_HOURS: f64 = 1.0;
pub const MAX_DURATION_HOURS: f64 = 8.0;
pub const MIN_VISITS_PER_MONTH: u32 = 1;
pub const MAX_VISITS_PER_MONTH: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitParameters {
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub visits_per_month: Option<f64>,
    #[serde(default)]
    pub preferred_start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub partner_id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorRecommendation {
    pub recommended_partner_id: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub visit_parameters: VisitParameters,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

impl AdvisorRecommendation {
    /// 截断后的单次时长
    pub fn duration_hours(&self) -> Option<f64> {
        self.visit_parameters
            .duration_hours
            .filter(|d| d.is_finite())
            .map(|d| d.clamp(MIN_DURATION_HOURS, MAX_DURATION_HOURS))
    }

    /// 截断后的每月访问次数
    pub fn visits_per_month(&self) -> Option<u32> {
        self.visit_parameters
            .visits_per_month
            .filter(|v| v.is_finite())
            .map(|v| (v.round() as i64).clamp(MIN_VISITS_PER_MONTH as i64, MAX_VISITS_PER_MONTH as i64) as u32)
    }

    pub fn preferred_start(&self) -> Option<NaiveTime> {
        let raw = self.visit_parameters.preferred_start_time.as_deref()?.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

/// 截取第一个 '{' 到最后一个 '}'
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// 解析并校验顾问响应
pub fn parse_recommendation(text: &str, ctx: &SchedulingContext) -> SchedulingResult<AdvisorRecommendation> {
    let json = extract_json(text)
        .ok_or_else(|| SchedulingError::Scheduling("顾问响应中没有 JSON 对象".to_string()))?;
    let mut rec: AdvisorRecommendation = serde_json::from_str(json)
        .map_err(|e| SchedulingError::Scheduling(format!("顾问响应无法解析: {}", e)))?;

    rec.recommended_partner_id = rec.recommended_partner_id.trim().to_string();
    if ctx.find_partner(&rec.recommended_partner_id).is_none() {
        return Err(SchedulingError::Scheduling(format!(
            "顾问推荐的合作方不在候选列表中: {}",
            rec.recommended_partner_id
        )));
    }

    rec.confidence = clamp_unit(rec.confidence);
    for alt in rec.alternatives.iter_mut() {
        alt.score = clamp_unit(alt.score);
    }
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_markdown() {
        let text = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nthanks";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no json"), None);
        assert_eq!(extract_json("} {"), None);
    }

    #[test]
    fn test_parameter_clamping() {
        let rec: AdvisorRecommendation = serde_json::from_str(
            r#"{"recommended_partner_id":"A","confidence":1.7,
                "visit_parameters":{"duration_hours":12,"visits_per_month":0,"preferred_start_time":"09:30"}}"#,
        )
        .unwrap();
        assert_eq!(rec.duration_hours(), Some(8.0));
        assert_eq!(rec.visits_per_month(), Some(1));
        assert_eq!(rec.preferred_start(), NaiveTime::from_hms_opt(9, 30, 0));
    }
}
