// ==========================================
// 服务排程编排系统 - 外部顾问: 提示词构造
// ==========================================
// 内容: 服务点、候选合作方、法规要求、排程约束、历史排程
// 输出要求: 严格 JSON（推荐合作方、置信度、理由、访问参数、备选、风险）
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::engine::scoring;
use serde::Serialize;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are an occupational health and safety scheduling advisor. \
Select exactly one partner from the provided candidates and propose visit parameters that \
satisfy the regulatory requirement. Reply with a single JSON object and nothing else.";

const RESPONSE_FORMAT: &str = r#"{
  "recommended_partner_id": "<partner id from the candidate list>",
  "confidence": 0.0,
  "reasoning": "<short explanation>",
  "visit_parameters": {
    "duration_hours": 4.0,
    "visits_per_month": 4,
    "preferred_start_time": "09:00"
  },
  "alternatives": [
    { "partner_id": "<id>", "score": 0.0, "reason": "<why>" }
  ],
  "risk_factors": ["<risk>"]
}"#;

/// 历史排程最多列出的条数
const MAX_HISTORY_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorPrompt {
    pub system: String,
    pub user: String,
}

impl AdvisorPrompt {
    /// 缓存键原文
    pub fn cache_material(&self) -> String {
        format!("{}\n---\n{}", self.system, self.user)
    }
}

pub fn build_prompt(ctx: &SchedulingContext) -> AdvisorPrompt {
    let installation = &ctx.installation;
    let candidates: Vec<serde_json::Value> = ctx
        .partners
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.name,
                "specialty": p.specialty,
                "city": p.city,
                "hourly_rate": p.hourly_rate,
                "free_hours": p.free_hours(),
                "distance_km": scoring::estimate_distance(&p.city, &installation.address),
                "satisfaction_score": p.satisfaction_score,
            })
        })
        .collect();

    let history: Vec<serde_json::Value> = ctx
        .history
        .iter()
        .take(MAX_HISTORY_LINES)
        .map(|h| {
            json!({
                "partner_id": h.partner_id,
                "start_date": h.start_date,
                "end_date": h.end_date,
                "total_hours": h.total_hours,
                "visit_count": h.visit_count,
                "score": h.optimization_score,
            })
        })
        .collect();

    let payload = json!({
        "installation": {
            "code": installation.code,
            "name": installation.name,
            "address": installation.address,
            "employee_count": installation.employee_count,
            "risk_category": installation.risk_category.as_str(),
            "working_hours": {
                "start": installation.working_hours.start.format("%H:%M").to_string(),
                "end": installation.working_hours.end.format("%H:%M").to_string(),
            },
        },
        "service_type": ctx.service_type,
        "period": { "start": ctx.start_date, "end": ctx.end_date },
        "requirements": {
            "minimum_hours_per_month": ctx.requirement.minimum_hours_per_month,
            "maximum_hours_per_month": ctx.requirement.maximum_hours_per_month,
            "visit_frequency": ctx.requirement.required_visit_frequency.as_str(),
        },
        "constraints": ctx.constraints,
        "budget_limit": ctx.contract.budget_limit,
        "candidates": candidates,
        "history": history,
    });

    let body = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    AdvisorPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Scheduling request:\n{}\n\nRespond strictly in this JSON format:\n{}",
            body, RESPONSE_FORMAT
        ),
    }
}
