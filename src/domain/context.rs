// ==========================================
// 服务排程编排系统 - 排程上下文
// ==========================================
// 职责: 单次编排的只读输入快照（所有策略通过 Arc 共享）
// 红线: 编排期间不可变，策略不得修改
// ==========================================

use crate::domain::installation::{Contract, Installation};
use crate::domain::partner::{Partner, PartnerFilter};
use crate::domain::requirement::{RegulatoryRequirement, SchedulingConstraints};
use crate::domain::schedule::HistoricalSchedule;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// [start, end] 覆盖的自然月数（至少 1）
pub fn months_touched(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 1;
    }
    let s = start.year() * 12 + start.month() as i32;
    let e = end.year() * 12 + end.month() as i32;
    (e - s + 1).max(1) as u32
}

// ==========================================
// SchedulingContext - 排程上下文
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingContext {
    pub run_id: String,                        // 编排运行ID
    pub installation: Installation,            // 服务点
    pub contract: Contract,                    // 合同
    pub partners: Vec<Partner>,                // 候选合作方
    pub requirement: RegulatoryRequirement,    // 法规要求
    pub constraints: SchedulingConstraints,    // 排程约束
    pub history: Vec<HistoricalSchedule>,      // 该服务点的历史排程
    pub service_type: String,                  // 本次请求的服务类型
    pub start_date: NaiveDate,                 // 排程开始
    pub end_date: NaiveDate,                   // 排程结束
}

impl SchedulingContext {
    /// 排程期覆盖的月数
    pub fn period_months(&self) -> u32 {
        months_touched(self.start_date, self.end_date)
    }

    /// 每月法定最低工时
    pub fn required_hours_per_month(&self) -> f64 {
        self.requirement.minimum_hours_per_month
    }

    /// 整个排程期的最低工时
    pub fn total_required_hours(&self) -> f64 {
        self.required_hours_per_month() * self.period_months() as f64
    }

    pub fn find_partner(&self, partner_id: &str) -> Option<&Partner> {
        self.partners.iter().find(|p| p.id == partner_id)
    }

    /// 合作方在历史排程中出现的次数
    pub fn history_count_for(&self, partner_id: &str) -> usize {
        self.history.iter().filter(|h| h.partner_id == partner_id).count()
    }
}

// ==========================================
// ScheduleRequest - 排程请求（未校验）
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub contract_code: Option<String>,
    #[serde(default)]
    pub installation_code: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub constraints: Option<SchedulingConstraints>, // 覆盖默认约束
    #[serde(default)]
    pub partner_filter: Option<PartnerFilter>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl ScheduleRequest {
    pub fn new(
        contract_code: impl Into<String>,
        installation_code: impl Into<String>,
        service_type: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            contract_code: Some(contract_code.into()),
            installation_code: Some(installation_code.into()),
            service_type: Some(service_type.into()),
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
    }
}

// ==========================================
// ValidatedRequest - 校验通过的排程请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedRequest {
    pub contract_code: String,
    pub installation_code: String,
    pub service_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub constraints: SchedulingConstraints,
    pub partner_filter: PartnerFilter,
    pub requested_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_months_touched() {
        assert_eq!(months_touched(d(2026, 1, 1), d(2026, 1, 31)), 1);
        assert_eq!(months_touched(d(2026, 1, 31), d(2026, 2, 1)), 2);
        assert_eq!(months_touched(d(2026, 11, 15), d(2027, 2, 10)), 4);
        assert_eq!(months_touched(d(2026, 3, 1), d(2026, 2, 1)), 1);
    }
}
