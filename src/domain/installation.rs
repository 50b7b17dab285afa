// ==========================================
// 服务排程编排系统 - 服务点 / 合同领域模型
// ==========================================
// 职责: 客户服务点（Installation）与服务合同（Contract）
// 红线: 编排期间只读，策略不得修改
// ==========================================

use crate::domain::types::RiskCategory;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// WorkingHours - 服务点工作时间窗
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime, // 开始时间
    pub end: NaiveTime,   // 结束时间
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// 时间窗长度（小时）
    pub fn span_hours(&self) -> f64 {
        let secs = (self.end - self.start).num_seconds();
        if secs <= 0 {
            0.0
        } else {
            secs as f64 / 3600.0
        }
    }

    /// 判断 [start, end] 是否完全落在时间窗内
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start && end <= self.end && start < end
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

// ==========================================
// Installation - 服务点
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub code: String,                 // 服务点编码
    pub name: String,                 // 名称
    pub address: String,              // 地址（含城市）
    pub employee_count: u32,          // 员工人数
    pub risk_category: RiskCategory,  // 风险类别
    pub service_type: String,         // 服务类型
    #[serde(default)]
    pub working_hours: WorkingHours,  // 工作时间窗
}

// ==========================================
// Contract - 服务合同
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub code: String,               // 合同编码
    pub client_name: String,        // 客户名称
    pub budget_limit: Option<f64>,  // 预算上限（None 表示未约定）
    pub start_date: NaiveDate,      // 合同开始
    pub end_date: NaiveDate,        // 合同结束
    #[serde(default)]
    pub contract_value: f64,        // 合同金额
}

impl Contract {
    /// 合同期（月），至少 1
    pub fn duration_months(&self) -> u32 {
        crate::domain::context::months_touched(self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_hours_span_and_contains() {
        let wh = WorkingHours::default();
        assert_eq!(wh.span_hours(), 9.0);

        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let late = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert!(wh.contains(nine, noon));
        assert!(!wh.contains(noon, late));
        assert!(!wh.contains(noon, nine));
    }
}
