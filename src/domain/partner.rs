// ==========================================
// 服务排程编排系统 - 合作方领域模型
// ==========================================
// 职责: 候选服务提供方（医生/工程师）及其可用工时台账
// ==========================================

use serde::{Deserialize, Serialize};

/// 平均每月周数（周工时换算月工时）
pub const WEEKS_PER_MONTH: f64 = 4.33;

// ==========================================
// AvailabilityLedger - 可用工时台账（月）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityLedger {
    pub available_hours: f64, // 当月可用工时
    pub booked_hours: f64,    // 当月已占用工时
}

impl AvailabilityLedger {
    /// 剩余工时（不小于 0）
    pub fn free_hours(&self) -> f64 {
        (self.available_hours - self.booked_hours).max(0.0)
    }

    /// 占用率 [0,1]
    pub fn utilization(&self) -> f64 {
        if self.available_hours <= 0.0 {
            1.0
        } else {
            (self.booked_hours / self.available_hours).clamp(0.0, 1.0)
        }
    }
}

// ==========================================
// Partner - 合作方
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: String,                                // 合作方ID
    pub name: String,                              // 名称
    pub specialty: String,                         // 专业
    pub city: String,                              // 所在城市
    pub hourly_rate: f64,                          // 小时费率
    pub max_weekly_hours: f64,                     // 每周工时上限
    #[serde(default)]
    pub availability: Option<AvailabilityLedger>,  // 可用工时台账
    #[serde(default)]
    pub satisfaction_score: Option<f64>,           // 客户满意度 [0,1]
    #[serde(default = "default_active")]
    pub active: bool,                              // 是否在册
}

fn default_active() -> bool {
    true
}

impl Partner {
    /// 当月剩余工时（无台账时返回 None）
    pub fn free_hours(&self) -> Option<f64> {
        self.availability.map(|a| a.free_hours())
    }

    /// 每月工时上限（周上限 × 4.33）
    pub fn monthly_capacity(&self) -> f64 {
        (self.max_weekly_hours * WEEKS_PER_MONTH).max(0.0)
    }

    /// 估算费用
    pub fn estimated_cost(&self, hours: f64) -> f64 {
        self.hourly_rate.max(0.0) * hours.max(0.0)
    }
}

// ==========================================
// PartnerFilter - 合作方查询条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerFilter {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

impl PartnerFilter {
    pub fn matches(&self, partner: &Partner) -> bool {
        if !partner.active {
            return false;
        }
        if let Some(city) = &self.city {
            if !partner.city.eq_ignore_ascii_case(city.trim()) {
                return false;
            }
        }
        if let Some(specialty) = &self.specialty {
            if !partner
                .specialty
                .to_lowercase()
                .contains(&specialty.trim().to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(city: &str, specialty: &str, active: bool) -> Partner {
        Partner {
            id: "P1".to_string(),
            name: "Dr. Test".to_string(),
            specialty: specialty.to_string(),
            city: city.to_string(),
            hourly_rate: 40.0,
            max_weekly_hours: 10.0,
            availability: Some(AvailabilityLedger {
                available_hours: 30.0,
                booked_hours: 12.0,
            }),
            satisfaction_score: None,
            active,
        }
    }

    #[test]
    fn test_free_hours_and_utilization() {
        let p = partner("Madrid", "medicina del trabajo", true);
        assert_eq!(p.free_hours(), Some(18.0));
        assert!((p.availability.unwrap().utilization() - 0.4).abs() < 1e-9);
        assert!((p.monthly_capacity() - 43.3).abs() < 1e-9);
    }

    #[test]
    fn test_filter_matches() {
        let filter = PartnerFilter {
            city: Some("madrid".to_string()),
            specialty: Some("medicina".to_string()),
        };
        assert!(filter.matches(&partner("Madrid", "Medicina del Trabajo", true)));
        assert!(!filter.matches(&partner("Madrid", "Medicina del Trabajo", false)));
        assert!(!filter.matches(&partner("Sevilla", "Medicina del Trabajo", true)));
    }
}
