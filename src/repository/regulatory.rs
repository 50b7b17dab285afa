// ==========================================
// 服务排程编排系统 - 默认法规规则
// ==========================================
// 每月最低工时 = 员工规模基准 × 风险系数
//   ≤50 人 4h / ≤250 人 8h / ≤500 人 16h / 其余 24h
//   风险系数: 低 1.0 / 中 1.25 / 高 1.5 / 极高 2.0
// 每月最高工时 = 最低工时 × 2
// 高风险、极高风险或 250 人以上按周访问，其余按月
// ==========================================

use crate::domain::installation::Installation;
use crate::domain::requirement::RegulatoryRequirement;
use crate::domain::types::{RiskCategory, VisitFrequency};
use crate::repository::collaborators::RegulatoryRulesProvider;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRegulatoryRules;

impl DefaultRegulatoryRules {
    fn base_hours(employee_count: u32) -> f64 {
        match employee_count {
            0..=50 => 4.0,
            51..=250 => 8.0,
            251..=500 => 16.0,
            _ => 24.0,
        }
    }

    fn risk_multiplier(risk: RiskCategory) -> f64 {
        match risk {
            RiskCategory::Low => 1.0,
            RiskCategory::Medium => 1.25,
            RiskCategory::High => 1.5,
            RiskCategory::VeryHigh => 2.0,
        }
    }
}

impl RegulatoryRulesProvider for DefaultRegulatoryRules {
    fn requirement_for(&self, installation: &Installation) -> RegulatoryRequirement {
        let minimum = Self::base_hours(installation.employee_count) * Self::risk_multiplier(installation.risk_category);
        let frequency = if matches!(installation.risk_category, RiskCategory::High | RiskCategory::VeryHigh)
            || installation.employee_count > 250
        {
            VisitFrequency::Weekly
        } else {
            VisitFrequency::Monthly
        };
        RegulatoryRequirement {
            minimum_hours_per_month: minimum,
            maximum_hours_per_month: minimum * 2.0,
            required_visit_frequency: frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installation::WorkingHours;

    fn installation(employees: u32, risk: RiskCategory) -> Installation {
        Installation {
            code: "I1".to_string(),
            name: "Planta".to_string(),
            address: "Madrid".to_string(),
            employee_count: employees,
            risk_category: risk,
            service_type: "safety".to_string(),
            working_hours: WorkingHours::default(),
        }
    }

    #[test]
    fn test_requirement_tiers() {
        let rules = DefaultRegulatoryRules;
        let small = rules.requirement_for(&installation(30, RiskCategory::Low));
        assert_eq!(small.minimum_hours_per_month, 4.0);
        assert_eq!(small.maximum_hours_per_month, 8.0);
        assert_eq!(small.required_visit_frequency, VisitFrequency::Monthly);

        let risky = rules.requirement_for(&installation(120, RiskCategory::VeryHigh));
        assert_eq!(risky.minimum_hours_per_month, 16.0);
        assert_eq!(risky.required_visit_frequency, VisitFrequency::Weekly);

        let large = rules.requirement_for(&installation(300, RiskCategory::Medium));
        assert_eq!(large.minimum_hours_per_month, 20.0);
        assert_eq!(large.required_visit_frequency, VisitFrequency::Weekly);
    }
}
