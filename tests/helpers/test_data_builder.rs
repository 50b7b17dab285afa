// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use service_visit_aps::domain::installation::{Contract, Installation, WorkingHours};
use service_visit_aps::domain::partner::{AvailabilityLedger, Partner};
use service_visit_aps::domain::requirement::{RegulatoryRequirement, SchedulingConstraints};
use service_visit_aps::domain::schedule::{HistoricalSchedule, Visit};
use service_visit_aps::domain::types::{RiskCategory, VisitFrequency};
use service_visit_aps::domain::{ScheduleRequest, SchedulingContext};
use service_visit_aps::repository::memory::InMemoryDirectory;

pub const INSTALLATION_CODE: &str = "INST-1";
pub const CONTRACT_CODE: &str = "CT-1";
pub const SERVICE_TYPE: &str = "medical_surveillance";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn period() -> (NaiveDate, NaiveDate) {
    (date(2026, 3, 1), date(2026, 3, 31))
}

// ==========================================
// Partner 构建器
// ==========================================

pub struct PartnerBuilder {
    partner: Partner,
}

impl PartnerBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            partner: Partner {
                id: id.to_string(),
                name: format!("Partner {}", id),
                specialty: "Medicina del Trabajo".to_string(),
                city: "Madrid".to_string(),
                hourly_rate: 40.0,
                max_weekly_hours: 20.0,
                availability: Some(AvailabilityLedger {
                    available_hours: 60.0,
                    booked_hours: 0.0,
                }),
                satisfaction_score: None,
                active: true,
            },
        }
    }

    pub fn city(mut self, city: &str) -> Self {
        self.partner.city = city.to_string();
        self
    }

    pub fn specialty(mut self, specialty: &str) -> Self {
        self.partner.specialty = specialty.to_string();
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.partner.hourly_rate = rate;
        self
    }

    pub fn free_hours(mut self, hours: f64) -> Self {
        self.partner.availability = Some(AvailabilityLedger {
            available_hours: hours,
            booked_hours: 0.0,
        });
        self
    }

    pub fn satisfaction(mut self, score: f64) -> Self {
        self.partner.satisfaction_score = Some(score);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.partner.active = false;
        self
    }

    pub fn build(self) -> Partner {
        self.partner
    }
}

pub fn installation(employee_count: u32, risk: RiskCategory) -> Installation {
    Installation {
        code: INSTALLATION_CODE.to_string(),
        name: "Planta Norte".to_string(),
        address: "Calle Mayor 1, Madrid".to_string(),
        employee_count,
        risk_category: risk,
        service_type: SERVICE_TYPE.to_string(),
        working_hours: WorkingHours::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ),
    }
}

pub fn contract(budget: Option<f64>) -> Contract {
    Contract {
        code: CONTRACT_CODE.to_string(),
        client_name: "ACME".to_string(),
        budget_limit: budget,
        start_date: date(2026, 1, 1),
        end_date: date(2026, 12, 31),
        contract_value: 12_000.0,
    }
}

pub fn history(schedule_id: &str, partner_id: &str, score: f64) -> HistoricalSchedule {
    HistoricalSchedule {
        schedule_id: schedule_id.to_string(),
        installation_code: INSTALLATION_CODE.to_string(),
        partner_id: partner_id.to_string(),
        start_date: date(2025, 1, 1),
        end_date: date(2025, 3, 31),
        total_hours: 30.0,
        visit_count: 10,
        optimization_score: score,
        completed_at: Some(date(2025, 4, 1)),
    }
}

/// 直接构造的排程上下文（策略级测试用）
pub fn context(partners: Vec<Partner>, min_hours: f64, frequency: VisitFrequency) -> SchedulingContext {
    let (start, end) = period();
    SchedulingContext {
        run_id: "RUN-TEST".to_string(),
        installation: installation(120, RiskCategory::Medium),
        contract: contract(None),
        partners,
        requirement: RegulatoryRequirement {
            minimum_hours_per_month: min_hours,
            maximum_hours_per_month: min_hours * 2.0,
            required_visit_frequency: frequency,
        },
        constraints: SchedulingConstraints::default(),
        history: Vec::new(),
        service_type: SERVICE_TYPE.to_string(),
        start_date: start,
        end_date: end,
    }
}

/// 含一个服务点、一份合同的内存目录
pub fn directory(partners: Vec<Partner>, history: Vec<HistoricalSchedule>) -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::from_parts(
        partners,
        vec![installation(120, RiskCategory::Medium)],
        vec![contract(Some(5_000.0))],
        history,
    ))
}

pub fn request() -> ScheduleRequest {
    let (start, end) = period();
    ScheduleRequest::new(CONTRACT_CODE, INSTALLATION_CODE, SERVICE_TYPE, start, end)
}

/// 访问列表不变量: 总工时 = Σ 时长；同日不重叠；结束 = 开始 + 时长
pub fn assert_visit_invariants(visits: &[Visit], total_hours: f64) {
    assert!(!visits.is_empty(), "访问列表不应为空");
    let sum: f64 = visits.iter().map(|v| v.duration_hours).sum();
    assert!((sum - total_hours).abs() < 1e-9, "Σ时长 {} != 总工时 {}", sum, total_hours);

    for v in visits {
        let minutes = (v.end_time - v.start_time).num_minutes() as f64;
        assert!((minutes - v.duration_hours * 60.0).abs() < 1.0, "end != start + duration");
    }
    for (i, a) in visits.iter().enumerate() {
        for b in visits.iter().skip(i + 1) {
            assert!(!a.overlaps(b), "同日访问重叠: {:?} / {:?}", a, b);
        }
    }
}
