// ==========================================
// 服务排程编排系统 - 法规要求与排程约束
// ==========================================
// 依据: 法定最低服务时长（SEPE 类规定）
// ==========================================

use crate::domain::types::{FlexibilityLevel, VisitFrequency};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// RegulatoryRequirement - 法规要求
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryRequirement {
    pub minimum_hours_per_month: f64,          // 每月最低工时
    pub maximum_hours_per_month: f64,          // 每月最高工时
    pub required_visit_frequency: VisitFrequency, // 访问频率
}

// ==========================================
// SchedulingConstraints - 排程约束
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConstraints {
    #[serde(default = "default_true")]
    pub exclude_weekends: bool, // 排除周末
    #[serde(default = "default_true")]
    pub exclude_holidays: bool, // 排除节假日
    #[serde(default)]
    pub holidays: Vec<NaiveDate>, // 节假日列表
    #[serde(default = "default_max_travel_distance")]
    pub max_travel_distance: f64, // 最大通勤距离
    #[serde(default = "default_min_hours_between_visits")]
    pub min_hours_between_visits: f64, // 两次访问最小间隔（小时）
    #[serde(default)]
    pub flexibility: FlexibilityLevel, // 灵活度
}

fn default_true() -> bool {
    true
}

fn default_max_travel_distance() -> f64 {
    50.0
}

fn default_min_hours_between_visits() -> f64 {
    24.0
}

impl Default for SchedulingConstraints {
    fn default() -> Self {
        Self {
            exclude_weekends: true,
            exclude_holidays: true,
            holidays: Vec::new(),
            max_travel_distance: default_max_travel_distance(),
            min_hours_between_visits: default_min_hours_between_visits(),
            flexibility: FlexibilityLevel::default(),
        }
    }
}

impl SchedulingConstraints {
    /// 判断日期是否为节假日（仅在 exclude_holidays 时生效）
    pub fn is_excluded_holiday(&self, date: NaiveDate) -> bool {
        self.exclude_holidays && self.holidays.contains(&date)
    }
}
