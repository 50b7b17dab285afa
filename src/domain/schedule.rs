// ==========================================
// 服务排程编排系统 - 排程领域模型
// ==========================================
// 职责: 访问（Visit）、正式排程（Schedule）、历史排程
// 红线: end = start + duration；同一合作方同日访问不得重叠
// ==========================================

use crate::domain::types::VisitType;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Visit - 单次访问
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub date: NaiveDate,          // 访问日期
    pub start_time: NaiveTime,    // 开始时间
    pub end_time: NaiveTime,      // 结束时间
    pub duration_hours: f64,      // 时长（小时）
    pub visit_type: VisitType,    // 访问类型
    #[serde(default)]
    pub notes: Option<String>,    // 备注
}

impl Visit {
    /// 按开始时间 + 时长构造，保证 end = start + duration
    pub fn new(date: NaiveDate, start_time: NaiveTime, duration_hours: f64, visit_type: VisitType) -> Self {
        let end_time = start_time + duration_from_hours(duration_hours);
        Self {
            date,
            start_time,
            end_time,
            duration_hours,
            visit_type,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// 修改开始时间（保持时长不变）
    pub fn shift_to(&mut self, start_time: NaiveTime) {
        self.start_time = start_time;
        self.end_time = start_time + duration_from_hours(self.duration_hours);
    }

    /// 修改时长（保持开始时间不变）
    pub fn resize(&mut self, duration_hours: f64) {
        self.duration_hours = duration_hours;
        self.end_time = self.start_time + duration_from_hours(duration_hours);
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    /// 同日时间段是否重叠
    pub fn overlaps(&self, other: &Visit) -> bool {
        self.date == other.date && self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// 小时数转 chrono::Duration（按分钟取整）
pub fn duration_from_hours(hours: f64) -> Duration {
    Duration::minutes((hours.max(0.0) * 60.0).round() as i64)
}

/// 访问列表总工时
pub fn total_hours(visits: &[Visit]) -> f64 {
    visits.iter().map(|v| v.duration_hours).sum()
}

// ==========================================
// Schedule - 正式排程（持久化输出）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: String,        // 排程ID
    pub partner_id: String,         // 合作方ID
    pub partner_name: String,       // 合作方名称
    pub installation_code: String,  // 服务点编码
    pub contract_code: String,      // 合同编码
    pub start_date: NaiveDate,      // 开始日期
    pub end_date: NaiveDate,        // 结束日期
    pub total_hours: f64,           // 总工时
    pub strategy_name: String,      // 胜出算法
    pub final_score: f64,           // 最终综合评分
    pub confidence: f64,            // 置信度
    pub visits: Vec<Visit>,         // 访问列表
    pub created_at: NaiveDateTime,  // 创建时间
}

// ==========================================
// HistoricalSchedule - 已完成的历史排程
// ==========================================
// 用途: 历史表现评分、模式匹配训练样本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSchedule {
    pub schedule_id: String,
    pub installation_code: String,
    pub partner_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_hours: f64,
    pub visit_count: u32,
    pub optimization_score: f64,       // 历史综合评分 [0,1]
    #[serde(default)]
    pub completed_at: Option<NaiveDate>,
}

impl HistoricalSchedule {
    /// 平均单次访问时长
    pub fn average_visit_hours(&self) -> Option<f64> {
        if self.visit_count == 0 {
            None
        } else {
            Some(self.total_hours / self.visit_count as f64)
        }
    }
}
