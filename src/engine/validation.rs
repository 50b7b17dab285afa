// ==========================================
// 服务排程编排系统 - 排程请求校验
// ==========================================
// 编排前唯一的前置检查:
// 合同编码、服务点编码、服务类型、开始日期、结束日期必须存在，
// 且结束日期不早于开始日期
// 失败时返回 Validation 错误（列出全部缺失字段）
// ==========================================

use crate::domain::context::{ScheduleRequest, ValidatedRequest};
use crate::engine::error::{SchedulingError, SchedulingResult};

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn validate_schedule_request(request: &ScheduleRequest) -> SchedulingResult<ValidatedRequest> {
    let contract_code = present(&request.contract_code);
    let installation_code = present(&request.installation_code);
    let service_type = present(&request.service_type);

    let mut missing = Vec::new();
    if contract_code.is_none() {
        missing.push("contract_code");
    }
    if installation_code.is_none() {
        missing.push("installation_code");
    }
    if service_type.is_none() {
        missing.push("service_type");
    }
    if request.start_date.is_none() {
        missing.push("start_date");
    }
    if request.end_date.is_none() {
        missing.push("end_date");
    }

    match (contract_code, installation_code, service_type, request.start_date, request.end_date) {
        (Some(contract_code), Some(installation_code), Some(service_type), Some(start_date), Some(end_date)) => {
            if end_date < start_date {
                return Err(SchedulingError::Validation(format!(
                    "结束日期早于开始日期: {} < {}",
                    end_date, start_date
                )));
            }
            Ok(ValidatedRequest {
                contract_code,
                installation_code,
                service_type,
                start_date,
                end_date,
                constraints: request.constraints.clone().unwrap_or_default(),
                partner_filter: request.partner_filter.clone().unwrap_or_default(),
                requested_by: request.requested_by.clone(),
            })
        }
        _ => Err(SchedulingError::Validation(format!("缺少必填字段: {}", missing.join(", ")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn test_complete_request_passes() {
        let request = ScheduleRequest::new(" C1 ", "INST1", "safety", d(1), d(31));
        let validated = validate_schedule_request(&request).unwrap();
        assert_eq!(validated.contract_code, "C1");
        assert_eq!(validated.constraints.max_travel_distance, 50.0);
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let request = ScheduleRequest {
            contract_code: Some("C1".to_string()),
            service_type: Some("  ".to_string()),
            start_date: Some(d(1)),
            ..Default::default()
        };
        let err = validate_schedule_request(&request).unwrap_err();
        match err {
            SchedulingError::Validation(msg) => {
                assert!(msg.contains("installation_code"));
                assert!(msg.contains("service_type"));
                assert!(msg.contains("end_date"));
                assert!(!msg.contains("contract_code"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_end_before_start_rejected() {
        let request = ScheduleRequest::new("C1", "INST1", "safety", d(10), d(9));
        assert!(matches!(
            validate_schedule_request(&request),
            Err(SchedulingError::Validation(_))
        ));
    }
}
