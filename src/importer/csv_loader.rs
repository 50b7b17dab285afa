// ==========================================
// 服务排程编排系统 - CSV 目录加载器
// ==========================================
// 数据目录约定:
// - partners.csv       合作方（必需）
// - installations.csv  服务点（必需）
// - contracts.csv      合同（必需）
// - history.csv        已完成历史排程（可选）
// 行号从 2 开始计（第 1 行为表头）
// ==========================================

use crate::domain::installation::{Contract, Installation, WorkingHours};
use crate::domain::partner::{AvailabilityLedger, Partner};
use crate::domain::schedule::HistoricalSchedule;
use crate::domain::types::RiskCategory;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::memory::InMemoryDirectory;
use chrono::{NaiveDate, NaiveTime};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument};

pub const PARTNERS_FILE: &str = "partners.csv";
pub const INSTALLATIONS_FILE: &str = "installations.csv";
pub const CONTRACTS_FILE: &str = "contracts.csv";
pub const HISTORY_FILE: &str = "history.csv";

// ==========================================
// 原始行读取
// ==========================================

/// 单行原始记录（表头 → 去空白后的值）
struct RawRow<'a> {
    file: &'a str,
    row: usize,
    values: HashMap<String, String>,
}

impl<'a> RawRow<'a> {
    fn optional(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, field: &str) -> ImportResult<&str> {
        self.optional(field).ok_or_else(|| ImportError::MissingField {
            file: self.file.to_string(),
            row: self.row,
            field: field.to_string(),
        })
    }

    fn parse<T>(&self, field: &str, raw: &str) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| ImportError::TypeConversionError {
            file: self.file.to_string(),
            row: self.row,
            field: field.to_string(),
            message: e.to_string(),
        })
    }

    fn required_parse<T>(&self, field: &str) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(field)?;
        self.parse(field, raw)
    }

    fn optional_parse<T>(&self, field: &str) -> ImportResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(field).map(|raw| self.parse(field, raw)).transpose()
    }

    fn non_negative(&self, field: &str, value: f64) -> ImportResult<f64> {
        self.in_range(field, value, 0.0, f64::MAX)
    }

    fn in_range(&self, field: &str, value: f64, min: f64, max: f64) -> ImportResult<f64> {
        if value.is_finite() && value >= min && value <= max {
            Ok(value)
        } else {
            Err(ImportError::ValueRangeError {
                file: self.file.to_string(),
                row: self.row,
                field: field.to_string(),
                value,
                min,
                max,
            })
        }
    }

    fn date(&self, field: &str, raw: &str) -> ImportResult<NaiveDate> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ImportError::DateFormatError {
            file: self.file.to_string(),
            row: self.row,
            field: field.to_string(),
            value: raw.to_string(),
        })
    }

    fn required_date(&self, field: &str) -> ImportResult<NaiveDate> {
        let raw = self.required(field)?;
        self.date(field, raw)
    }

    fn optional_date(&self, field: &str) -> ImportResult<Option<NaiveDate>> {
        self.optional(field).map(|raw| self.date(field, raw)).transpose()
    }

    fn optional_time(&self, field: &str) -> ImportResult<Option<NaiveTime>> {
        self.optional(field)
            .map(|raw| {
                NaiveTime::parse_from_str(raw, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
                    .map_err(|e| ImportError::TypeConversionError {
                        file: self.file.to_string(),
                        row: self.row,
                        field: field.to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()
    }

    fn optional_bool(&self, field: &str) -> ImportResult<Option<bool>> {
        self.optional(field)
            .map(|raw| match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => Ok(true),
                "0" | "false" | "no" | "n" => Ok(false),
                other => Err(ImportError::TypeConversionError {
                    file: self.file.to_string(),
                    row: self.row,
                    field: field.to_string(),
                    message: format!("无法识别的布尔值: {}", other),
                }),
            })
            .transpose()
    }
}

fn read_rows<'a>(path: &Path, file: &'a str) -> ImportResult<Vec<RawRow<'a>>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(File::open(path)?);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let values: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();

        // 跳过完全空白的行
        if values.values().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(RawRow {
            file,
            row: idx + 2,
            values,
        });
    }
    Ok(rows)
}

fn check_unique(seen: &mut HashSet<String>, row: &RawRow<'_>, key: &str) -> ImportResult<()> {
    if seen.insert(key.to_string()) {
        Ok(())
    } else {
        Err(ImportError::DuplicateKey {
            file: row.file.to_string(),
            row: row.row,
            key: key.to_string(),
        })
    }
}

// ==========================================
// 行映射
// ==========================================

fn map_partner(row: &RawRow<'_>) -> ImportResult<Partner> {
    let available: Option<f64> = row.optional_parse("available_hours")?;
    let booked: Option<f64> = row.optional_parse("booked_hours")?;
    let availability = match available {
        Some(available) => Some(AvailabilityLedger {
            available_hours: row.non_negative("available_hours", available)?,
            booked_hours: row.non_negative("booked_hours", booked.unwrap_or(0.0))?,
        }),
        None => None,
    };

    let satisfaction = row
        .optional_parse::<f64>("satisfaction_score")?
        .map(|s| row.in_range("satisfaction_score", s, 0.0, 1.0))
        .transpose()?;

    let hourly_rate = row.required_parse("hourly_rate")?;
    let max_weekly_hours = row.required_parse("max_weekly_hours")?;

    Ok(Partner {
        id: row.required("id")?.to_string(),
        name: row.required("name")?.to_string(),
        specialty: row.optional("specialty").unwrap_or_default().to_string(),
        city: row.optional("city").unwrap_or_default().to_string(),
        hourly_rate: row.non_negative("hourly_rate", hourly_rate)?,
        max_weekly_hours: row.non_negative("max_weekly_hours", max_weekly_hours)?,
        availability,
        satisfaction_score: satisfaction,
        active: row.optional_bool("active")?.unwrap_or(true),
    })
}

fn map_installation(row: &RawRow<'_>) -> ImportResult<Installation> {
    let defaults = WorkingHours::default();
    let working_hours = WorkingHours::new(
        row.optional_time("work_start")?.unwrap_or(defaults.start),
        row.optional_time("work_end")?.unwrap_or(defaults.end),
    );
    if working_hours.span_hours() <= 0.0 {
        return Err(ImportError::TypeConversionError {
            file: row.file.to_string(),
            row: row.row,
            field: "work_end".to_string(),
            message: "工作结束时间必须晚于开始时间".to_string(),
        });
    }

    Ok(Installation {
        code: row.required("code")?.to_string(),
        name: row.optional("name").unwrap_or_default().to_string(),
        address: row.optional("address").unwrap_or_default().to_string(),
        employee_count: row.required_parse("employee_count")?,
        risk_category: row.required_parse::<RiskCategory>("risk_category")?,
        service_type: row.required("service_type")?.to_string(),
        working_hours,
    })
}

fn map_contract(row: &RawRow<'_>) -> ImportResult<Contract> {
    let start_date = row.required_date("start_date")?;
    let end_date = row.required_date("end_date")?;
    if end_date < start_date {
        return Err(ImportError::DateFormatError {
            file: row.file.to_string(),
            row: row.row,
            field: "end_date".to_string(),
            value: end_date.to_string(),
        });
    }
    let budget_limit = row
        .optional_parse::<f64>("budget_limit")?
        .map(|b| row.non_negative("budget_limit", b))
        .transpose()?;

    Ok(Contract {
        code: row.required("code")?.to_string(),
        client_name: row.optional("client_name").unwrap_or_default().to_string(),
        budget_limit,
        start_date,
        end_date,
        contract_value: row.optional_parse("contract_value")?.unwrap_or(0.0),
    })
}

fn map_history(row: &RawRow<'_>) -> ImportResult<HistoricalSchedule> {
    let score = row.required_parse::<f64>("optimization_score")?;
    let total_hours = row.required_parse::<f64>("total_hours")?;
    Ok(HistoricalSchedule {
        schedule_id: row.required("schedule_id")?.to_string(),
        installation_code: row.required("installation_code")?.to_string(),
        partner_id: row.required("partner_id")?.to_string(),
        start_date: row.required_date("start_date")?,
        end_date: row.required_date("end_date")?,
        total_hours: row.non_negative("total_hours", total_hours)?,
        visit_count: row.required_parse("visit_count")?,
        optimization_score: row.in_range("optimization_score", score, 0.0, 1.0)?,
        completed_at: row.optional_date("completed_at")?,
    })
}

fn load_file<T, F>(dir: &Path, file: &'static str, key_of: fn(&T) -> &str, map: F) -> ImportResult<Vec<T>>
where
    F: Fn(&RawRow<'_>) -> ImportResult<T>,
{
    let rows = read_rows(&dir.join(file), file)?;
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let item = map(row)?;
        check_unique(&mut seen, row, key_of(&item))?;
        items.push(item);
    }
    Ok(items)
}

// ==========================================
// 对外入口
// ==========================================

/// 从数据目录加载全部 CSV 到内存目录
///
/// 任一行出错即整体失败（错误携带文件名与行号），不做部分写入
#[instrument(skip_all, fields(data_dir = %data_dir.display()))]
pub fn load_directory(data_dir: &Path) -> ImportResult<InMemoryDirectory> {
    let partners = load_file(data_dir, PARTNERS_FILE, |p: &Partner| p.id.as_str(), map_partner)?;
    let installations = load_file(
        data_dir,
        INSTALLATIONS_FILE,
        |i: &Installation| i.code.as_str(),
        map_installation,
    )?;
    let contracts = load_file(data_dir, CONTRACTS_FILE, |c: &Contract| c.code.as_str(), map_contract)?;
    let history = if data_dir.join(HISTORY_FILE).exists() {
        load_file(
            data_dir,
            HISTORY_FILE,
            |h: &HistoricalSchedule| h.schedule_id.as_str(),
            map_history,
        )?
    } else {
        Vec::new()
    };

    info!(
        partners = partners.len(),
        installations = installations.len(),
        contracts = contracts.len(),
        history = history.len(),
        "CSV 数据加载完成"
    );

    Ok(InMemoryDirectory::from_parts(partners, installations, contracts, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::collaborators::{ContractDirectory, HistoryStore, InstallationDirectory, PartnerDirectory};
    use crate::domain::partner::PartnerFilter;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn seed(dir: &Path) {
        write(
            dir,
            PARTNERS_FILE,
            "id,name,specialty,city,hourly_rate,max_weekly_hours,available_hours,booked_hours,satisfaction_score,active\n\
             A,Dr. A,Occupational Medicine,Madrid,45,10,40,5,0.9,true\n\
             B,Dr. B,Occupational Medicine,Madrid,40,12,,,,\n\
             ,,,,,,,,,\n\
             C,Dr. C,Safety,Sevilla,30,8,,,,false\n",
        );
        write(
            dir,
            INSTALLATIONS_FILE,
            "code,name,address,employee_count,risk_category,service_type,work_start,work_end\n\
             INST-1,Plant,Calle 1 Madrid,120,high,medical,08:00,16:00\n",
        );
        write(
            dir,
            CONTRACTS_FILE,
            "code,client_name,budget_limit,start_date,end_date,contract_value\n\
             CT-1,ACME,5000,2026-01-01,2026-12-31,12000\n",
        );
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        write(
            dir.path(),
            HISTORY_FILE,
            "schedule_id,installation_code,partner_id,start_date,end_date,total_hours,visit_count,optimization_score,completed_at\n\
             H1,INST-1,B,2025-01-01,2025-03-31,24,6,0.85,2025-04-01\n",
        );

        let directory = load_directory(dir.path()).unwrap();
        assert_eq!(directory.counts().unwrap(), (3, 1, 1, 1));

        let active = directory
            .list_active_partners(&PartnerFilter::default())
            .await
            .unwrap();
        assert_eq!(active.len(), 2);

        let installation = directory.find_installation("INST-1").await.unwrap().unwrap();
        assert_eq!(installation.risk_category, RiskCategory::High);
        assert_eq!(installation.working_hours.span_hours(), 8.0);

        let contract = directory.find_contract("CT-1").await.unwrap().unwrap();
        assert_eq!(contract.budget_limit, Some(5000.0));

        let history = directory.completed_schedules("INST-1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].partner_id, "B");
    }

    #[test]
    fn test_history_is_optional() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let directory = load_directory(dir.path()).unwrap();
        assert_eq!(directory.counts().unwrap().3, 0);
    }

    #[test]
    fn test_row_errors_carry_location() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        write(
            dir.path(),
            CONTRACTS_FILE,
            "code,client_name,budget_limit,start_date,end_date\nCT-1,ACME,,2026/01/01,2026-12-31\n",
        );
        match load_directory(dir.path()).unwrap_err() {
            ImportError::DateFormatError { file, row, field, .. } => {
                assert_eq!(file, CONTRACTS_FILE);
                assert_eq!(row, 2);
                assert_eq!(field, "start_date");
            }
            other => panic!("unexpected error: {other}"),
        }

        write(
            dir.path(),
            CONTRACTS_FILE,
            "code,client_name,budget_limit,start_date,end_date\nCT-1,A,,2026-01-01,2026-12-31\nCT-1,B,,2026-01-01,2026-12-31\n",
        );
        assert!(matches!(
            load_directory(dir.path()).unwrap_err(),
            ImportError::DuplicateKey { row: 3, .. }
        ));
    }

    #[test]
    fn test_missing_required_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_directory(dir.path()).unwrap_err(),
            ImportError::FileNotFound(_)
        ));
    }
}
