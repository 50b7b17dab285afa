// ==========================================
// 服务排程编排系统 - 内存目录与存储
// ==========================================
// 用途: CSV 导入后的只读目录、测试与演示用存储
// 红线: 不含业务逻辑
// ==========================================

use crate::domain::algorithm::{AlgorithmRecord, AlgorithmRunDelta};
use crate::domain::installation::{Contract, Installation};
use crate::domain::partner::{Partner, PartnerFilter};
use crate::domain::schedule::{HistoricalSchedule, Schedule, Visit};
use crate::repository::collaborators::{
    ContractDirectory, HistoryStore, InstallationDirectory, MetricsStore, PartnerDirectory, ScheduleStore,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

fn lock_err<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::LockError(e.to_string())
}

// ==========================================
// InMemoryDirectory - 合作方/服务点/合同/历史
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    partners: RwLock<Vec<Partner>>,
    installations: RwLock<HashMap<String, Installation>>,
    contracts: RwLock<HashMap<String, Contract>>,
    history: RwLock<Vec<HistoricalSchedule>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        partners: Vec<Partner>,
        installations: Vec<Installation>,
        contracts: Vec<Contract>,
        history: Vec<HistoricalSchedule>,
    ) -> Self {
        Self {
            partners: RwLock::new(partners),
            installations: RwLock::new(installations.into_iter().map(|i| (i.code.clone(), i)).collect()),
            contracts: RwLock::new(contracts.into_iter().map(|c| (c.code.clone(), c)).collect()),
            history: RwLock::new(history),
        }
    }

    /// 新增或替换合作方（按ID）
    pub fn upsert_partner(&self, partner: Partner) -> RepositoryResult<()> {
        let mut partners = self.partners.write().map_err(lock_err)?;
        match partners.iter_mut().find(|p| p.id == partner.id) {
            Some(existing) => *existing = partner,
            None => partners.push(partner),
        }
        Ok(())
    }

    pub fn upsert_installation(&self, installation: Installation) -> RepositoryResult<()> {
        self.installations
            .write()
            .map_err(lock_err)?
            .insert(installation.code.clone(), installation);
        Ok(())
    }

    pub fn upsert_contract(&self, contract: Contract) -> RepositoryResult<()> {
        self.contracts
            .write()
            .map_err(lock_err)?
            .insert(contract.code.clone(), contract);
        Ok(())
    }

    pub fn add_history(&self, schedule: HistoricalSchedule) -> RepositoryResult<()> {
        self.history.write().map_err(lock_err)?.push(schedule);
        Ok(())
    }

    /// (合作方, 服务点, 合同, 历史) 数量
    pub fn counts(&self) -> RepositoryResult<(usize, usize, usize, usize)> {
        Ok((
            self.partners.read().map_err(lock_err)?.len(),
            self.installations.read().map_err(lock_err)?.len(),
            self.contracts.read().map_err(lock_err)?.len(),
            self.history.read().map_err(lock_err)?.len(),
        ))
    }
}

#[async_trait]
impl PartnerDirectory for InMemoryDirectory {
    async fn list_active_partners(&self, filter: &PartnerFilter) -> RepositoryResult<Vec<Partner>> {
        let partners = self.partners.read().map_err(lock_err)?;
        let mut active: Vec<Partner> = partners.iter().filter(|p| filter.matches(p)).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}

#[async_trait]
impl InstallationDirectory for InMemoryDirectory {
    async fn find_installation(&self, code: &str) -> RepositoryResult<Option<Installation>> {
        Ok(self.installations.read().map_err(lock_err)?.get(code.trim()).cloned())
    }
}

#[async_trait]
impl ContractDirectory for InMemoryDirectory {
    async fn find_contract(&self, code: &str) -> RepositoryResult<Option<Contract>> {
        Ok(self.contracts.read().map_err(lock_err)?.get(code.trim()).cloned())
    }
}

#[async_trait]
impl HistoryStore for InMemoryDirectory {
    async fn completed_schedules(&self, installation_code: &str, limit: usize) -> RepositoryResult<Vec<HistoricalSchedule>> {
        let history = self.history.read().map_err(lock_err)?;
        let mut rows: Vec<HistoricalSchedule> = history
            .iter()
            .filter(|h| h.installation_code == installation_code)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_date.cmp(&a.start_date).then_with(|| a.schedule_id.cmp(&b.schedule_id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

// ==========================================
// InMemoryScheduleStore - 排程写入（测试/演示）
// ==========================================
#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: Mutex<Vec<Schedule>>,
    visits: Mutex<HashMap<String, Vec<Visit>>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedules(&self) -> RepositoryResult<MutexGuard<'_, Vec<Schedule>>> {
        self.schedules.lock().map_err(lock_err)
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules().map(|s| s.len()).unwrap_or(0)
    }

    pub fn find_schedule(&self, schedule_id: &str) -> Option<Schedule> {
        self.schedules()
            .ok()?
            .iter()
            .find(|s| s.schedule_id == schedule_id)
            .cloned()
    }

    pub fn visits_for(&self, schedule_id: &str) -> Vec<Visit> {
        self.visits
            .lock()
            .ok()
            .and_then(|v| v.get(schedule_id).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn create_schedule(&self, schedule: &Schedule) -> RepositoryResult<String> {
        let mut schedules = self.schedules()?;
        if schedules.iter().any(|s| s.schedule_id == schedule.schedule_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "schedule_id={}",
                schedule.schedule_id
            )));
        }
        schedules.push(schedule.clone());
        Ok(schedule.schedule_id.clone())
    }

    async fn create_visits(&self, schedule_id: &str, visits: &[Visit]) -> RepositoryResult<usize> {
        if !self.schedules()?.iter().any(|s| s.schedule_id == schedule_id) {
            return Err(RepositoryError::ForeignKeyViolation(format!("schedule_id={}", schedule_id)));
        }
        self.visits
            .lock()
            .map_err(lock_err)?
            .entry(schedule_id.to_string())
            .or_default()
            .extend(visits.iter().cloned());
        Ok(visits.len())
    }
}

// ==========================================
// InMemoryMetricsStore - 算法指标（测试/演示）
// ==========================================
#[derive(Default)]
pub struct InMemoryMetricsStore {
    records: Mutex<BTreeMap<String, AlgorithmRecord>>,
    batches: Mutex<usize>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的批次数
    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn append_run_deltas(&self, deltas: &[AlgorithmRunDelta]) -> RepositoryResult<usize> {
        let mut records = self.records.lock().map_err(lock_err)?;
        for delta in deltas {
            match records.get_mut(&delta.name) {
                Some(record) => record.apply(delta),
                None => {
                    records.insert(delta.name.clone(), AlgorithmRecord::from_delta(delta));
                }
            }
        }
        *self.batches.lock().map_err(lock_err)? += 1;
        Ok(deltas.len())
    }

    async fn load_records(&self) -> RepositoryResult<Vec<AlgorithmRecord>> {
        Ok(self.records.lock().map_err(lock_err)?.values().cloned().collect())
    }
}
