// ==========================================
// 服务排程编排系统 - 协作方接口
// ==========================================
// 职责: 编排层依赖的数据访问接口（目录、历史、法规、排程与指标存储）
// 红线: 接口不含业务逻辑，只做数据读写
// 实现者: memory（内存目录，CSV 导入后使用）/ SQLite 存储 / 默认法规规则
// ==========================================

use crate::domain::algorithm::{AlgorithmRecord, AlgorithmRunDelta};
use crate::domain::installation::{Contract, Installation};
use crate::domain::partner::{Partner, PartnerFilter};
use crate::domain::requirement::RegulatoryRequirement;
use crate::domain::schedule::{HistoricalSchedule, Schedule, Visit};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

/// 合作方目录
#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    /// 列出满足过滤条件的在岗合作方（含可用工时台账）
    async fn list_active_partners(&self, filter: &PartnerFilter) -> RepositoryResult<Vec<Partner>>;
}

/// 服务点目录
#[async_trait]
pub trait InstallationDirectory: Send + Sync {
    async fn find_installation(&self, code: &str) -> RepositoryResult<Option<Installation>>;
}

/// 合同目录
#[async_trait]
pub trait ContractDirectory: Send + Sync {
    async fn find_contract(&self, code: &str) -> RepositoryResult<Option<Contract>>;
}

/// 历史排程
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 服务点已完成的历史排程（按开始日期倒序，最多 limit 条）
    async fn completed_schedules(&self, installation_code: &str, limit: usize) -> RepositoryResult<Vec<HistoricalSchedule>>;
}

/// 法规规则（纯函数，不访问存储）
pub trait RegulatoryRulesProvider: Send + Sync {
    fn requirement_for(&self, installation: &Installation) -> RegulatoryRequirement;
}

/// 排程写入
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// 写入排程头，返回排程ID
    async fn create_schedule(&self, schedule: &Schedule) -> RepositoryResult<String>;

    /// 写入访问明细，返回写入条数
    async fn create_visits(&self, schedule_id: &str, visits: &[Visit]) -> RepositoryResult<usize>;
}

/// 算法指标存储
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// 批量追加单次编排的运行增量
    async fn append_run_deltas(&self, deltas: &[AlgorithmRunDelta]) -> RepositoryResult<usize>;

    /// 读取累计后的算法档案
    async fn load_records(&self) -> RepositoryResult<Vec<AlgorithmRecord>>;
}
