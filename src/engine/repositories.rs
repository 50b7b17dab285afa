// ==========================================
// 服务排程编排系统 - 引擎层协作方聚合
// ==========================================
// 职责: 聚合编排器所需的全部协作方接口
// 目标: 减少编排器构造参数，便于测试时整体替换
// ==========================================

use std::sync::Arc;

use crate::repository::{
    ContractDirectory, DefaultRegulatoryRules, HistoryStore, InMemoryDirectory, InstallationDirectory,
    PartnerDirectory, RegulatoryRulesProvider, ScheduleStore,
};

/// 编排器协作方集合
///
/// # 包含的协作方
/// - `partners`: 合作方目录
/// - `installations`: 服务点目录
/// - `contracts`: 合同目录
/// - `history`: 历史排程
/// - `regulatory`: 法规规则
/// - `schedules`: 排程写入
#[derive(Clone)]
pub struct SchedulingRepositories {
    pub partners: Arc<dyn PartnerDirectory>,
    pub installations: Arc<dyn InstallationDirectory>,
    pub contracts: Arc<dyn ContractDirectory>,
    pub history: Arc<dyn HistoryStore>,
    pub regulatory: Arc<dyn RegulatoryRulesProvider>,
    pub schedules: Arc<dyn ScheduleStore>,
}

impl SchedulingRepositories {
    pub fn new(
        partners: Arc<dyn PartnerDirectory>,
        installations: Arc<dyn InstallationDirectory>,
        contracts: Arc<dyn ContractDirectory>,
        history: Arc<dyn HistoryStore>,
        regulatory: Arc<dyn RegulatoryRulesProvider>,
        schedules: Arc<dyn ScheduleStore>,
    ) -> Self {
        Self {
            partners,
            installations,
            contracts,
            history,
            regulatory,
            schedules,
        }
    }

    /// 以同一个内存目录充当全部只读协作方，使用默认法规规则
    pub fn from_directory(directory: Arc<InMemoryDirectory>, schedules: Arc<dyn ScheduleStore>) -> Self {
        Self {
            partners: directory.clone(),
            installations: directory.clone(),
            contracts: directory.clone(),
            history: directory,
            regulatory: Arc::new(DefaultRegulatoryRules),
            schedules,
        }
    }

    /// 替换法规规则
    pub fn with_regulatory(mut self, regulatory: Arc<dyn RegulatoryRulesProvider>) -> Self {
        self.regulatory = regulatory;
        self
    }
}
