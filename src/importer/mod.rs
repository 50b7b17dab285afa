// ==========================================
// 服务排程编排系统 - 导入层
// ==========================================
// 职责: 从 CSV 数据目录加载合作方/服务点/合同/历史排程
// ==========================================

pub mod csv_loader;
pub mod error;

pub use csv_loader::load_directory;
pub use error::{ImportError, ImportResult};
