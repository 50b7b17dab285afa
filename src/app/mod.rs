// ==========================================
// 服务排程编排系统 - 应用层
// ==========================================
// 职责: 组装各层实例，供 CLI 入口使用
// ==========================================

pub mod state;

pub use state::AppState;
