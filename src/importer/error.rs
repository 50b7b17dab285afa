// ==========================================
// 服务排程编排系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 数据映射错误 =====
    #[error("必填字段缺失 ({file} 行 {row}): {field}")]
    MissingField {
        file: String,
        row: usize,
        field: String,
    },

    #[error("类型转换失败 ({file} 行 {row}, 字段 {field}): {message}")]
    TypeConversionError {
        file: String,
        row: usize,
        field: String,
        message: String,
    },

    #[error("日期格式错误 ({file} 行 {row}, 字段 {field}): 期望 YYYY-MM-DD，实际 {value}")]
    DateFormatError {
        file: String,
        row: usize,
        field: String,
        value: String,
    },

    // ===== 数据质量错误 =====
    #[error("数值范围错误 ({file} 行 {row}, 字段 {field}): 值 {value} 超出范围 [{min}, {max}]")]
    ValueRangeError {
        file: String,
        row: usize,
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("主键重复 ({file} 行 {row}): {key}")]
    DuplicateKey { file: String, row: usize, key: String },

    // ===== 写入错误 =====
    #[error("写入目录失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
