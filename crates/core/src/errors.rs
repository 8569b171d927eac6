use thiserror::Error;

/// 对接流水线错误类型定义
#[derive(Debug, Error)]
pub enum DockingError {
    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("配体 {ligand_id} 格式转换失败: {message}")]
    ConversionFailed { ligand_id: String, message: String },

    #[error("批次 {batch_index} 对接引擎错误: {message}")]
    EngineError { batch_index: usize, message: String },

    #[error("批次 {batch_index} 对接报告缺失或无法解析: {path}")]
    MissingReport { batch_index: usize, path: String },

    #[error("受体准备失败: {0}")]
    ReceptorPreparationFailed(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl DockingError {
    /// 判断该错误是否属于瞬态故障，允许按重试预算重试。
    ///
    /// 只有引擎错误（崩溃、非零退出、超时）是可重试的；报告缺失
    /// 表示引擎逻辑不一致，重试没有意义。
    pub fn is_retryable(&self) -> bool {
        matches!(self, DockingError::EngineError { .. })
    }

    /// 判断该错误是否为运行级致命错误（中止整个运行）
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            DockingError::InvalidInput(_) | DockingError::ReceptorPreparationFailed(_)
        )
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, DockingError>;
