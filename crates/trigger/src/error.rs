//! Trigger 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Trigger 错误
#[derive(Debug, Error)]
pub enum TriggerError {
    /// 报文无法解析
    #[error(transparent)]
    Malformed(#[from] ContractError),

    /// 未终止的行超过长度上限，已丢弃
    #[error("unterminated line exceeded {max} bytes")]
    LineTooLong {
        /// 长度上限
        max: usize,
    },
}

impl From<TriggerError> for ContractError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Malformed(inner) => inner,
            TriggerError::LineTooLong { max } => {
                ContractError::malformed_frame(format!("unterminated line exceeded {max} bytes"))
            }
        }
    }
}

/// Trigger Result 类型别名
pub type Result<T> = std::result::Result<T, TriggerError>;
