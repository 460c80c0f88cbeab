//! 错误类型定义
//!
//! 提供块设备、缓存、分区探测和 journal 操作共用的错误类型。

use core::fmt;

/// 块存储操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 磁盘数据损坏
    Corrupted,
    /// 对象不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 空间不足（设备表满、缓存耗尽、journal 满）
    NoSpace,
    /// 不支持的操作
    Unsupported,
    /// 设备忙
    Busy,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<crate::journal::JournalError> for Error {
    fn from(err: crate::journal::JournalError) -> Self {
        use crate::journal::JournalError;
        match err {
            JournalError::TooSmall => Error::new(ErrorKind::InvalidInput, "Journal region too small"),
            JournalError::BadGeometry => {
                Error::new(ErrorKind::InvalidInput, "Journal block size must be a multiple of the sector size")
            }
            JournalError::InvalidSuperblock => Error::new(ErrorKind::Corrupted, "Invalid journal superblock"),
            JournalError::AlreadyActive => Error::new(ErrorKind::InvalidState, "Transaction already active"),
            JournalError::NotActive => Error::new(ErrorKind::InvalidState, "No active transaction"),
            JournalError::TransactionFull => Error::new(ErrorKind::NoSpace, "Transaction block limit reached"),
            JournalError::TooLarge => Error::new(ErrorKind::NoSpace, "Transaction too large for journal"),
            JournalError::NoSpace => Error::new(ErrorKind::NoSpace, "Journal has no space, checkpoint required"),
            JournalError::NotLoaded => Error::new(ErrorKind::InvalidState, "Journal not initialized or loaded"),
            JournalError::ReservedBlock => {
                Error::new(ErrorKind::InvalidInput, "Block lies inside the journal region")
            }
        }
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
