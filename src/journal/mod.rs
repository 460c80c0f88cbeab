//! 元数据 Journal
//!
//! 位于文件系统块区域内的环形 write-ahead 日志。事务记录若干元数据块的
//! after-image，提交后崩溃也能在下次挂载时重放到最终位置。
//!
//! # 磁盘布局
//!
//! ```text
//! journal 块:  0            first ..................... maxlen-1
//!              [Superblock] [Desc][Data]...[Commit][Desc]...
//!                           \_________ 环形区域 _________/
//! ```
//!
//! # 核心组件
//!
//! - [`types`] - 超级块、描述符、提交块的磁盘格式
//! - [`Journal`] - journal 实例：init / load / begin / log_block / commit / abort
//! - [`Transaction`] - 内存中的活跃事务
//! - [`checksum`] - 数据块 XOR 校验和
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use blkcore::journal::{Journal, MountStatus};
//!
//! let jnl = Journal::open(cache.clone(), dev.clone(), 1024, 4096)?;
//! match jnl.load()? {
//!     MountStatus::Clean => {}
//!     MountStatus::Recovered(report) if report.is_partial() => {
//!         log::warn!("journal truncated at {:?}", report.stop);
//!     }
//!     MountStatus::Recovered(_) => {}
//! }
//!
//! jnl.begin()?;
//! jnl.log_block(42)?;
//! jnl.commit()?;
//!
//! cache.sync()?;
//! jnl.checkpoint()?;
//! jnl.shutdown()?;
//! ```

pub mod checksum;
pub mod types;

mod checkpoint;
mod commit;
mod jnl;
mod recovery;
mod transaction;

pub use jnl::Journal;
pub use recovery::{MountStatus, RecoveryReport, ScanStop};
pub use transaction::{LoggedBlock, Transaction};
pub use types::*;

/// Journal 错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalError {
    /// journal 区域小于最小块数
    TooSmall,
    /// 块大小不是 512 的非零倍数
    BadGeometry,
    /// 超级块 magic 或几何参数无效
    InvalidSuperblock,
    /// 已有活跃事务
    AlreadyActive,
    /// 没有活跃事务
    NotActive,
    /// journal 尚未 init 或 load
    NotLoaded,
    /// 事务达到块数上限
    TransactionFull,
    /// 事务记录超过 journal 可用长度
    TooLarge,
    /// 需要检查点才能写入新记录
    NoSpace,
    /// 块位于 journal 区域内
    ReservedBlock,
}

impl core::fmt::Display for JournalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let msg = match self {
            JournalError::TooSmall => "Journal region too small",
            JournalError::BadGeometry => "Invalid journal block size",
            JournalError::InvalidSuperblock => "Invalid journal superblock",
            JournalError::AlreadyActive => "Transaction already active",
            JournalError::NotActive => "No active transaction",
            JournalError::NotLoaded => "Journal not loaded",
            JournalError::TransactionFull => "Transaction block limit reached",
            JournalError::TooLarge => "Transaction larger than journal",
            JournalError::NoSpace => "Journal has no space",
            JournalError::ReservedBlock => "Block lies inside the journal region",
        };
        f.write_str(msg)
    }
}
