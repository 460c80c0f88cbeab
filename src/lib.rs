//! blkcore: 块存储核心
//!
//! 文件系统之下的块存储层，提供：
//! - **设备抽象**：物理设备和分区共用同一套扇区读写接口
//! - **扇区缓存**：固定容量、LRU 淘汰、写回
//! - **分区探测**：GPT 优先，回退到 MBR
//! - **元数据 journal**：环形 write-ahead 日志和崩溃恢复
//!
//! # 示例
//!
//! ```rust,ignore
//! use alloc::sync::Arc;
//! use blkcore::{partition, BufferCache, Device, DeviceRegistry, Journal, Result};
//!
//! fn mount(driver: Arc<dyn blkcore::BlockDevice>) -> Result<()> {
//!     let mut registry = DeviceRegistry::new();
//!     let disk = Arc::new(Device::new("sda", driver)?);
//!     registry.register(disk.clone())?;
//!     partition::probe(&mut registry, &disk);
//!
//!     let root = registry.find_by_name("sda1").ok_or(blkcore::Error::new(
//!         blkcore::ErrorKind::NotFound,
//!         "no root partition",
//!     ))?;
//!     let cache = Arc::new(BufferCache::new(128)?);
//!     let jnl = Journal::open(cache.clone(), root, 1024, 4096)?;
//!     jnl.load()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`block`] - 块设备抽象和设备表
//! - [`cache`] - 扇区缓存
//! - [`partition`] - 分区表探测
//! - [`journal`] - 元数据 journal

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 块设备抽象
pub mod block;

/// 扇区缓存
pub mod cache;

/// 分区表探测
pub mod partition;

/// 元数据 journal
pub mod journal;

/// CRC32 校验和计算
pub mod crc;

#[cfg(test)]
mod testing;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, Device, DeviceRegistry, LockedDevice, RawBlockDevice};

// Cache
pub use cache::{Block, BufferCache, CacheConfig, CacheStats};

// 分区
pub use partition::{probe, PartitionScheme, ProbeReport};

// Journal
pub use journal::{Journal, JournalError, MountStatus, RecoveryReport};
