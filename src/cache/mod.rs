//! 扇区缓存模块
//!
//! 固定容量的 512 字节扇区写回缓存，被所有设备（包括分区）共享。
//!
//! # 主要组件
//!
//! - [`CacheBuffer`] - 单个缓存块，包含数据和元数据
//! - [`BufferCache`] - 缓存管理器，`lru` crate 维护全部槽位的 LRU 顺序
//! - [`BufHandle`] - `get` 返回的块句柄
//! - [`Block`] - RAII 风格的块访问
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 约定
//!
//! - 每个 `get` 必须对应一个 `release`（或使用 [`Block`]）
//! - 被引用的块永远不会被驱逐
//! - 修改内容后调用 `mark_dirty`，`sync` 作为持久化屏障
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use blkcore::cache::{Block, BufferCache};
//!
//! let cache = BufferCache::new(DEFAULT_CACHE_SIZE)?;
//!
//! let block = Block::get(&cache, &sda, 100)?;
//! block.with_data_mut(|data| data[0] = 42)?;
//! drop(block);
//!
//! cache.sync()?;
//! let stats = cache.stats();
//! log::info!("{} hits, {} misses, {} dirty", stats.hits, stats.misses, stats.dirty_blocks);
//! ```
//!
//! # 内存分配要求
//!
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。

mod buffer;
mod buffer_cache;
mod handle;

pub use buffer::{BufHandle, BufferId, CacheBuffer, CacheFlags};
pub use buffer_cache::{BufferCache, CacheConfig, CacheStats};
pub use handle::Block;
