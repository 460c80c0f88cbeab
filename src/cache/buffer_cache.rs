//! 扇区缓存实现
//!
//! 固定容量的 LRU 写回缓存，所有设备和分区共享同一个缓存池。
//!
//! # 结构
//!
//! ```text
//! struct CacheInner {
//!     buffers: Vec<CacheBuffer>,              // 固定槽位，下标即 BufferId
//!     lru: LruCache<BufferId, ()>,            // 全部槽位的 MRU..LRU 顺序
//!     index: BTreeMap<(DeviceId, u64), BufferId>, // 有效块的查找索引
//!     stats: CacheStats,
//! }
//! ```
//!
//! 每个槽位在任何时刻都恰好占据 LRU 链表中的一个位置（被引用时也一样），
//! 驱逐只在链表中从 LRU 端向 MRU 端寻找第一个引用计数为 0 的块。
//!
//! 整个缓存由一把自旋锁保护，查找或驱逐是单个临界区。

use super::buffer::{BufHandle, BufferId, CacheBuffer, CacheFlags};
use crate::{
    block::{Device, DeviceId},
    consts::{DEFAULT_CACHE_SIZE, SECTOR_BYTES},
    error::{Error, ErrorKind, Result},
};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;
use spin::Mutex;

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓存块数量（构造后固定）
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_SIZE,
        }
    }
}

/// 缓存统计信息
///
/// 计数器单调递增，没有重置操作，仅用于诊断。
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 脏块写回次数
    pub writebacks: u64,
    /// 有效块被驱逐的次数
    pub evictions: u64,
    /// 写回失败次数
    pub write_errors: u64,
    /// 当前脏块数量
    pub dirty_blocks: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    buffers: Vec<CacheBuffer>,
    lru: LruCache<BufferId, ()>,
    index: BTreeMap<(DeviceId, u64), BufferId>,
    stats: CacheStats,
}

impl CacheInner {
    /// 校验句柄仍指向被引用的同一块
    fn resolve(&self, handle: BufHandle) -> Result<BufferId> {
        match self.buffers.get(handle.id) {
            Some(buf) if buf.is_referenced() && buf.matches(handle.device, handle.lba) => {
                Ok(handle.id)
            }
            _ => Err(Error::new(ErrorKind::InvalidState, "Stale buffer handle")),
        }
    }

    /// 把脏块写回其当前 (设备, LBA)，成功后清除 DIRTY
    fn write_back(&mut self, id: BufferId) -> Result<()> {
        let buf = &mut self.buffers[id];
        if !buf.is_dirty() {
            return Ok(());
        }
        let Some(dev) = buf.device.clone() else {
            buf.mark_clean();
            return Ok(());
        };

        match dev.write(buf.lba, 1, &buf.data) {
            Ok(()) => {
                buf.mark_clean();
                self.stats.writebacks += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("[BCACHE] Write error: dev={} lba={}", dev.name(), buf.lba);
                self.stats.write_errors += 1;
                Err(e)
            }
        }
    }

    fn dirty_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_dirty()).count()
    }
}

/// 扇区缓存
///
/// # 使用示例
///
/// ```rust,ignore
/// let cache = BufferCache::new(128)?;
///
/// let h = cache.get(&sda, 100)?;
/// cache.with_data_mut(h, |data| data[0] = 0x42)?;
/// cache.mark_dirty(h)?;
/// cache.release(h);
///
/// // 持久化屏障
/// cache.sync()?;
/// ```
pub struct BufferCache {
    inner: Mutex<CacheInner>,
}

impl BufferCache {
    /// 创建新的缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存块数量，必须大于 0
    pub fn new(capacity: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or(Error::new(
            ErrorKind::InvalidInput,
            "Cache capacity must be non-zero",
        ))?;

        let mut buffers = Vec::with_capacity(capacity);
        buffers.resize_with(capacity, CacheBuffer::empty);

        // 依次插入 MRU 端，槽位 0 最终位于 LRU 端
        let mut lru = LruCache::new(cap);
        for id in 0..capacity {
            lru.put(id, ());
        }

        log::info!(
            "[BCACHE] Initialized ({} blocks, {} KB)",
            capacity,
            capacity * SECTOR_BYTES / 1024
        );

        Ok(Self {
            inner: Mutex::new(CacheInner {
                buffers,
                lru,
                index: BTreeMap::new(),
                stats: CacheStats::default(),
            }),
        })
    }

    /// 按配置创建缓存
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        Self::new(config.capacity)
    }

    /// 获取缓存块
    ///
    /// 命中时增加引用计数并移到 MRU；未命中时从 LRU 端选择第一个未被引用的块，
    /// 脏块先同步写回，再改为标记 (dev, lba) 并从设备读入。
    ///
    /// # 错误
    ///
    /// - `Io`: 读取失败（块的引用计数恢复为 0），或驱逐时写回失败
    /// - `NoSpace`: 所有块都被引用，缓存耗尽。缓存不会等待块被释放，
    ///   并发调用者长期持有块会导致耗尽，必须由调用者处理
    pub fn get(&self, dev: &Arc<Device>, lba: u64) -> Result<BufHandle> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let handle = BufHandle {
            id: 0,
            device: dev.id(),
            lba,
        };

        if let Some(&id) = inner.index.get(&(dev.id(), lba)) {
            let buf = &mut inner.buffers[id];
            if buf.is_valid() {
                buf.get();
                inner.lru.promote(&id);
                inner.stats.hits += 1;
                log::trace!("[BCACHE] get dev={} lba={} HIT (ref={})", dev.name(), lba, buf.refcount);
                return Ok(BufHandle { id, ..handle });
            }
        }

        inner.stats.misses += 1;

        let victim = {
            let buffers = &inner.buffers;
            inner
                .lru
                .iter()
                .rev()
                .map(|(id, _)| *id)
                .find(|id| !buffers[*id].is_referenced())
        };
        let Some(id) = victim else {
            log::error!(
                "[BCACHE] No free buffers: all {} blocks are referenced",
                inner.buffers.len()
            );
            return Err(Error::new(
                ErrorKind::NoSpace,
                "Buffer cache exhausted, all blocks are referenced",
            ));
        };

        if inner.buffers[id].is_dirty() {
            inner.write_back(id)?;
        }

        let old_key = inner.buffers[id]
            .device
            .as_ref()
            .map(|d| (d.id(), inner.buffers[id].lba));
        if let Some(key) = old_key {
            if inner.index.get(&key) == Some(&id) {
                inner.index.remove(&key);
                inner.stats.evictions += 1;
                log::debug!("[BCACHE] Evicted slot {} (lba={})", id, key.1);
            }
        }

        let buf = &mut inner.buffers[id];
        buf.repurpose(dev, lba);
        if let Err(e) = dev.read(lba, 1, &mut buf.data) {
            log::error!("[BCACHE] Read error: dev={} lba={}", dev.name(), lba);
            buf.refcount = 0;
            return Err(e);
        }
        buf.flags = CacheFlags::VALID;

        inner.index.insert((dev.id(), lba), id);
        inner.lru.promote(&id);
        log::debug!("[BCACHE] get dev={} lba={} MISS -> slot {}", dev.name(), lba, id);

        Ok(BufHandle { id, ..handle })
    }

    /// 释放缓存块（引用计数减 1，不会低于 0）
    pub fn release(&self, handle: BufHandle) {
        let mut inner = self.inner.lock();
        match inner.buffers.get_mut(handle.id) {
            Some(buf) if buf.matches(handle.device, handle.lba) => buf.put(),
            _ => log::warn!("[BCACHE] release of stale handle (slot {})", handle.id),
        }
    }

    /// 标记为脏
    ///
    /// 内容保留在缓存中，直到显式写回或被驱逐。
    pub fn mark_dirty(&self, handle: BufHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(handle)?;
        inner.buffers[id].mark_dirty();
        Ok(())
    }

    /// 立即写回单个块
    ///
    /// 只有脏块会产生设备写入；写入成功才清除 DIRTY。
    pub fn write(&self, handle: BufHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(handle)?;
        inner.write_back(id)
    }

    /// 写回所有脏块
    ///
    /// 单块失败不会中断其余块的写回；有任何失败时返回第一个错误。
    ///
    /// # 返回
    ///
    /// 成功写回的块数量
    pub fn sync(&self) -> Result<usize> {
        self.sync_filtered(|_| true)
    }

    /// 只写回指定设备的脏块
    pub fn sync_device(&self, dev: &Device) -> Result<usize> {
        let target = dev.id();
        self.sync_filtered(|buf| buf.device.as_ref().is_some_and(|d| d.id() == target))
    }

    fn sync_filtered(&self, filter: impl Fn(&CacheBuffer) -> bool) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut flushed = 0;
        let mut first_err = None;

        for id in 0..inner.buffers.len() {
            if !inner.buffers[id].is_dirty() || !filter(&inner.buffers[id]) {
                continue;
            }
            match inner.write_back(id) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        if flushed > 0 {
            log::debug!("[BCACHE] Synced {} dirty block(s)", flushed);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// 使设备的未引用块失效
    ///
    /// 脏块先写回；被引用的块保持不变。
    ///
    /// # 返回
    ///
    /// 失效的块数量
    pub fn invalidate_device(&self, dev: &Device) -> Result<usize> {
        let mut inner = self.inner.lock();
        let target = dev.id();
        let mut invalidated = 0;

        for id in 0..inner.buffers.len() {
            let buf = &inner.buffers[id];
            if buf.is_referenced() || !buf.device.as_ref().is_some_and(|d| d.id() == target) {
                continue;
            }
            inner.write_back(id)?;

            let lba = inner.buffers[id].lba;
            if inner.index.get(&(target, lba)) == Some(&id) {
                inner.index.remove(&(target, lba));
            }
            let buf = &mut inner.buffers[id];
            buf.device = None;
            buf.flags = CacheFlags::empty();
            invalidated += 1;
        }

        Ok(invalidated)
    }

    /// 只读访问块数据
    pub fn with_data<R>(&self, handle: BufHandle, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let inner = self.inner.lock();
        let id = inner.resolve(handle)?;
        Ok(f(&inner.buffers[id].data))
    }

    /// 可变访问块数据
    ///
    /// 不会自动标记为脏，修改后需调用 [`mark_dirty`](Self::mark_dirty)。
    pub fn with_data_mut<R>(&self, handle: BufHandle, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(handle)?;
        Ok(f(&mut inner.buffers[id].data))
    }

    /// 复制块数据到 `buf`（至少 512 字节）
    pub fn read_into(&self, handle: BufHandle, buf: &mut [u8]) -> Result<()> {
        if buf.len() < SECTOR_BYTES {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer smaller than a sector"));
        }
        self.with_data(handle, |data| buf[..SECTOR_BYTES].copy_from_slice(data))
    }

    /// 用 `buf` 覆盖块数据并标记为脏
    pub fn write_from(&self, handle: BufHandle, buf: &[u8]) -> Result<()> {
        if buf.len() < SECTOR_BYTES {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer smaller than a sector"));
        }
        let mut inner = self.inner.lock();
        let id = inner.resolve(handle)?;
        let cached = &mut inner.buffers[id];
        cached.data.copy_from_slice(&buf[..SECTOR_BYTES]);
        cached.mark_dirty();
        Ok(())
    }

    /// 查询块的引用计数（句柄失效时为 None）
    pub fn refcount(&self, handle: BufHandle) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .buffers
            .get(handle.id)
            .filter(|b| b.matches(handle.device, handle.lba))
            .map(|b| b.refcount)
    }

    /// 查询块是否为脏
    pub fn is_dirty(&self, handle: BufHandle) -> Option<bool> {
        let inner = self.inner.lock();
        inner
            .buffers
            .get(handle.id)
            .filter(|b| b.matches(handle.device, handle.lba))
            .map(|b| b.is_dirty())
    }

    /// (dev, lba) 是否有有效缓存（不影响 LRU 顺序和统计）
    pub fn contains(&self, dev: &Device, lba: u64) -> bool {
        let inner = self.inner.lock();
        inner
            .index
            .get(&(dev.id(), lba))
            .is_some_and(|&id| inner.buffers[id].is_valid())
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.dirty_blocks = inner.dirty_count();
        stats
    }

    /// 获取缓存容量
    pub fn capacity(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// 获取脏块数量
    pub fn dirty_count(&self) -> usize {
        self.inner.lock().dirty_count()
    }

    /// 当前 LRU 顺序（MRU 在前）
    #[cfg(test)]
    fn lru_order(&self) -> Vec<BufferId> {
        self.inner.lock().lru.iter().map(|(id, _)| *id).collect()
    }
}

impl core::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BufferCache")
            .field("capacity", &inner.buffers.len())
            .field("valid", &inner.index.len())
            .field("dirty_count", &inner.dirty_count())
            .field("stats", &inner.stats)
            .finish()
    }
}
