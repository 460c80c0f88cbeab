//! 块句柄 - RAII 风格的缓存块访问

use super::{BufHandle, BufferCache};
use crate::block::Device;
use crate::error::Result;
use alloc::sync::Arc;

/// 块句柄
///
/// 持有缓存块的一个引用，丢弃时自动 release。
///
/// - 获取时从缓存命中或从设备读入
/// - 持有期间缓存块不会被驱逐
/// - `with_data_mut` 修改后自动标记为脏
///
/// # 示例
///
/// ```rust,ignore
/// let block = Block::get(&cache, &sda, 0)?;
/// block.with_data(|data| {
///     log::info!("First byte: {:02x}", data[0]);
/// })?;
///
/// let block = Block::get(&cache, &sda, 1)?;
/// block.with_data_mut(|data| data[0] = 0x42)?;
/// // block 超出作用域时释放引用，脏块在 sync 或驱逐时写回
/// ```
pub struct Block<'a> {
    cache: &'a BufferCache,
    handle: BufHandle,
}

impl<'a> Block<'a> {
    /// 获取块（读取数据）
    pub fn get(cache: &'a BufferCache, dev: &Arc<Device>, lba: u64) -> Result<Self> {
        let handle = cache.get(dev, lba)?;
        Ok(Self { cache, handle })
    }

    /// 底层缓存句柄
    pub fn handle(&self) -> BufHandle {
        self.handle
    }

    /// 扇区号
    pub fn lba(&self) -> u64 {
        self.handle.lba()
    }

    /// 访问块数据（只读）
    pub fn with_data<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.cache.with_data(self.handle, f)
    }

    /// 访问块数据（可写），自动标记为脏
    pub fn with_data_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let result = self.cache.with_data_mut(self.handle, f)?;
        self.cache.mark_dirty(self.handle)?;
        Ok(result)
    }

    /// 标记为脏
    pub fn mark_dirty(&self) -> Result<()> {
        self.cache.mark_dirty(self.handle)
    }

    /// 立即写回（干净块无操作）
    pub fn write(&self) -> Result<()> {
        self.cache.write(self.handle)
    }

    /// 手动释放块（消费 self）
    ///
    /// 通常不需要手动调用，Drop 会自动处理。
    pub fn release(self) {}
}

impl Drop for Block<'_> {
    fn drop(&mut self) {
        self.cache.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::shared_ram_device;

    #[test]
    fn test_block_releases_on_drop() {
        let (dev, _disk) = shared_ram_device("sda", 32);
        let cache = BufferCache::new(4).unwrap();

        let handle = {
            let block = Block::get(&cache, &dev, 3).unwrap();
            assert_eq!(cache.refcount(block.handle()), Some(1));
            block.handle()
        };
        assert_eq!(cache.refcount(handle), Some(0));

        let block = Block::get(&cache, &dev, 3).unwrap();
        block.release();
        assert_eq!(cache.refcount(handle), Some(0));
    }

    #[test]
    fn test_block_modify_marks_dirty() {
        let (dev, disk) = shared_ram_device("sda", 32);
        let cache = BufferCache::new(4).unwrap();

        {
            let block = Block::get(&cache, &dev, 5).unwrap();
            block.with_data_mut(|data| {
                data[0] = 0x42;
                data[511] = 0x43;
            })
            .unwrap();
            assert_eq!(cache.is_dirty(block.handle()), Some(true));
        }
        assert_eq!(disk.sector(5)[0], 0);

        cache.sync().unwrap();
        let sector = disk.sector(5);
        assert_eq!(sector[0], 0x42);
        assert_eq!(sector[511], 0x43);
    }

    #[test]
    fn test_block_write_immediately() {
        let (dev, disk) = shared_ram_device("sda", 32);
        let cache = BufferCache::new(4).unwrap();

        let block = Block::get(&cache, &dev, 7).unwrap();
        block.with_data_mut(|data| data.fill(0xEE)).unwrap();
        block.write().unwrap();
        assert_eq!(disk.sector(7)[100], 0xEE);
        assert_eq!(block.lba(), 7);
        assert_eq!(cache.dirty_count(), 0);
    }
}
