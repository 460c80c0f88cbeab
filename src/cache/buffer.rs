//! 缓存块结构

use crate::block::{Device, DeviceId};
use crate::consts::SECTOR_BYTES;
use alloc::sync::Arc;
use bitflags::bitflags;

/// 缓存块 ID（缓存池中的槽位下标）
pub type BufferId = usize;

bitflags! {
    /// 缓存块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 数据有效（已从设备读入）
        const VALID = 0x01;
        /// 数据已修改（内存内容是权威版本）
        const DIRTY = 0x02;
    }
}

/// 缓存块句柄
///
/// `BufferCache::get` 返回的凭证，携带槽位和 (设备, LBA) 标记。
/// 只要引用计数不为 0，槽位就不会被挪作他用，句柄一直有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufHandle {
    pub(super) id: BufferId,
    pub(super) device: DeviceId,
    pub(super) lba: u64,
}

impl BufHandle {
    /// 缓存块 ID（同一缓存块的多次 get 返回相同 ID）
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// 所属设备
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// 扇区号
    pub fn lba(&self) -> u64 {
        self.lba
    }
}

/// 缓存块
///
/// 固定 512 字节数据，标记为 (设备, LBA)。
///
/// # 字段说明
///
/// - `device`: 所属设备（尚未使用的槽位为 None）
/// - `lba`: 扇区号
/// - `data`: 扇区数据
/// - `refcount`: 引用计数，> 0 时不能被驱逐
/// - `flags`: 块状态标志
pub struct CacheBuffer {
    /// 所属设备
    pub device: Option<Arc<Device>>,

    /// 扇区号
    pub lba: u64,

    /// 扇区数据
    pub data: [u8; SECTOR_BYTES],

    /// 引用计数
    pub refcount: u32,

    /// 块状态标志
    pub flags: CacheFlags,
}

impl core::fmt::Debug for CacheBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheBuffer")
            .field("device", &self.device.as_ref().map(|d| d.name()))
            .field("lba", &self.lba)
            .field("refcount", &self.refcount)
            .field("flags", &self.flags)
            .finish()
    }
}

impl CacheBuffer {
    /// 创建空槽位
    pub fn empty() -> Self {
        Self {
            device: None,
            lba: 0,
            data: [0u8; SECTOR_BYTES],
            refcount: 0,
            flags: CacheFlags::empty(),
        }
    }

    /// 是否标记为 (dev, lba)
    pub fn matches(&self, dev: DeviceId, lba: u64) -> bool {
        self.lba == lba && self.device.as_ref().is_some_and(|d| d.id() == dev)
    }

    /// 增加引用计数
    pub fn get(&mut self) {
        self.refcount = self.refcount.saturating_add(1);
    }

    /// 减少引用计数（不会低于 0）
    pub fn put(&mut self) {
        self.refcount = self.refcount.saturating_sub(1);
    }

    /// 检查是否正在被引用
    pub fn is_referenced(&self) -> bool {
        self.refcount > 0
    }

    /// 标记为脏（已修改）
    pub fn mark_dirty(&mut self) {
        self.flags.insert(CacheFlags::DIRTY);
    }

    /// 标记为干净（已写入磁盘）
    pub fn mark_clean(&mut self) {
        self.flags.remove(CacheFlags::DIRTY);
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 检查数据是否有效
    pub fn is_valid(&self) -> bool {
        self.flags.contains(CacheFlags::VALID)
    }

    /// 改为标记 (dev, lba)：清空标志，引用计数置 1
    pub(super) fn repurpose(&mut self, dev: &Arc<Device>, lba: u64) {
        self.device = Some(dev.clone());
        self.lba = lba;
        self.flags = CacheFlags::empty();
        self.refcount = 1;
    }
}
