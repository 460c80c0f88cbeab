//! 块设备核心类型

use crate::consts::{DEVICE_NAME_MAX, SECTOR_SIZE};
use crate::error::{Error, ErrorKind, Result};
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, Ordering};

/// 块设备接口
///
/// 实现此 trait 以提供底层扇区访问。物理驱动和分区都通过它暴露读写能力。
///
/// 与驱动内部可变状态相关的同步由实现者负责；需要 `&mut self` 的驱动
/// 可以实现 [`RawBlockDevice`](super::RawBlockDevice) 并用
/// [`LockedDevice`](super::LockedDevice) 包装。
///
/// # 示例
///
/// ```rust,ignore
/// use blkcore::{BlockDevice, Result};
///
/// struct MyDisk {
///     // ...
/// }
///
/// impl BlockDevice for MyDisk {
///     fn total_sectors(&self) -> u64 {
///         2048
///     }
///
///     fn read_blocks(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         // 实现扇区读取
///         Ok(count as usize * 512)
///     }
///
///     fn write_blocks(&self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
///         // 实现扇区写入
///         Ok(count as usize * 512)
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 物理扇区大小（通常 512）
    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// 总扇区数（未知时为 0）
    fn total_sectors(&self) -> u64;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址（以扇区为单位）
    /// * `count` - 要读取的扇区数
    /// * `buf` - 目标缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际读取的字节数
    fn read_blocks(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址（以扇区为单位）
    /// * `count` - 要写入的扇区数
    /// * `buf` - 源缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际写入的字节数
    fn write_blocks(&self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 刷新设备写缓存
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// 设备标识，用于缓存块标记归属
///
/// 由单调递增的原子计数器分配，这是本 crate 唯一的全局状态。计数器不保存
/// 任何设备，设备表仍由调用者持有；它只保证不同设备表中的同名设备
/// 共享同一个 [`BufferCache`](crate::cache::BufferCache) 时不会混淆。
/// 标识从不复用，u64 计数器实际上不会回绕。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// 原始数值
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 分区范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// 分区号（从 1 开始）
    pub index: u32,
    /// 在父设备上的起始 LBA
    pub start: u64,
    /// 分区扇区数
    pub size: u64,
}

/// 块设备
///
/// 对应设备表中的一项：名称、扇区几何、读写能力和（分区时的）父设备范围。
///
/// 设备通过 `Arc<Device>` 共享：设备表、分区的父引用和缓存块都持有同一个实例。
pub struct Device {
    id: DeviceId,
    name: String,
    sector_size: u32,
    sector_count: u64,
    ops: Option<Arc<dyn BlockDevice>>,
    partition: Option<PartitionInfo>,
    parent: Option<Weak<Device>>,
    /// 逻辑读取次数
    read_count: AtomicU64,
    /// 逻辑写入次数
    write_count: AtomicU64,
}

impl Device {
    /// 创建物理设备
    ///
    /// 扇区大小和扇区数取自 `ops`。
    pub fn new(name: &str, ops: Arc<dyn BlockDevice>) -> Result<Self> {
        validate_name(name)?;
        let sector_size = ops.sector_size();
        if sector_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Sector size must be non-zero"));
        }
        let sector_count = ops.total_sectors();
        Ok(Self::build(String::from(name), sector_size, sector_count, Some(ops), None, None))
    }

    /// 创建没有读写能力的设备占位（驱动尚未就绪）
    ///
    /// 所有读写都会失败。
    pub fn detached(name: &str, sector_size: u32, sector_count: u64) -> Result<Self> {
        validate_name(name)?;
        Ok(Self::build(String::from(name), sector_size, sector_count, None, None, None))
    }

    /// 创建分区设备
    ///
    /// 名称为父设备名加上十进制分区号（1-2 位），扇区大小继承父设备，
    /// 读写能力为 [`PartitionDev`] 地址转换。
    pub fn partition(parent: &Arc<Device>, index: u32, start: u64, size: u64) -> Result<Self> {
        if index == 0 || index > 99 {
            return Err(Error::new(ErrorKind::InvalidInput, "Partition number must be 1-99"));
        }
        if start.checked_add(size).is_none() {
            return Err(Error::new(ErrorKind::InvalidInput, "Partition range overflows"));
        }

        let name = partition_name(parent.name(), index);
        let info = PartitionInfo { index, start, size };
        let ops: Arc<dyn BlockDevice> = Arc::new(PartitionDev {
            parent: Arc::downgrade(parent),
            sector_size: parent.sector_size(),
            start,
            size,
        });

        Ok(Self::build(
            name,
            parent.sector_size(),
            size,
            Some(ops),
            Some(info),
            Some(Arc::downgrade(parent)),
        ))
    }

    fn build(
        name: String,
        sector_size: u32,
        sector_count: u64,
        ops: Option<Arc<dyn BlockDevice>>,
        partition: Option<PartitionInfo>,
        parent: Option<Weak<Device>>,
    ) -> Self {
        Self {
            id: DeviceId::next(),
            name,
            sector_size,
            sector_count,
            ops,
            partition,
            parent,
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
        }
    }

    /// 设备标识
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// 设备名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 扇区大小
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// 总扇区数
    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    /// 是否具有读写能力
    pub fn has_ops(&self) -> bool {
        self.ops.is_some()
    }

    /// 是否是分区
    pub fn is_partition(&self) -> bool {
        self.partition.is_some()
    }

    /// 分区信息（整盘设备为 None）
    pub fn partition_info(&self) -> Option<PartitionInfo> {
        self.partition
    }

    /// 分区号（整盘设备为 None）
    pub fn partition_index(&self) -> Option<u32> {
        self.partition.map(|p| p.index)
    }

    /// 分区在父设备上的起始 LBA
    pub fn partition_start(&self) -> Option<u64> {
        self.partition.map(|p| p.start)
    }

    /// 分区扇区数
    pub fn partition_size(&self) -> Option<u64> {
        self.partition.map(|p| p.size)
    }

    /// 父设备（父设备已释放时为 None）
    pub fn parent(&self) -> Option<Arc<Device>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// 逻辑读取次数
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// 逻辑写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// 读取扇区
    ///
    /// 委托给设备的读写能力；能力缺失时失败。
    pub fn read(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<()> {
        self.check_buffer(count, buf.len())?;
        let ops = self.ops.as_ref().ok_or(Error::new(
            ErrorKind::NotFound,
            "Device has no read capability",
        ))?;
        self.read_count.fetch_add(1, Ordering::Relaxed);
        ops.read_blocks(lba, count, buf)?;
        Ok(())
    }

    /// 写入扇区
    pub fn write(&self, lba: u64, count: u32, buf: &[u8]) -> Result<()> {
        self.check_buffer(count, buf.len())?;
        let ops = self.ops.as_ref().ok_or(Error::new(
            ErrorKind::NotFound,
            "Device has no write capability",
        ))?;
        self.write_count.fetch_add(1, Ordering::Relaxed);
        ops.write_blocks(lba, count, buf)?;
        Ok(())
    }

    /// 刷新设备
    pub fn flush(&self) -> Result<()> {
        match &self.ops {
            Some(ops) => ops.flush(),
            None => Err(Error::new(ErrorKind::NotFound, "Device has no capability")),
        }
    }

    fn check_buffer(&self, count: u32, len: usize) -> Result<()> {
        let required = count as usize * self.sector_size as usize;
        if len < required {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer too small for requested sectors",
            ));
        }
        Ok(())
    }
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sector_size", &self.sector_size)
            .field("sector_count", &self.sector_count)
            .field("has_ops", &self.ops.is_some())
            .field("partition", &self.partition)
            .finish()
    }
}

/// 分区地址转换能力
///
/// 把分区内的 `lba` 转换为父设备上的 `start + lba`。越界访问直接拒绝，不做截断。
pub struct PartitionDev {
    parent: Weak<Device>,
    sector_size: u32,
    start: u64,
    size: u64,
}

impl PartitionDev {
    fn translate(&self, lba: u64, count: u32) -> Result<(Arc<Device>, u64)> {
        let parent = self.parent.upgrade().ok_or(Error::new(
            ErrorKind::NotFound,
            "Partition has no parent device",
        ))?;
        let end = lba.checked_add(count as u64).ok_or(Error::new(
            ErrorKind::InvalidInput,
            "Partition access overflows",
        ))?;
        if end > self.size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Access beyond end of partition",
            ));
        }
        let plba = self.start.checked_add(lba).ok_or(Error::new(
            ErrorKind::InvalidInput,
            "Partition access overflows",
        ))?;
        Ok((parent, plba))
    }
}

impl BlockDevice for PartitionDev {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn total_sectors(&self) -> u64 {
        self.size
    }

    fn read_blocks(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let (parent, plba) = self.translate(lba, count)?;
        parent.read(plba, count, buf)?;
        Ok(count as usize * self.sector_size as usize)
    }

    fn write_blocks(&self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        let (parent, plba) = self.translate(lba, count)?;
        parent.write(plba, count, buf)?;
        Ok(count as usize * self.sector_size as usize)
    }

    fn flush(&self) -> Result<()> {
        match self.parent.upgrade() {
            Some(parent) => parent.flush(),
            None => Err(Error::new(ErrorKind::NotFound, "Partition has no parent device")),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= DEVICE_NAME_MAX {
        return Err(Error::new(ErrorKind::InvalidInput, "Device name length out of range"));
    }
    Ok(())
}

/// 分区名：父设备名（最多 28 字节）+ 分区号
fn partition_name(parent: &str, index: u32) -> String {
    use crate::consts::PARTITION_PARENT_NAME_MAX;
    use core::fmt::Write;

    let mut cut = parent.len().min(PARTITION_PARENT_NAME_MAX);
    while !parent.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut name = String::from(&parent[..cut]);
    // 写入 String 不会失败
    let _ = write!(name, "{}", index);
    name
}
