//! 块设备表
//!
//! 设备表由子系统初始化代码持有，通过引用传给调用者；没有进程级全局状态。

use super::Device;
use crate::consts::MAX_BLOCK_DEVICES;
use crate::error::{Error, ErrorKind, Result};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 块设备表
///
/// 固定容量，满时注册失败。按名称查找为线性精确匹配。
pub struct DeviceRegistry {
    slots: Vec<Option<Arc<Device>>>,
    count: usize,
}

impl DeviceRegistry {
    /// 创建默认容量（[`MAX_BLOCK_DEVICES`]）的设备表
    pub fn new() -> Self {
        Self::with_capacity(MAX_BLOCK_DEVICES)
    }

    /// 创建指定容量的设备表
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, count: 0 }
    }

    /// 注册设备
    ///
    /// # 返回
    ///
    /// 成功返回设备表下标
    ///
    /// # 错误
    ///
    /// - `NoSpace`: 设备表已满
    /// - `AlreadyExists`: 同名设备已注册
    pub fn register(&mut self, dev: Arc<Device>) -> Result<usize> {
        if self.find_by_name(dev.name()).is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists, "Device name already registered"));
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::new(ErrorKind::NoSpace, "Device table is full"))?;

        log::info!("[BLOCK] Registered '{}' at slot {}", dev.name(), slot);
        self.slots[slot] = Some(dev);
        self.count += 1;
        Ok(slot)
    }

    /// 按名称注销设备
    ///
    /// 已持有该设备 `Arc` 的调用者不受影响；其分区的父引用在最后一个 `Arc` 释放后失效。
    pub fn unregister(&mut self, name: &str) -> Option<Arc<Device>> {
        let slot = self
            .slots
            .iter()
            .position(|d| d.as_ref().is_some_and(|d| d.name() == name))?;
        self.count -= 1;
        log::info!("[BLOCK] Unregistered '{}'", name);
        self.slots[slot].take()
    }

    /// 按名称查找设备
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Device>> {
        self.slots
            .iter()
            .flatten()
            .find(|d| d.name() == name)
            .cloned()
    }

    /// 按下标获取设备
    pub fn get(&self, index: usize) -> Option<Arc<Device>> {
        self.slots.get(index).and_then(|d| d.clone())
    }

    /// 已注册设备数量
    pub fn count(&self) -> usize {
        self.count
    }

    /// 设备表容量
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 遍历已注册设备
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.slots.iter().flatten()
    }

    /// 创建并注册分区设备
    ///
    /// # 参数
    ///
    /// * `parent` - 父设备
    /// * `index` - 分区号（1-99），用于生成名称，如 `sda` + 1 = `sda1`
    /// * `start_lba` - 父设备上的起始扇区
    /// * `size` - 分区扇区数
    ///
    /// # 错误
    ///
    /// 设备表没有空位时返回 `NoSpace`，此时不会留下任何设备
    pub fn create_partition(
        &mut self,
        parent: &Arc<Device>,
        index: u32,
        start_lba: u64,
        size: u64,
    ) -> Result<Arc<Device>> {
        let part = Arc::new(Device::partition(parent, index, start_lba, size)?);
        self.register(part.clone())?;

        let sector_size = part.sector_size() as u64;
        log::info!(
            "[BLOCK] Partition '{}': LBA {} - {} ({} sectors, {} MB)",
            part.name(),
            start_lba,
            start_lba.saturating_add(size).saturating_sub(1),
            size,
            size.saturating_mul(sector_size) / (1024 * 1024)
        );
        Ok(part)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter().map(|d| d.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ram_device;

    #[test]
    fn test_register_and_find() {
        let mut reg = DeviceRegistry::new();
        let (dev, _disk) = ram_device("sda", 16);
        let idx = reg.register(Arc::new(dev)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(reg.count(), 1);
        assert!(reg.find_by_name("sda").is_some());
        assert!(reg.find_by_name("sd").is_none());
        assert!(reg.find_by_name("sdab").is_none());
        assert_eq!(reg.get(0).unwrap().name(), "sda");
    }

    #[test]
    fn test_register_full() {
        let mut reg = DeviceRegistry::with_capacity(2);
        for name in ["sda", "sdb"] {
            let (dev, _) = ram_device(name, 8);
            reg.register(Arc::new(dev)).unwrap();
        }
        let (dev, _) = ram_device("sdc", 8);
        assert_eq!(reg.register(Arc::new(dev)).unwrap_err().kind(), ErrorKind::NoSpace);
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_duplicate_name() {
        let mut reg = DeviceRegistry::new();
        let (a, _) = ram_device("sda", 8);
        let (b, _) = ram_device("sda", 8);
        reg.register(Arc::new(a)).unwrap();
        assert_eq!(reg.register(Arc::new(b)).unwrap_err().kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_unregister_frees_slot() {
        let mut reg = DeviceRegistry::with_capacity(1);
        let (a, _) = ram_device("sda", 8);
        reg.register(Arc::new(a)).unwrap();
        assert!(reg.unregister("sda").is_some());
        assert_eq!(reg.count(), 0);
        let (b, _) = ram_device("sdb", 8);
        assert_eq!(reg.register(Arc::new(b)).unwrap(), 0);
    }

    #[test]
    fn test_create_partition() {
        let mut reg = DeviceRegistry::new();
        let (dev, disk) = ram_device("sda", 512);
        let dev = Arc::new(dev);
        reg.register(dev.clone()).unwrap();

        let part = reg.create_partition(&dev, 1, 200, 100).unwrap();
        assert_eq!(part.name(), "sda1");
        assert_eq!(reg.count(), 2);
        assert!(Arc::ptr_eq(&reg.find_by_name("sda1").unwrap(), &part));

        let data = [0x11u8; 512];
        part.write(5, 1, &data).unwrap();
        assert_eq!(disk.sector(205), data.to_vec());
    }

    #[test]
    fn test_create_partition_rejects_overflowing_range() {
        let mut reg = DeviceRegistry::new();
        let (dev, _) = ram_device("sda", 64);
        let dev = Arc::new(dev);
        reg.register(dev.clone()).unwrap();

        let err = reg.create_partition(&dev, 1, 1, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_create_partition_table_full() {
        let mut reg = DeviceRegistry::with_capacity(1);
        let (dev, _) = ram_device("sda", 64);
        let dev = Arc::new(dev);
        reg.register(dev.clone()).unwrap();
        assert!(reg.create_partition(&dev, 1, 0, 8).is_err());
        assert!(reg.find_by_name("sda1").is_none());
    }
}
