//! 测试用内存盘
//!
//! 存储通过 `Arc` 共享：克隆出的 `RamDisk` 看到同一块数据，
//! 用新的缓存和 journal 实例重新挂载同一个 `RamDisk` 即可模拟重启。

use crate::block::{BlockDevice, Device};
use crate::consts::SECTOR_BYTES;
use crate::error::{Error, ErrorKind, Result};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

struct RamDiskInner {
    data: Vec<u8>,
    sectors: u64,
    reads: u64,
    writes: u64,
    /// 冻结后写入被静默丢弃（模拟掉电）
    frozen: bool,
    fail_read_lba: Option<u64>,
    fail_write_lba: Option<u64>,
}

/// 内存块设备
#[derive(Clone)]
pub struct RamDisk {
    inner: Arc<Mutex<RamDiskInner>>,
}

impl RamDisk {
    pub fn new(sectors: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RamDiskInner {
                data: alloc::vec![0u8; sectors as usize * SECTOR_BYTES],
                sectors,
                reads: 0,
                writes: 0,
                frozen: false,
                fail_read_lba: None,
                fail_write_lba: None,
            })),
        }
    }

    pub fn sector(&self, lba: u64) -> Vec<u8> {
        let inner = self.inner.lock();
        let start = lba as usize * SECTOR_BYTES;
        inner.data[start..start + SECTOR_BYTES].to_vec()
    }

    pub fn set_sector(&self, lba: u64, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        let start = lba as usize * SECTOR_BYTES;
        let len = bytes.len().min(SECTOR_BYTES);
        inner.data[start..start + SECTOR_BYTES].fill(0);
        inner.data[start..start + len].copy_from_slice(&bytes[..len]);
    }

    pub fn flip_bit(&self, lba: u64, byte: usize, bit: u8) {
        let mut inner = self.inner.lock();
        inner.data[lba as usize * SECTOR_BYTES + byte] ^= 1 << bit;
    }

    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }

    pub fn reads(&self) -> u64 {
        self.inner.lock().reads
    }

    pub fn freeze(&self) {
        self.inner.lock().frozen = true;
    }

    pub fn fail_reads_at(&self, lba: Option<u64>) {
        self.inner.lock().fail_read_lba = lba;
    }

    pub fn fail_writes_at(&self, lba: Option<u64>) {
        self.inner.lock().fail_write_lba = lba;
    }
}

impl BlockDevice for RamDisk {
    fn total_sectors(&self) -> u64 {
        self.inner.lock().sectors
    }

    fn read_blocks(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let end = lba + count as u64;
        if end > inner.sectors {
            return Err(Error::new(ErrorKind::Io, "read beyond end of disk"));
        }
        if inner.fail_read_lba.is_some_and(|bad| (lba..end).contains(&bad)) {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        let start = lba as usize * SECTOR_BYTES;
        let len = count as usize * SECTOR_BYTES;
        buf[..len].copy_from_slice(&inner.data[start..start + len]);
        inner.reads += 1;
        Ok(len)
    }

    fn write_blocks(&self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let end = lba + count as u64;
        if end > inner.sectors {
            return Err(Error::new(ErrorKind::Io, "write beyond end of disk"));
        }
        if inner.fail_write_lba.is_some_and(|bad| (lba..end).contains(&bad)) {
            return Err(Error::new(ErrorKind::Io, "injected write failure"));
        }
        let len = count as usize * SECTOR_BYTES;
        inner.writes += 1;
        if !inner.frozen {
            let start = lba as usize * SECTOR_BYTES;
            inner.data[start..start + len].copy_from_slice(&buf[..len]);
        }
        Ok(len)
    }
}

/// 创建以 `RamDisk` 为后端的设备，同时返回磁盘句柄用于检查内容
pub fn ram_device(name: &str, sectors: u64) -> (Device, RamDisk) {
    let disk = RamDisk::new(sectors);
    let dev = Device::new(name, Arc::new(disk.clone())).expect("valid test device");
    (dev, disk)
}

/// 同上，返回共享设备
pub fn shared_ram_device(name: &str, sectors: u64) -> (Arc<Device>, RamDisk) {
    let (dev, disk) = ram_device(name, sectors);
    (Arc::new(dev), disk)
}
