//! 驱动并发锁适配
//!
//! 物理驱动通常需要独占访问（`&mut self`）。[`LockedDevice`] 用自旋锁
//! 把这类驱动包装成可共享的 [`BlockDevice`]。

use super::BlockDevice;
use crate::consts::SECTOR_SIZE;
use crate::error::Result;
use spin::Mutex;

/// 需要独占访问的原始驱动接口
///
/// 对应磁盘控制器驱动暴露的扇区读写能力。
pub trait RawBlockDevice: Send {
    /// 物理扇区大小（通常 512）
    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// 总扇区数
    fn total_sectors(&self) -> u64;

    /// 读取扇区，返回读取的字节数
    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 写入扇区，返回写入的字节数
    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 刷新驱动写缓存
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 带锁的驱动包装
///
/// 每次读写在锁内完成，锁在返回前释放。
///
/// # 示例
///
/// ```rust,ignore
/// let ops = Arc::new(LockedDevice::new(ahci_port));
/// let sda = Arc::new(Device::new("sda", ops)?);
/// ```
pub struct LockedDevice<D: RawBlockDevice> {
    inner: Mutex<D>,
    sector_size: u32,
    total_sectors: u64,
}

impl<D: RawBlockDevice> LockedDevice<D> {
    /// 包装驱动
    pub fn new(driver: D) -> Self {
        let sector_size = driver.sector_size();
        let total_sectors = driver.total_sectors();
        Self {
            inner: Mutex::new(driver),
            sector_size,
            total_sectors,
        }
    }

    /// 在锁内访问驱动
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<D: RawBlockDevice> BlockDevice for LockedDevice<D> {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn read_blocks(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        self.inner.lock().read_sectors(lba, count, buf)
    }

    fn write_blocks(&self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        self.inner.lock().write_sectors(lba, count, buf)
    }

    fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Device;
    use crate::error::{Error, ErrorKind};
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    struct VecDriver {
        storage: Vec<u8>,
        writes: u32,
    }

    impl RawBlockDevice for VecDriver {
        fn total_sectors(&self) -> u64 {
            (self.storage.len() / 512) as u64
        }

        fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
            let start = lba as usize * 512;
            let len = count as usize * 512;
            if start + len > self.storage.len() {
                return Err(Error::new(ErrorKind::Io, "out of range"));
            }
            buf[..len].copy_from_slice(&self.storage[start..start + len]);
            Ok(len)
        }

        fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
            let start = lba as usize * 512;
            let len = count as usize * 512;
            if start + len > self.storage.len() {
                return Err(Error::new(ErrorKind::Io, "out of range"));
            }
            self.storage[start..start + len].copy_from_slice(&buf[..len]);
            self.writes += 1;
            Ok(len)
        }
    }

    #[test]
    fn test_locked_device_roundtrip() {
        let locked = Arc::new(LockedDevice::new(VecDriver {
            storage: alloc::vec![0u8; 512 * 8],
            writes: 0,
        }));
        let dev = Device::new("sda", locked.clone()).unwrap();
        assert_eq!(dev.sector_count(), 8);

        dev.write(3, 1, &[7u8; 512]).unwrap();
        let mut buf = [0u8; 512];
        dev.read(3, 1, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 512]);
        assert_eq!(locked.with_driver(|d| d.writes), 1);

        assert_eq!(dev.read(8, 1, &mut buf).unwrap_err().kind(), ErrorKind::Io);
    }
}
