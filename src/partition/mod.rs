//! 分区探测
//!
//! 先尝试 GPT，GPT 无效或没有分区时回退到 MBR。每个识别出的分区都通过
//! [`DeviceRegistry::create_partition`] 注册为子设备。
//!
//! 探测直接读设备，不经过扇区缓存。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! let sda = Arc::new(Device::new("sda", driver)?);
//! registry.register(sda.clone())?;
//!
//! let found = partition::probe(&mut registry, &sda);
//! let root = registry.find_by_name("sda1");
//! ```

pub mod gpt;
pub mod mbr;

use crate::block::{Device, DeviceRegistry};
use crate::consts::SECTOR_BYTES;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 识别出的分区表格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionScheme {
    /// GUID 分区表
    Gpt,
    /// 传统 MBR
    Mbr,
    /// 未识别
    None,
}

/// 已注册的分区
#[derive(Debug, Clone)]
pub struct ProbedPartition {
    /// 分区设备
    pub device: Arc<Device>,
    /// 分区号
    pub index: u32,
    /// 父设备上的起始扇区
    pub start: u64,
    /// 扇区数
    pub size: u64,
    /// GPT 分区名
    pub name: Option<String>,
    /// MBR 分区类型
    pub mbr_type: Option<u8>,
}

/// 探测结果
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// 使用的分区表格式
    pub scheme: PartitionScheme,
    /// 注册成功的分区
    pub partitions: Vec<ProbedPartition>,
    /// GPT 头和分区表 CRC 是否都正确（MBR 或无法校验时为 None）
    pub checksums_valid: Option<bool>,
}

impl ProbeReport {
    fn none() -> Self {
        Self {
            scheme: PartitionScheme::None,
            partitions: Vec::new(),
            checksums_valid: None,
        }
    }

    /// 分区数量
    pub fn count(&self) -> usize {
        self.partitions.len()
    }
}

/// 探测并注册分区
///
/// # 返回
///
/// 注册的分区数量，两种格式都未识别时为 0
pub fn probe(registry: &mut DeviceRegistry, dev: &Arc<Device>) -> usize {
    probe_report(registry, dev).count()
}

/// 探测并注册分区，返回完整结果
pub fn probe_report(registry: &mut DeviceRegistry, dev: &Arc<Device>) -> ProbeReport {
    let mut sector = [0u8; SECTOR_BYTES];

    if let Err(e) = dev.read(0, 1, &mut sector) {
        log::error!("[PARTITION] Failed to read LBA 0 of '{}': {}", dev.name(), e);
        return ProbeReport::none();
    }

    if let Some((partitions, checksums_valid)) = gpt::try_gpt(registry, dev, &mut sector) {
        if !partitions.is_empty() {
            log::info!("[PARTITION] Found {} GPT partition(s)", partitions.len());
            return ProbeReport {
                scheme: PartitionScheme::Gpt,
                partitions,
                checksums_valid,
            };
        }
    }

    // GPT 路径会覆盖扇区缓冲区
    if let Err(e) = dev.read(0, 1, &mut sector) {
        log::error!("[PARTITION] Failed to re-read LBA 0 of '{}': {}", dev.name(), e);
        return ProbeReport::none();
    }

    match mbr::try_mbr(registry, dev, &sector) {
        Some(partitions) if !partitions.is_empty() => {
            log::info!("[PARTITION] Found {} MBR partition(s)", partitions.len());
            ProbeReport {
                scheme: PartitionScheme::Mbr,
                partitions,
                checksums_valid: None,
            }
        }
        _ => {
            log::info!("[PARTITION] No partitions found on '{}'", dev.name());
            ProbeReport::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{crc32, crc32_zeroed_field};
    use crate::testing::{shared_ram_device, RamDisk};

    const TABLE_LBA: u64 = 2;

    fn gpt_entry(first: u64, last: u64, name: &str) -> [u8; 128] {
        let mut raw = [0u8; 128];
        raw[0..16].copy_from_slice(&[0xAF; 16]);
        raw[16] = 1;
        raw[32..40].copy_from_slice(&first.to_le_bytes());
        raw[40..48].copy_from_slice(&last.to_le_bytes());
        for (i, unit) in name.encode_utf16().enumerate() {
            raw[56 + i * 2..58 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        raw
    }

    /// 写入 GPT 头和分区表（128 字节分区项，CRC 正确）
    fn write_gpt(disk: &RamDisk, entries: &[[u8; 128]]) {
        let mut table = alloc::vec![0u8; entries.len().div_ceil(4) * 512];
        for (i, e) in entries.iter().enumerate() {
            table[i * 128..(i + 1) * 128].copy_from_slice(e);
        }
        for (i, chunk) in table.chunks(512).enumerate() {
            disk.set_sector(TABLE_LBA + i as u64, chunk);
        }

        let mut hdr = [0u8; 512];
        hdr[0..8].copy_from_slice(b"EFI PART");
        hdr[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
        hdr[12..16].copy_from_slice(&92u32.to_le_bytes());
        hdr[24..32].copy_from_slice(&1u64.to_le_bytes());
        hdr[40..48].copy_from_slice(&34u64.to_le_bytes());
        hdr[48..56].copy_from_slice(&4000u64.to_le_bytes());
        hdr[72..80].copy_from_slice(&TABLE_LBA.to_le_bytes());
        hdr[80..84].copy_from_slice(&(entries.len() as u32).to_le_bytes());
        hdr[84..88].copy_from_slice(&128u32.to_le_bytes());
        let table_crc = crc32(&table[..entries.len() * 128]);
        hdr[88..92].copy_from_slice(&table_crc.to_le_bytes());
        let hdr_crc = crc32_zeroed_field(&hdr[..92], 16..20);
        hdr[16..20].copy_from_slice(&hdr_crc.to_le_bytes());
        disk.set_sector(1, &hdr);
    }

    fn write_mbr(disk: &RamDisk, entries: &[(usize, u8, u32, u32)]) {
        let mut sector = [0u8; 512];
        for &(slot, part_type, start, count) in entries {
            let off = 446 + slot * 16;
            sector[off + 4] = part_type;
            sector[off + 8..off + 12].copy_from_slice(&start.to_le_bytes());
            sector[off + 12..off + 16].copy_from_slice(&count.to_le_bytes());
        }
        sector[510] = 0x55;
        sector[511] = 0xAA;
        disk.set_sector(0, &sector);
    }

    #[test]
    fn test_probe_gpt_single_partition() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(&disk, &[gpt_entry(100, 199, "ROOT")]);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::Gpt);
        assert_eq!(report.count(), 1);
        assert_eq!(report.checksums_valid, Some(true));

        let part = &report.partitions[0];
        assert_eq!(part.name.as_deref(), Some("ROOT"));
        assert_eq!(part.device.partition_start(), Some(100));
        assert_eq!(part.device.partition_size(), Some(100));
        assert_eq!(reg.find_by_name("sda1").unwrap().id(), part.device.id());
    }

    #[test]
    fn test_probe_gpt_crosses_sector_and_skips_empty() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        let empty = [0u8; 128];
        write_gpt(
            &disk,
            &[
                gpt_entry(100, 199, "A"),
                empty,
                gpt_entry(200, 299, "B"),
                empty,
                gpt_entry(300, 399, "C"),
            ],
        );
        let mut reg = DeviceRegistry::new();

        assert_eq!(probe(&mut reg, &dev), 3);
        let c = reg.find_by_name("sda3").unwrap();
        assert_eq!(c.partition_start(), Some(300));
        assert!(reg.find_by_name("sda4").is_none());
    }

    #[test]
    fn test_probe_gpt_crc_mismatch_still_accepted() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(&disk, &[gpt_entry(100, 199, "ROOT")]);
        disk.flip_bit(TABLE_LBA, 60, 0);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.count(), 1);
        assert_eq!(report.checksums_valid, Some(false));
    }

    #[test]
    fn test_probe_gpt_skips_inverted_entry() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(&disk, &[gpt_entry(500, 100, "BAD"), gpt_entry(600, 699, "OK")]);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.count(), 1);
        assert_eq!(report.partitions[0].index, 1);
        assert_eq!(report.partitions[0].start, 600);
    }

    #[test]
    fn test_probe_gpt_skips_overflowing_entry() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(
            &disk,
            &[
                gpt_entry(0, u64::MAX, "ALL"),
                gpt_entry(1, u64::MAX, "TAIL"),
                gpt_entry(600, 699, "OK"),
            ],
        );
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::Gpt);
        assert_eq!(report.count(), 1);
        assert_eq!(report.partitions[0].name.as_deref(), Some("OK"));
        assert_eq!(report.partitions[0].start, 600);
    }

    #[test]
    fn test_probe_gpt_only_overflowing_entry_is_absent() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(&disk, &[gpt_entry(0, u64::MAX, "ALL")]);
        let mut reg = DeviceRegistry::new();

        assert_eq!(probe(&mut reg, &dev), 0);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_probe_mbr_two_partitions() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_mbr(&disk, &[(0, 0x83, 2048, 1000), (2, 0x0C, 3048, 500)]);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::Mbr);
        assert_eq!(report.count(), 2);

        let first = reg.find_by_name("sda1").unwrap();
        assert_eq!(first.partition_start(), Some(2048));
        assert_eq!(first.partition_size(), Some(1000));
        let third = reg.find_by_name("sda3").unwrap();
        assert_eq!(third.partition_start(), Some(3048));
        assert_eq!(third.partition_size(), Some(500));
        assert_eq!(report.partitions[1].mbr_type, Some(0x0C));
        assert!(reg.find_by_name("sda2").is_none());
    }

    #[test]
    fn test_probe_mbr_skips_empty_entries() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_mbr(&disk, &[(0, 0, 100, 50), (1, 0x83, 200, 0), (3, 0x83, 300, 10)]);
        let mut reg = DeviceRegistry::new();

        assert_eq!(probe(&mut reg, &dev), 1);
        assert!(reg.find_by_name("sda4").is_some());
    }

    #[test]
    fn test_probe_gpt_without_partitions_falls_back() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_mbr(&disk, &[(0, 0x83, 64, 128)]);
        write_gpt(&disk, &[[0u8; 128]]);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::Mbr);
        assert_eq!(report.count(), 1);
    }

    #[test]
    fn test_probe_bad_entry_size_falls_back() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_mbr(&disk, &[(0, 0x83, 64, 128)]);
        write_gpt(&disk, &[gpt_entry(100, 199, "ROOT")]);
        let mut hdr = disk.sector(1);
        hdr[84..88].copy_from_slice(&64u32.to_le_bytes());
        disk.set_sector(1, &hdr);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::Mbr);
    }

    #[test]
    fn test_probe_unrecognized() {
        let (dev, _disk) = shared_ram_device("sda", 64);
        let mut reg = DeviceRegistry::new();

        let report = probe_report(&mut reg, &dev);
        assert_eq!(report.scheme, PartitionScheme::None);
        assert_eq!(report.count(), 0);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_probe_counts_only_registered() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_mbr(&disk, &[(0, 0x83, 100, 10), (1, 0x83, 200, 10), (2, 0x83, 300, 10)]);
        let mut reg = DeviceRegistry::with_capacity(2);

        assert_eq!(probe(&mut reg, &dev), 2);
        assert!(reg.find_by_name("sda3").is_none());
    }

    #[test]
    fn test_probed_partition_translates_io() {
        let (dev, disk) = shared_ram_device("sda", 4096);
        write_gpt(&disk, &[gpt_entry(100, 199, "ROOT")]);
        let mut reg = DeviceRegistry::new();
        probe(&mut reg, &dev);

        let part = reg.find_by_name("sda1").unwrap();
        part.write(0, 1, &[0x5Au8; 512]).unwrap();
        assert_eq!(disk.sector(100), alloc::vec![0x5Au8; 512]);
        assert!(part.read(100, 1, &mut [0u8; 512]).is_err());
    }
}
