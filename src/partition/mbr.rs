//! MBR 分区表
//!
//! ```text
//! 0   .. 446  引导代码（忽略）
//! 446 .. 510  4 个 16 字节分区项
//! 510 .. 512  签名 0xAA55
//! ```

use super::ProbedPartition;
use crate::block::{Device, DeviceRegistry};
use crate::consts::*;
use alloc::sync::Arc;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

/// MBR 分区项（16 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrEntry {
    /// 0x80 = 可引导
    pub status: u8,
    /// 分区类型
    pub part_type: u8,
    /// 起始 LBA
    pub lba_start: u32,
    /// 扇区数
    pub sector_count: u32,
}

impl MbrEntry {
    /// 从 16 字节原始数据解析
    ///
    /// 布局：status, CHS-first(3), type, CHS-last(3), LBA start, sector count
    pub fn parse(raw: &[u8]) -> Self {
        Self {
            status: raw[0],
            part_type: raw[4],
            lba_start: LittleEndian::read_u32(&raw[8..12]),
            sector_count: LittleEndian::read_u32(&raw[12..16]),
        }
    }

    /// 类型和扇区数都非 0
    pub fn is_used(&self) -> bool {
        self.part_type != 0 && self.sector_count != 0
    }

    /// 是否为可引导分区
    pub fn is_bootable(&self) -> bool {
        self.status & 0x80 != 0
    }
}

/// 扇区末尾是否有 0xAA55 签名
pub fn has_signature(sector: &[u8]) -> bool {
    LittleEndian::read_u16(&sector[MBR_SIGNATURE_OFFSET..MBR_SIGNATURE_OFFSET + 2]) == MBR_SIGNATURE
}

/// 解析 4 个分区项
pub fn entries(sector: &[u8]) -> [MbrEntry; MBR_ENTRY_COUNT] {
    core::array::from_fn(|i| {
        let off = MBR_PARTITION_TABLE_OFFSET + i * MBR_ENTRY_SIZE;
        MbrEntry::parse(&sector[off..off + MBR_ENTRY_SIZE])
    })
}

/// 解析 LBA 0 中的 MBR 并注册分区
///
/// 分区号为表项位置（1-4），空表项跳过但占用编号。
/// 签名无效时返回 None。
pub(super) fn try_mbr(
    registry: &mut DeviceRegistry,
    dev: &Arc<Device>,
    sector: &[u8],
) -> Option<Vec<ProbedPartition>> {
    if !has_signature(sector) {
        log::info!("[MBR] No valid MBR signature on '{}'", dev.name());
        return None;
    }

    let mut found = Vec::new();
    for (i, entry) in entries(sector).iter().enumerate() {
        if !entry.is_used() {
            continue;
        }

        let index = i as u32 + 1;
        log::info!(
            "[MBR] Partition {}: type=0x{:02x} LBA={} count={} ({} MB){}",
            index,
            entry.part_type,
            entry.lba_start,
            entry.sector_count,
            entry.sector_count as u64 * SECTOR_SIZE as u64 / (1024 * 1024),
            if entry.is_bootable() { " boot" } else { "" }
        );

        let start = entry.lba_start as u64;
        let size = entry.sector_count as u64;
        match registry.create_partition(dev, index, start, size) {
            Ok(device) => found.push(ProbedPartition {
                device,
                index,
                start,
                size,
                name: None,
                mbr_type: Some(entry.part_type),
            }),
            Err(e) => log::warn!("[MBR] Partition {} not registered: {}", index, e),
        }
    }

    Some(found)
}
