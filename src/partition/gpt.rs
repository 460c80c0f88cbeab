//! GPT 分区表
//!
//! 头位于 LBA 1，分区项数组位于 `partition_table_lba` 起的若干扇区。
//! 头和分区表的 CRC32 只用于诊断：不一致时告警，不拒绝分区表。

use super::ProbedPartition;
use crate::block::{Device, DeviceRegistry};
use crate::consts::*;
use crate::crc::crc32_zeroed_field;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;

/// 头中 CRC 字段的位置
const HEADER_CRC_FIELD: core::ops::Range<usize> = 16..20;

/// UEFI 规定的最小头长度
const HEADER_MIN_SIZE: u32 = 92;

/// GPT 头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    /// 版本号
    pub revision: u32,
    /// 头长度（字节）
    pub header_size: u32,
    /// 头 CRC32（计算时该字段视为 0）
    pub header_crc32: u32,
    /// 第一个可用 LBA
    pub first_usable: u64,
    /// 最后一个可用 LBA
    pub last_usable: u64,
    /// 分区项数组起始 LBA
    pub partition_table_lba: u64,
    /// 分区项数量
    pub num_entries: u32,
    /// 单个分区项长度
    pub entry_size: u32,
    /// 分区项数组 CRC32
    pub partition_crc32: u32,
}

impl GptHeader {
    /// 解析 LBA 1 扇区，签名不是 "EFI PART" 时返回 None
    pub fn parse(sector: &[u8]) -> Option<Self> {
        if &sector[0..8] != GPT_SIGNATURE {
            return None;
        }
        Some(Self {
            revision: LittleEndian::read_u32(&sector[8..12]),
            header_size: LittleEndian::read_u32(&sector[12..16]),
            header_crc32: LittleEndian::read_u32(&sector[16..20]),
            first_usable: LittleEndian::read_u64(&sector[40..48]),
            last_usable: LittleEndian::read_u64(&sector[48..56]),
            partition_table_lba: LittleEndian::read_u64(&sector[72..80]),
            num_entries: LittleEndian::read_u32(&sector[80..84]),
            entry_size: LittleEndian::read_u32(&sector[84..88]),
            partition_crc32: LittleEndian::read_u32(&sector[88..92]),
        })
    }

    /// 校验头 CRC（CRC 字段按 0 计算）
    ///
    /// 头长度不在 [92, 512] 内时无法校验，返回 None。
    pub fn verify_crc(&self, sector: &[u8]) -> Option<bool> {
        if self.header_size < HEADER_MIN_SIZE || self.header_size > SECTOR_SIZE {
            return None;
        }
        let covered = &sector[..self.header_size as usize];
        Some(crc32_zeroed_field(covered, HEADER_CRC_FIELD) == self.header_crc32)
    }

    /// 检查分区项参数
    ///
    /// 分区项不小于 128 字节，且一个扇区至少容纳一个分区项。
    fn entries_usable(&self) -> bool {
        self.entry_size >= GPT_MIN_ENTRY_SIZE && self.entry_size <= SECTOR_SIZE && self.num_entries != 0
    }
}

/// GPT 分区项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptEntry {
    /// 分区类型 GUID，全 0 表示空项
    pub type_guid: [u8; 16],
    /// 分区唯一 GUID
    pub unique_guid: [u8; 16],
    /// 起始 LBA
    pub first_lba: u64,
    /// 结束 LBA（含）
    pub last_lba: u64,
    /// 属性位
    pub attributes: u64,
    /// 分区名
    pub name: String,
}

impl GptEntry {
    /// 从分区项原始数据（至少 128 字节）解析
    pub fn parse(raw: &[u8]) -> Self {
        let mut type_guid = [0u8; 16];
        let mut unique_guid = [0u8; 16];
        type_guid.copy_from_slice(&raw[0..16]);
        unique_guid.copy_from_slice(&raw[16..32]);
        Self {
            type_guid,
            unique_guid,
            first_lba: LittleEndian::read_u64(&raw[32..40]),
            last_lba: LittleEndian::read_u64(&raw[40..48]),
            attributes: LittleEndian::read_u64(&raw[48..56]),
            name: decode_name(&raw[56..56 + GPT_NAME_UNITS * 2]),
        }
    }

    /// 类型 GUID 全 0 表示空槽位
    pub fn is_empty(&self) -> bool {
        self.type_guid.iter().all(|&b| b == 0)
    }

    /// 扇区数（last - first + 1）
    ///
    /// 范围颠倒，或 `first + size` 超出 u64 时为 None。
    pub fn size(&self) -> Option<u64> {
        let size = self.last_lba.checked_sub(self.first_lba)?.checked_add(1)?;
        self.first_lba.checked_add(size)?;
        Some(size)
    }
}

/// 解码 UTF-16LE 名称
///
/// 小于 128 的码元映射为 ASCII，其他映射为 '?'，去掉末尾的 NUL 和空格。
pub fn decode_name(raw: &[u8]) -> String {
    let mut name: String = raw
        .chunks_exact(2)
        .map(|unit| {
            let c = LittleEndian::read_u16(unit);
            if c < 128 {
                c as u8 as char
            } else {
                '?'
            }
        })
        .collect();
    let trimmed = name.trim_end_matches(['\0', ' ']).len();
    name.truncate(trimmed);
    name
}

/// 解析 GPT 并注册分区
///
/// 分区号按注册顺序从 1 开始连续编号。签名或分区项参数无效时返回 None。
/// `sector` 作为读扇区的临时缓冲区，返回后内容不确定。
pub(super) fn try_gpt(
    registry: &mut DeviceRegistry,
    dev: &Arc<Device>,
    sector: &mut [u8],
) -> Option<(Vec<ProbedPartition>, Option<bool>)> {
    if let Err(e) = dev.read(GPT_HEADER_LBA, 1, sector) {
        log::warn!("[GPT] Failed to read header on '{}': {}", dev.name(), e);
        return None;
    }
    let hdr = GptHeader::parse(sector)?;

    log::info!(
        "[GPT] Found GPT: revision=0x{:x}, entries={}, entry_size={}",
        hdr.revision,
        hdr.num_entries,
        hdr.entry_size
    );
    log::info!(
        "[GPT] First usable LBA={}, Last usable LBA={}",
        hdr.first_usable,
        hdr.last_usable
    );

    if !hdr.entries_usable() {
        log::warn!(
            "[GPT] Unusable entry layout (entries={}, entry_size={})",
            hdr.num_entries,
            hdr.entry_size
        );
        return None;
    }

    let header_ok = hdr.verify_crc(sector);
    if header_ok == Some(false) {
        log::warn!("[GPT] Header CRC mismatch on '{}'", dev.name());
    }

    let stated = hdr.num_entries;
    let num_entries = stated.min(GPT_MAX_ENTRIES);
    let entry_size = hdr.entry_size as usize;
    let entries_per_sector = SECTOR_BYTES / entry_size;

    let mut table_crc = Hasher::new();
    let mut table_complete = num_entries == stated;
    let mut found = Vec::new();

    for i in 0..num_entries as usize {
        let lba = hdr.partition_table_lba + (i / entries_per_sector) as u64;
        let offset = (i % entries_per_sector) * entry_size;

        if offset == 0 {
            if let Err(e) = dev.read(lba, 1, sector) {
                log::warn!("[GPT] Failed to read entry table at LBA {}: {}", lba, e);
                table_complete = false;
                break;
            }
        }

        let raw = &sector[offset..offset + entry_size];
        table_crc.update(raw);

        let entry = GptEntry::parse(raw);
        if entry.is_empty() {
            continue;
        }
        let Some(size) = entry.size() else {
            log::warn!(
                "[GPT] Skipping entry {}: invalid range LBA {} - {}",
                i,
                entry.first_lba,
                entry.last_lba
            );
            continue;
        };

        let index = found.len() as u32 + 1;
        log::info!(
            "[GPT] Partition {}: LBA {} - {} ({} MB) '{}'",
            index,
            entry.first_lba,
            entry.last_lba,
            size.saturating_mul(SECTOR_SIZE as u64) / (1024 * 1024),
            entry.name
        );

        match registry.create_partition(dev, index, entry.first_lba, size) {
            Ok(device) => found.push(ProbedPartition {
                device,
                index,
                start: entry.first_lba,
                size,
                name: Some(entry.name),
                mbr_type: None,
            }),
            Err(e) => log::warn!("[GPT] Partition {} not registered: {}", index, e),
        }
    }

    let table_ok = table_complete.then(|| table_crc.finalize() == hdr.partition_crc32);
    if table_ok == Some(false) {
        log::warn!("[GPT] Partition table CRC mismatch on '{}'", dev.name());
    }

    let checksums = match (header_ok, table_ok) {
        (Some(h), Some(t)) => Some(h && t),
        _ => None,
    };
    Some((found, checksums))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_name() {
        let mut raw = [0u8; 72];
        for (i, c) in "ROOT  ".bytes().enumerate() {
            raw[i * 2] = c;
        }
        assert_eq!(decode_name(&raw), "ROOT");

        raw[2..4].copy_from_slice(&0x00E9u16.to_le_bytes());
        assert_eq!(decode_name(&raw), "R?OT");

        assert_eq!(decode_name(&[0u8; 72]), "");
    }

    #[test]
    fn test_parse_header_signature() {
        let mut sector = [0u8; 512];
        assert!(GptHeader::parse(&sector).is_none());

        sector[0..8].copy_from_slice(GPT_SIGNATURE);
        sector[80..84].copy_from_slice(&4u32.to_le_bytes());
        sector[84..88].copy_from_slice(&128u32.to_le_bytes());
        let hdr = GptHeader::parse(&sector).unwrap();
        assert_eq!(hdr.num_entries, 4);
        assert!(hdr.entries_usable());
    }

    #[test]
    fn test_entry_layout_bounds() {
        let mut sector = [0u8; 512];
        sector[0..8].copy_from_slice(GPT_SIGNATURE);
        sector[80..84].copy_from_slice(&4u32.to_le_bytes());

        for (size, ok) in [(64u32, false), (128, true), (512, true), (1024, false)] {
            sector[84..88].copy_from_slice(&size.to_le_bytes());
            assert_eq!(GptHeader::parse(&sector).unwrap().entries_usable(), ok);
        }

        sector[80..84].copy_from_slice(&0u32.to_le_bytes());
        sector[84..88].copy_from_slice(&128u32.to_le_bytes());
        assert!(!GptHeader::parse(&sector).unwrap().entries_usable());
    }

    #[test]
    fn test_entry_size_inverted_range() {
        let mut raw = [0u8; 128];
        raw[0] = 1;
        raw[32..40].copy_from_slice(&200u64.to_le_bytes());
        raw[40..48].copy_from_slice(&100u64.to_le_bytes());
        let entry = GptEntry::parse(&raw);
        assert!(!entry.is_empty());
        assert_eq!(entry.size(), None);

        raw[40..48].copy_from_slice(&200u64.to_le_bytes());
        assert_eq!(GptEntry::parse(&raw).size(), Some(1));
    }

    #[test]
    fn test_entry_size_rejects_overflowing_range() {
        let mut raw = [0u8; 128];
        raw[0] = 1;
        raw[40..48].copy_from_slice(&u64::MAX.to_le_bytes());
        // 0..=u64::MAX 的扇区数无法用 u64 表示
        assert_eq!(GptEntry::parse(&raw).size(), None);

        // 结束位置 first + size 溢出
        raw[32..40].copy_from_slice(&1u64.to_le_bytes());
        assert_eq!(GptEntry::parse(&raw).size(), None);

        raw[32..40].copy_from_slice(&(u64::MAX - 1).to_le_bytes());
        raw[40..48].copy_from_slice(&(u64::MAX - 1).to_le_bytes());
        assert_eq!(GptEntry::parse(&raw).size(), Some(1));
    }
}
