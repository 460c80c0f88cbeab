//! CRC32 校验和计算
//!
//! GPT 头和分区表使用标准 CRC32（IEEE 802.3 多项式）。

use core::ops::Range;
use crc32fast::Hasher;

/// 计算 CRC32 校验和（一次性计算）
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// 计算 CRC32 校验和（追加模式）
///
/// # 参数
/// * `crc` - 之前数据的 CRC32 值
/// * `data` - 追加的数据
#[inline]
pub fn crc32_append(crc: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(crc);
    hasher.update(data);
    hasher.finalize()
}

/// 计算 CRC32，`field` 范围内的字节按 0 参与计算
///
/// 用于校验和字段本身位于被校验数据中的结构（如 GPT 头）。
pub fn crc32_zeroed_field(data: &[u8], field: Range<usize>) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&data[..field.start]);
    for _ in field.clone() {
        hasher.update(&[0u8]);
    }
    hasher.update(&data[field.end..]);
    hasher.finalize()
}
