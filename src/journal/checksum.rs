//! Journal 数据块校验和
//!
//! 校验和是全部数据块按 32 位小端字逐字 XOR 的结果。
//!
//! # 局限
//!
//! XOR 能发现大部分偶然损坏，但不能发现所有：同一位在偶数个字中同时翻转、
//! 数据块之间互换顺序都不会改变结果。它不提供任何对抗性保证。
//! 更换算法属于磁盘格式变更，需要新的格式版本。

use byteorder::{ByteOrder, LittleEndian};

/// 计算单个块的 XOR 校验和（末尾不足 4 字节的部分忽略）
pub fn xor_checksum(data: &[u8]) -> u32 {
    data.chunks_exact(4)
        .fold(0, |acc, word| acc ^ LittleEndian::read_u32(word))
}

/// 多个块的累计校验和
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XorChecksum(u32);

impl XorChecksum {
    /// 空校验和
    pub fn new() -> Self {
        Self(0)
    }

    /// 加入一个块
    pub fn update(&mut self, data: &[u8]) {
        self.0 ^= xor_checksum(data);
    }

    /// 当前值
    pub fn value(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_words() {
        let mut data = [0u8; 16];
        data[0..4].copy_from_slice(&0x1111_1111u32.to_le_bytes());
        data[4..8].copy_from_slice(&0x2222_2222u32.to_le_bytes());
        assert_eq!(xor_checksum(&data), 0x3333_3333);
        assert_eq!(xor_checksum(&[0u8; 512]), 0);
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let data = [0x5Au8; 512];
        let mut flipped = data;
        flipped[77] ^= 0x10;
        assert_ne!(xor_checksum(&data), xor_checksum(&flipped));
    }

    #[test]
    fn test_paired_flip_undetected() {
        // 两个字的同一位翻转会相互抵消
        let data = [0u8; 512];
        let mut flipped = data;
        flipped[0] ^= 1;
        flipped[4] ^= 1;
        assert_eq!(xor_checksum(&data), xor_checksum(&flipped));
    }

    #[test]
    fn test_accumulator() {
        let mut sum = XorChecksum::new();
        sum.update(&[0xFFu8; 4]);
        sum.update(&[0x0Fu8; 4]);
        assert_eq!(sum.value(), 0xF0F0_F0F0);
    }
}
