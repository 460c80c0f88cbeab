//! 内存中的事务
//!
//! 每个 journal 最多一个活跃事务。同一块号在事务中只出现一次，
//! 重复记录覆盖已捕获的快照。

use super::checksum::XorChecksum;
use super::JournalError;
use crate::consts::JNL_MAX_BLOCKS_PER_TXN;
use alloc::vec::Vec;

/// 已记录的块
#[derive(Debug, Clone)]
pub struct LoggedBlock {
    /// 文件系统块号
    pub fs_block: u32,
    /// 捕获的块内容（after-image）
    pub image: Vec<u8>,
}

/// 事务
#[derive(Debug, Default)]
pub struct Transaction {
    sequence: u32,
    blocks: Vec<LoggedBlock>,
    active: bool,
}

impl Transaction {
    /// 创建非活跃事务
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始事务
    pub fn start(&mut self, sequence: u32) -> Result<(), JournalError> {
        if self.active {
            return Err(JournalError::AlreadyActive);
        }
        self.sequence = sequence;
        self.blocks.clear();
        self.active = true;
        Ok(())
    }

    /// 结束事务并释放快照
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.active = false;
    }

    /// 是否活跃
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 事务序列号
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// 已记录的块数量
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// 是否没有记录任何块
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 按记录顺序的块
    pub fn blocks(&self) -> &[LoggedBlock] {
        &self.blocks
    }

    /// 查找已记录块的快照
    pub fn image_mut(&mut self, fs_block: u32) -> Option<&mut Vec<u8>> {
        self.blocks
            .iter_mut()
            .find(|b| b.fs_block == fs_block)
            .map(|b| &mut b.image)
    }

    /// 追加新块
    ///
    /// 达到上限时失败，已记录的块保持不变。
    pub fn push(&mut self, fs_block: u32, image: Vec<u8>) -> Result<(), JournalError> {
        if !self.active {
            return Err(JournalError::NotActive);
        }
        if self.blocks.len() >= JNL_MAX_BLOCKS_PER_TXN {
            return Err(JournalError::TransactionFull);
        }
        self.blocks.push(LoggedBlock { fs_block, image });
        Ok(())
    }

    /// 是否已达到块数上限
    pub fn is_full(&self) -> bool {
        self.blocks.len() >= JNL_MAX_BLOCKS_PER_TXN
    }

    /// 全部快照的 XOR 校验和
    pub fn checksum(&self) -> u32 {
        let mut sum = XorChecksum::new();
        for block in &self.blocks {
            sum.update(&block.image);
        }
        sum.value()
    }
}
