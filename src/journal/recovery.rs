//! Journal 恢复逻辑
//!
//! 从超级块的 `start` 开始向前扫描，逐条验证并重放完整的事务记录。
//! 遇到不完整或校验失败的记录立即停止，该记录及其后的记录都不重放。

use super::checksum::XorChecksum;
use super::jnl::{Geometry, Journal, JournalState};
use super::types::{CommitBlock, Descriptor, JournalFlags};
use super::JournalError;
use crate::consts::JNL_RECOVERY_PASS_LIMIT;
use crate::error::Result;
use alloc::vec;
use alloc::vec::Vec;

/// 扫描停止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// 没有更多有效的描述符（正常结束）
    EndOfLog,
    /// 描述符的标签数量超出 [1, 上限]
    BadCount,
    /// 提交块缺失或与描述符不匹配
    Torn,
    /// 数据块校验和不一致
    ChecksumMismatch,
    /// 读取 journal 块失败
    ReadError,
    /// 达到扫描次数上限
    PassLimit,
}

impl ScanStop {
    /// 持久化到超级块 `errno` 字段的代码
    pub fn code(self) -> u32 {
        match self {
            ScanStop::EndOfLog => 0,
            ScanStop::BadCount => 1,
            ScanStop::Torn => 2,
            ScanStop::ChecksumMismatch => 3,
            ScanStop::ReadError => 4,
            ScanStop::PassLimit => 5,
        }
    }

    /// 从 `errno` 代码还原
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ScanStop::EndOfLog,
            1 => ScanStop::BadCount,
            2 => ScanStop::Torn,
            3 => ScanStop::ChecksumMismatch,
            4 => ScanStop::ReadError,
            5 => ScanStop::PassLimit,
            _ => return None,
        })
    }

    /// 是否有记录因为损坏或不完整被丢弃
    pub fn is_partial(self) -> bool {
        matches!(
            self,
            ScanStop::Torn | ScanStop::ChecksumMismatch | ScanStop::ReadError
        )
    }
}

/// 恢复结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// 重放的事务数
    pub replayed: u32,
    /// 重放的块数
    pub blocks_replayed: u32,
    /// 最后重放的事务序列号
    pub last_sequence: Option<u32>,
    /// 扫描停止原因
    pub stop: ScanStop,
}

impl RecoveryReport {
    fn empty() -> Self {
        Self {
            replayed: 0,
            blocks_replayed: 0,
            last_sequence: None,
            stop: ScanStop::EndOfLog,
        }
    }

    /// 扫描是否在损坏或不完整的记录处截断
    pub fn is_partial(&self) -> bool {
        self.stop.is_partial()
    }
}

/// 挂载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// Journal 干净，没有执行恢复
    Clean,
    /// 执行了恢复
    Recovered(RecoveryReport),
}

impl Journal {
    /// 重放已提交的事务
    ///
    /// 超级块 `start == 0` 时无事可做。否则扫描结束后同步重放的数据，
    /// 然后把超级块重置为 `start = 0`、CLEAN，序列号推进到最后重放的事务之后。
    ///
    /// # 错误
    ///
    /// 重放写入失败时返回错误，此时超级块保持不变，下次挂载会重新恢复。
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut guard = self.state.lock();
        if !guard.mounted {
            return Err(JournalError::NotLoaded.into());
        }
        self.recover_locked(&mut guard)
    }

    pub(super) fn recover_locked(&self, st: &mut JournalState) -> Result<RecoveryReport> {
        let geo = st.geo;
        let mut sb = self.read_super(&geo)?;

        if sb.start == 0 {
            log::info!("[JNL] Nothing to recover");
            return Ok(RecoveryReport::empty());
        }

        st.txn.clear();
        let mut report = RecoveryReport::empty();
        report.stop = if sb.start < geo.first || sb.start >= geo.maxlen {
            log::warn!("[JNL] Log start {} outside journal, nothing replayed", sb.start);
            ScanStop::EndOfLog
        } else {
            self.scan(&geo, sb.start, sb.sequence, &mut report)?
        };

        self.cache.sync()?;

        sb.start = 0;
        if let Some(last) = report.last_sequence {
            sb.sequence = sb.sequence.max(last.wrapping_add(1));
        }
        sb.flags.insert(JournalFlags::CLEAN);
        sb.errno = report.stop.code();
        self.write_super(&geo, &sb)?;
        self.cache.sync()?;

        st.head = geo.first;
        st.sequence = sb.sequence;
        st.live_blocks = 0;

        log::info!(
            "[JNL] Recovery complete: {} transaction(s) replayed, {} block(s), stop={:?}",
            report.replayed,
            report.blocks_replayed,
            report.stop
        );
        Ok(report)
    }

    /// 从 `start` 扫描并重放，返回停止原因
    fn scan(
        &self,
        geo: &Geometry,
        start: u32,
        next_sequence: u32,
        report: &mut RecoveryReport,
    ) -> Result<ScanStop> {
        let block_size = geo.block_size as usize;
        let mut block = vec![0u8; block_size];
        let mut jpos = start;

        for _ in 0..JNL_RECOVERY_PASS_LIMIT {
            if self.read_jblock(geo, jpos, &mut block).is_err() {
                log::warn!("[JNL] Cannot read journal block {}", jpos);
                return Ok(ScanStop::ReadError);
            }
            let Some(desc) = Descriptor::parse(&block) else {
                return Ok(ScanStop::EndOfLog);
            };

            // 上一圈留下的旧记录序列号不连续
            let in_order = match report.last_sequence {
                None => desc.sequence < next_sequence,
                Some(prev) => desc.sequence == prev.wrapping_add(1),
            };
            if !in_order {
                log::debug!("[JNL] Stale descriptor seq={} at {}", desc.sequence, jpos);
                return Ok(ScanStop::EndOfLog);
            }

            if desc.tags.is_empty() {
                log::warn!("[JNL] Bad tag count {} for seq={}", desc.count, desc.sequence);
                return Ok(ScanStop::BadCount);
            }
            let count = desc.count;

            let commit_pos = geo.wrap(jpos + 1 + count);
            if self.read_jblock(geo, commit_pos, &mut block).is_err() {
                log::warn!("[JNL] Cannot read commit block for seq={}", desc.sequence);
                return Ok(ScanStop::ReadError);
            }
            let commit = match CommitBlock::parse(&block) {
                Some(commit) if commit.sequence == desc.sequence => commit,
                _ => {
                    log::warn!(
                        "[JNL] Incomplete transaction seq={}, stopping recovery",
                        desc.sequence
                    );
                    return Ok(ScanStop::Torn);
                }
            };

            let mut images: Vec<Vec<u8>> = Vec::with_capacity(count as usize);
            let mut checksum = XorChecksum::new();
            for i in 0..count {
                let mut image = vec![0u8; block_size];
                if self.read_jblock(geo, geo.wrap(jpos + 1 + i), &mut image).is_err() {
                    log::warn!("[JNL] Cannot read data block {} of seq={}", i, desc.sequence);
                    return Ok(ScanStop::ReadError);
                }
                checksum.update(&image);
                images.push(image);
            }

            if checksum.value() != commit.checksum {
                log::warn!("[JNL] Checksum mismatch for seq={}, stopping", desc.sequence);
                return Ok(ScanStop::ChecksumMismatch);
            }

            log::info!(
                "[JNL] Replaying transaction seq={} ({} blocks)",
                desc.sequence,
                count
            );
            for (tag, image) in desc.tags.iter().zip(&images) {
                self.write_fs_block(geo, tag.blocknr, image)?;
            }

            report.replayed += 1;
            report.blocks_replayed += count;
            report.last_sequence = Some(desc.sequence);
            jpos = geo.wrap(commit_pos + 1);
        }

        log::warn!(
            "[JNL] Recovery pass limit ({}) reached",
            JNL_RECOVERY_PASS_LIMIT
        );
        Ok(ScanStop::PassLimit)
    }
}
