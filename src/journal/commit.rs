//! 事务提交
//!
//! 磁盘上的一条事务记录：
//!
//! ```text
//! head        head+1 .. head+N      head+N+1
//! [Descriptor][Data 1]...[Data N]   [Commit]
//! ```
//!
//! 写入顺序：描述符、数据块、提交块，同步；然后更新超级块，再同步。
//! 恢复时只有完整的记录才会被认为有效。

use super::jnl::Journal;
use super::types::{CommitBlock, Descriptor, JournalFlags};
use super::JournalError;
use crate::error::Result;
use alloc::vec;

impl Journal {
    /// 提交当前事务
    ///
    /// 没有活跃事务或没有记录任何块时直接成功（无 I/O）。
    /// 提交只写 journal，不写块的最终位置；最终位置由缓存正常写回。
    ///
    /// # 错误
    ///
    /// - `NoSpace`: 记录超过 journal 可用长度，或会覆盖尚未检查点的记录。
    ///   事务保持活跃且不变，调用者可以 abort 或在检查点后重试
    /// - `Io`: 写入或同步失败，事务保持活跃
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        if !st.txn.is_active() || st.txn.is_empty() {
            st.txn.clear();
            return Ok(());
        }

        let geo = st.geo;
        let count = st.txn.len() as u32;
        let seq = st.txn.sequence();
        let needed = 1 + count + 1;
        let usable = geo.usable();

        if needed > usable {
            log::warn!(
                "[JNL] Transaction too large for journal ({} blocks, {} usable)",
                needed,
                usable
            );
            return Err(JournalError::TooLarge.into());
        }
        if st.live_blocks + needed > usable {
            log::warn!(
                "[JNL] Journal full ({} live + {} needed > {}), checkpoint required",
                st.live_blocks,
                needed,
                usable
            );
            return Err(JournalError::NoSpace.into());
        }

        let start = st.head;
        let mut block = vec![0u8; geo.block_size as usize];

        // 1. 描述符
        Descriptor::new(seq, st.txn.blocks().iter().map(|b| b.fs_block)).encode(&mut block);
        self.write_jblock(&geo, start, &block)?;
        let mut jpos = geo.wrap(start + 1);

        // 2. 数据块
        for logged in st.txn.blocks() {
            self.write_jblock(&geo, jpos, &logged.image)?;
            jpos = geo.wrap(jpos + 1);
        }

        // 3. 提交块
        CommitBlock {
            sequence: seq,
            checksum: st.txn.checksum(),
        }
        .encode(&mut block);
        self.write_jblock(&geo, jpos, &block)?;
        jpos = geo.wrap(jpos + 1);

        // 4. 记录持久化之后才能更新超级块
        self.cache.sync()?;

        let mut sb = self.read_super(&geo)?;
        if sb.start == 0 {
            sb.start = start;
        }
        sb.sequence = seq.wrapping_add(1);
        sb.flags.remove(JournalFlags::CLEAN);
        self.write_super(&geo, &sb)?;
        self.cache.sync()?;

        log::debug!(
            "[JNL] Committed seq={} ({} blocks) at journal block {}",
            seq,
            count,
            start
        );

        st.head = jpos;
        st.sequence = seq.wrapping_add(1);
        st.live_blocks += needed;
        st.txn.clear();
        Ok(())
    }
}
