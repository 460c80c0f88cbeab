//! Journal 检查点与关闭

use super::jnl::Journal;
use super::types::JournalFlags;
use super::JournalError;
use crate::error::Result;

impl Journal {
    /// 声明所有已提交的记录都已写回最终位置
    ///
    /// 只把超级块的 `start` 置 0 并同步，不检查最终位置是否真的已经落盘。
    /// 调用者需要先 `cache.sync()`。
    pub fn checkpoint(&self) -> Result<()> {
        let mut st = self.state.lock();
        if !st.mounted {
            return Err(JournalError::NotLoaded.into());
        }
        let geo = st.geo;

        let mut sb = self.read_super(&geo)?;
        sb.start = 0;
        self.write_super(&geo, &sb)?;
        self.cache.sync()?;

        log::debug!("[JNL] Checkpoint: {} live block(s) released", st.live_blocks);
        st.live_blocks = 0;
        Ok(())
    }

    /// 卸载
    ///
    /// 丢弃未提交的事务，把超级块标记为 `start = 0`、CLEAN，同步全部缓存。
    /// 之后需要重新 `load` 才能使用。
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        if st.txn.is_active() {
            log::warn!(
                "[JNL] Shutdown with active transaction seq={}, discarding {} block(s)",
                st.txn.sequence(),
                st.txn.len()
            );
            st.txn.clear();
        }

        if !st.mounted {
            return self.cache.sync().map(|_| ());
        }

        let geo = st.geo;
        let marked = self.read_super(&geo).and_then(|mut sb| {
            sb.start = 0;
            sb.flags = JournalFlags::CLEAN;
            self.write_super(&geo, &sb)
        });
        let synced = self.cache.sync();

        marked?;
        synced?;

        st.mounted = false;
        st.live_blocks = 0;
        log::info!("[JNL] Journal shut down cleanly");
        Ok(())
    }
}
