//! Journal 实例
//!
//! 持有 journal 的几何参数、环形日志位置和当前事务。所有操作在同一把
//! 自旋锁内完成，执行同步 I/O 后返回，期间不会让出处理器。

use super::transaction::Transaction;
use super::types::JournalSuperblock;
use super::JournalError;
use crate::{
    block::Device,
    cache::{Block, BufferCache},
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::sync::Arc;
use alloc::vec;
use spin::Mutex;

/// Journal 几何参数
///
/// journal 块号 `j` 位于设备扇区 `start_lba + j * sectors_per_block`；
/// 文件系统块号 `b` 位于 `b * sectors_per_block`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Geometry {
    pub start_block: u32,
    pub start_lba: u64,
    pub block_size: u32,
    pub sectors_per_block: u32,
    pub maxlen: u32,
    pub first: u32,
}

impl Geometry {
    pub fn new(start_block: u32, maxlen: u32, block_size: u32) -> core::result::Result<Self, JournalError> {
        if block_size == 0 || block_size % SECTOR_SIZE != 0 {
            return Err(JournalError::BadGeometry);
        }
        let sectors_per_block = block_size / SECTOR_SIZE;
        Ok(Self {
            start_block,
            start_lba: start_block as u64 * sectors_per_block as u64,
            block_size,
            sectors_per_block,
            maxlen,
            first: JNL_FIRST_USABLE,
        })
    }

    /// 环形区域长度（不含超级块）
    pub fn usable(&self) -> u32 {
        self.maxlen.saturating_sub(self.first)
    }

    /// 逻辑位置映射到环形区域内的块号
    pub fn wrap(&self, pos: u32) -> u32 {
        let usable = self.usable();
        if usable == 0 {
            return self.first;
        }
        self.first + pos.saturating_sub(self.first) % usable
    }

    pub fn jblock_lba(&self, jblock: u32) -> u64 {
        self.start_lba + jblock as u64 * self.sectors_per_block as u64
    }

    pub fn fs_block_lba(&self, fs_block: u32) -> u64 {
        fs_block as u64 * self.sectors_per_block as u64
    }

    /// 文件系统块是否落在 journal 区域内
    pub fn contains_fs_block(&self, fs_block: u32) -> bool {
        let start = self.start_block as u64;
        (start..start + self.maxlen as u64).contains(&(fs_block as u64))
    }

    /// journal 区域结束位置（扇区，不含）
    pub fn end_lba(&self) -> u64 {
        self.jblock_lba(self.maxlen)
    }
}

/// Journal 可变状态
pub(super) struct JournalState {
    pub geo: Geometry,
    /// 下一个空闲 journal 块
    pub head: u32,
    /// 下一个事务序列号
    pub sequence: u32,
    /// 尚未检查点的记录占用的块数
    pub live_blocks: u32,
    /// 已成功 init 或 load
    pub mounted: bool,
    pub txn: Transaction,
}

/// 元数据 journal
///
/// 环形 write-ahead 日志，记录元数据块的 after-image。
///
/// # 状态机
///
/// ```text
/// INACTIVE --begin--> ACTIVE --commit--> INACTIVE
///                       |
///                       +----abort-----> INACTIVE
/// ```
///
/// # 使用示例
///
/// ```rust,ignore
/// // 格式化时
/// let jnl = Journal::init(cache.clone(), dev.clone(), 1024, 64, 4096)?;
///
/// // 挂载时
/// let jnl = Journal::open(cache.clone(), dev.clone(), 1024, 4096)?;
/// if let MountStatus::Recovered(report) = jnl.load()? {
///     log::info!("replayed {} transaction(s)", report.replayed);
/// }
///
/// jnl.begin()?;
/// jnl.log_block(inode_table_block)?;
/// jnl.commit()?;
/// cache.sync()?;
/// jnl.checkpoint()?;
/// ```
pub struct Journal {
    pub(super) cache: Arc<BufferCache>,
    pub(super) device: Arc<Device>,
    pub(super) state: Mutex<JournalState>,
}

impl Journal {
    /// 在设备上创建新的 journal
    ///
    /// # 参数
    ///
    /// * `start_block` - journal 区域的第一个文件系统块
    /// * `block_count` - journal 区域的块数（至少 8）
    /// * `fs_block_size` - 文件系统块大小（512 的倍数）
    ///
    /// 先清零环形区域（`first..maxlen`），再写入新的超级块
    /// （`start = 0`，CLEAN，`first = 1`，序列号 1）并同步。
    /// 旧 journal 留下的记录不会被新 journal 的恢复扫描到。
    pub fn init(
        cache: Arc<BufferCache>,
        device: Arc<Device>,
        start_block: u32,
        block_count: u32,
        fs_block_size: u32,
    ) -> Result<Self> {
        if block_count < JNL_MIN_BLOCKS {
            log::error!(
                "[JNL] Journal too small (need >= {} blocks, got {})",
                JNL_MIN_BLOCKS,
                block_count
            );
            return Err(JournalError::TooSmall.into());
        }
        let geo = Geometry::new(start_block, block_count, fs_block_size)?;
        if geo.end_lba() > device.sector_count() {
            return Err(Error::new(ErrorKind::InvalidInput, "Journal region exceeds device"));
        }

        let jnl = Self::with_geometry(cache, device, geo);

        // 序列号从 1 重新开始，旧记录的序列号可能恰好与新记录连续
        let zero = vec![0u8; geo.block_size as usize];
        for jblock in geo.first..geo.maxlen {
            jnl.write_jblock(&geo, jblock, &zero)?;
        }
        jnl.cache.sync()?;

        let sb = JournalSuperblock::fresh(fs_block_size, block_count);
        jnl.write_super(&geo, &sb)?;
        jnl.cache.sync()?;

        {
            let mut st = jnl.state.lock();
            st.head = geo.first;
            st.sequence = sb.sequence;
            st.mounted = true;
        }

        log::info!(
            "[JNL] Journal initialized: {} blocks at FS block {}",
            block_count,
            start_block
        );
        Ok(jnl)
    }

    /// 打开已有的 journal（不做 I/O），随后调用 [`load`](Self::load)
    pub fn open(
        cache: Arc<BufferCache>,
        device: Arc<Device>,
        start_block: u32,
        fs_block_size: u32,
    ) -> Result<Self> {
        let geo = Geometry::new(start_block, 0, fs_block_size)?;
        Ok(Self::with_geometry(cache, device, geo))
    }

    fn with_geometry(cache: Arc<BufferCache>, device: Arc<Device>, geo: Geometry) -> Self {
        Self {
            cache,
            device,
            state: Mutex::new(JournalState {
                geo,
                head: geo.first,
                sequence: JNL_INITIAL_SEQUENCE,
                live_blocks: 0,
                mounted: false,
                txn: Transaction::new(),
            }),
        }
    }

    /// 挂载：读取并校验超级块，journal 脏时执行恢复
    ///
    /// # 错误
    ///
    /// - `Corrupted`: magic 不匹配或几何参数与超级块不一致
    /// - `Io`: 读写失败
    pub fn load(&self) -> Result<super::MountStatus> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        let sb = self.read_super(&st.geo)?;
        if !sb.has_valid_magic() {
            log::error!("[JNL] Bad journal magic: 0x{:08X}", sb.magic);
            return Err(JournalError::InvalidSuperblock.into());
        }
        if sb.block_size != st.geo.block_size
            || sb.maxlen < JNL_MIN_BLOCKS
            || sb.first == 0
            || sb.first >= sb.maxlen
        {
            log::error!(
                "[JNL] Superblock geometry rejected: blocksize={} maxlen={} first={}",
                sb.block_size,
                sb.maxlen,
                sb.first
            );
            return Err(JournalError::InvalidSuperblock.into());
        }

        st.geo.maxlen = sb.maxlen;
        st.geo.first = sb.first;
        st.head = sb.first;
        st.sequence = sb.sequence;
        st.live_blocks = 0;
        st.txn.clear();
        st.mounted = true;

        if !sb.is_clean() && sb.start != 0 {
            log::info!("[JNL] Dirty journal detected, replaying");
            return match self.recover_locked(st) {
                Ok(report) => Ok(super::MountStatus::Recovered(report)),
                Err(e) => {
                    st.mounted = false;
                    Err(e)
                }
            };
        }

        log::info!("[JNL] Journal is clean");
        Ok(super::MountStatus::Clean)
    }

    /// 开始事务
    ///
    /// 已有活跃事务时失败。
    pub fn begin(&self) -> Result<()> {
        let mut st = self.state.lock();
        if !st.mounted {
            return Err(JournalError::NotLoaded.into());
        }
        let sequence = st.sequence;
        st.txn.start(sequence)?;
        log::trace!("[JNL] begin seq={}", sequence);
        Ok(())
    }

    /// 记录一个元数据块
    ///
    /// 捕获块的当前内容。块已在事务中时重新读取并覆盖快照，
    /// 因此最后一次 `log_block` 之后、`commit` 之前的修改不会被记录。
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 没有活跃事务
    /// - `InvalidInput`: 块位于 journal 区域内
    /// - `NoSpace`: 达到每事务块数上限，已记录的块保持不变
    pub fn log_block(&self, fs_block: u32) -> Result<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if !st.txn.is_active() {
            return Err(JournalError::NotActive.into());
        }
        let geo = st.geo;
        if geo.contains_fs_block(fs_block) {
            log::warn!("[JNL] Refusing to log journal block {}", fs_block);
            return Err(JournalError::ReservedBlock.into());
        }

        let mut image = vec![0u8; geo.block_size as usize];
        if let Some(captured) = st.txn.image_mut(fs_block) {
            self.read_fs_block(&geo, fs_block, &mut image)?;
            *captured = image;
            return Ok(());
        }

        if st.txn.is_full() {
            log::warn!("[JNL] Transaction full ({} blocks)", JNL_MAX_BLOCKS_PER_TXN);
            return Err(JournalError::TransactionFull.into());
        }

        self.read_fs_block(&geo, fs_block, &mut image)?;
        st.txn.push(fs_block, image)?;
        Ok(())
    }

    /// 丢弃当前事务（无 I/O）
    pub fn abort(&self) {
        let mut st = self.state.lock();
        if st.txn.is_active() {
            log::debug!(
                "[JNL] abort seq={} ({} blocks discarded)",
                st.txn.sequence(),
                st.txn.len()
            );
        }
        st.txn.clear();
    }

    /// 下一个空闲 journal 块
    pub fn head(&self) -> u32 {
        self.state.lock().head
    }

    /// 下一个事务序列号
    pub fn sequence(&self) -> u32 {
        self.state.lock().sequence
    }

    /// 是否有活跃事务
    pub fn is_active(&self) -> bool {
        self.state.lock().txn.is_active()
    }

    /// 当前事务已记录的块数
    pub fn logged_blocks(&self) -> usize {
        self.state.lock().txn.len()
    }

    /// 尚未检查点的记录占用的块数
    pub fn live_blocks(&self) -> u32 {
        self.state.lock().live_blocks
    }

    /// 是否已 init 或 load
    pub fn is_mounted(&self) -> bool {
        self.state.lock().mounted
    }

    /// journal 所在设备
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// 从设备重新读取超级块
    pub fn superblock(&self) -> Result<JournalSuperblock> {
        let geo = self.state.lock().geo;
        self.read_super(&geo)
    }

    // ===== 块 I/O（经过扇区缓存） =====

    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<()> {
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_BYTES).enumerate() {
            let block = Block::get(&self.cache, &self.device, lba + i as u64)?;
            block.with_data(|data| chunk.copy_from_slice(data))?;
        }
        Ok(())
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<()> {
        for (i, chunk) in buf.chunks_exact(SECTOR_BYTES).enumerate() {
            let block = Block::get(&self.cache, &self.device, lba + i as u64)?;
            block.with_data_mut(|data| data.copy_from_slice(chunk))?;
        }
        Ok(())
    }

    pub(super) fn read_jblock(&self, geo: &Geometry, jblock: u32, buf: &mut [u8]) -> Result<()> {
        self.read_sectors(geo.jblock_lba(jblock), buf)
    }

    pub(super) fn write_jblock(&self, geo: &Geometry, jblock: u32, buf: &[u8]) -> Result<()> {
        self.write_sectors(geo.jblock_lba(jblock), buf)
    }

    pub(super) fn read_fs_block(&self, geo: &Geometry, fs_block: u32, buf: &mut [u8]) -> Result<()> {
        self.read_sectors(geo.fs_block_lba(fs_block), buf)
    }

    pub(super) fn write_fs_block(&self, geo: &Geometry, fs_block: u32, buf: &[u8]) -> Result<()> {
        self.write_sectors(geo.fs_block_lba(fs_block), buf)
    }

    pub(super) fn read_super(&self, geo: &Geometry) -> Result<JournalSuperblock> {
        let mut buf = vec![0u8; geo.block_size as usize];
        self.read_jblock(geo, JNL_SUPERBLOCK_INDEX, &mut buf)?;
        Ok(JournalSuperblock::parse(&buf))
    }

    pub(super) fn write_super(&self, geo: &Geometry, sb: &JournalSuperblock) -> Result<()> {
        let mut buf = vec![0u8; geo.block_size as usize];
        sb.encode(&mut buf);
        self.write_jblock(geo, JNL_SUPERBLOCK_INDEX, &buf)
    }
}

impl core::fmt::Debug for Journal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Journal")
            .field("device", &self.device.name())
            .field("geometry", &st.geo)
            .field("head", &st.head)
            .field("sequence", &st.sequence)
            .field("live_blocks", &st.live_blocks)
            .field("active", &st.txn.is_active())
            .finish()
    }
}
