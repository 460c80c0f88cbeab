//! Journal 磁盘格式定义
//!
//! # 重要说明
//!
//! - **所有字段都是小端序（little-endian）的 u32**
//! - 用 `byteorder` 按偏移读写，不依赖内存布局
//! - 每种记录占一个完整的 journal 块，头部之后补 0
//!
//! ```text
//! 超级块 (journal 块 0):
//!   0 magic | 4 blocksize | 8 maxlen | 12 first | 16 sequence
//!  20 start | 24 errno    | 28 flags | 32..512 填充
//!
//! 描述符块:
//!   0 magic | 4 type | 8 sequence | 12 count | 16.. tag[count] {blocknr, flags}
//!
//! 提交块:
//!   0 magic | 4 type | 8 sequence | 12 checksum
//! ```

use crate::consts::*;
use alloc::vec::Vec;
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

/// 超级块记录长度
pub const SUPERBLOCK_SIZE: usize = 512;

/// 描述符块头长度
pub const DESCRIPTOR_HEADER_SIZE: usize = 16;

/// 块标签长度
pub const TAG_SIZE: usize = 8;

bitflags! {
    /// 超级块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JournalFlags: u32 {
        /// Journal 干净，不需要恢复
        const CLEAN = 0x01;
    }
}

bitflags! {
    /// 块标签标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TagFlags: u32 {
        /// 描述符中的最后一个标签
        const LAST = 0x01;
        /// 数据块以 magic 开头而被转义（保留，写入时从不设置）
        const ESCAPE = 0x02;
    }
}

/// 读取块头：(magic, blocktype, sequence)
fn read_header(buf: &[u8]) -> (u32, u32, u32) {
    (
        LittleEndian::read_u32(&buf[0..4]),
        LittleEndian::read_u32(&buf[4..8]),
        LittleEndian::read_u32(&buf[8..12]),
    )
}

fn write_header(buf: &mut [u8], blocktype: u32, sequence: u32) {
    LittleEndian::write_u32(&mut buf[0..4], JNL_MAGIC);
    LittleEndian::write_u32(&mut buf[4..8], blocktype);
    LittleEndian::write_u32(&mut buf[8..12], sequence);
}

// =============================================================================
// Superblock
// =============================================================================

/// Journal 超级块
///
/// 不变量：只有 `start == 0` 时才设置 CLEAN。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalSuperblock {
    /// 魔数 (`JNL_MAGIC`)
    pub magic: u32,
    /// 块大小，必须与文件系统块大小一致
    pub block_size: u32,
    /// journal 总块数（包括超级块）
    pub maxlen: u32,
    /// 第一个可用块
    pub first: u32,
    /// 下一个事务序列号
    pub sequence: u32,
    /// 最早未检查点事务的起始块（0 = 空）
    pub start: u32,
    /// 上次恢复的结果代码
    pub errno: u32,
    /// 标志
    pub flags: JournalFlags,
}

impl JournalSuperblock {
    /// 新建空 journal 的超级块
    pub fn fresh(block_size: u32, maxlen: u32) -> Self {
        Self {
            magic: JNL_MAGIC,
            block_size,
            maxlen,
            first: JNL_FIRST_USABLE,
            sequence: JNL_INITIAL_SEQUENCE,
            start: 0,
            errno: 0,
            flags: JournalFlags::CLEAN,
        }
    }

    /// 从块数据解析（不校验 magic）
    pub fn parse(buf: &[u8]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&buf[0..4]),
            block_size: LittleEndian::read_u32(&buf[4..8]),
            maxlen: LittleEndian::read_u32(&buf[8..12]),
            first: LittleEndian::read_u32(&buf[12..16]),
            sequence: LittleEndian::read_u32(&buf[16..20]),
            start: LittleEndian::read_u32(&buf[20..24]),
            errno: LittleEndian::read_u32(&buf[24..28]),
            flags: JournalFlags::from_bits_retain(LittleEndian::read_u32(&buf[28..32])),
        }
    }

    /// 编码到块缓冲区，其余部分补 0
    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.block_size);
        LittleEndian::write_u32(&mut buf[8..12], self.maxlen);
        LittleEndian::write_u32(&mut buf[12..16], self.first);
        LittleEndian::write_u32(&mut buf[16..20], self.sequence);
        LittleEndian::write_u32(&mut buf[20..24], self.start);
        LittleEndian::write_u32(&mut buf[24..28], self.errno);
        LittleEndian::write_u32(&mut buf[28..32], self.flags.bits());
    }

    /// 魔数是否正确
    pub fn has_valid_magic(&self) -> bool {
        self.magic == JNL_MAGIC
    }

    /// 是否干净
    pub fn is_clean(&self) -> bool {
        self.flags.contains(JournalFlags::CLEAN)
    }
}

// =============================================================================
// Descriptor Block
// =============================================================================

/// 块标签：描述一个被记录的文件系统块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTag {
    /// 文件系统块号
    pub blocknr: u32,
    /// 标签标志
    pub flags: TagFlags,
}

/// 描述符块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// 事务序列号
    pub sequence: u32,
    /// 头部声明的标签数量（可能超出上限，由调用者校验）
    pub count: u32,
    /// 标签，`count` 超出上限时为空
    pub tags: Vec<BlockTag>,
}

impl Descriptor {
    /// 由块号列表构造，最后一个标签带 LAST
    pub fn new(sequence: u32, blocknrs: impl ExactSizeIterator<Item = u32>) -> Self {
        let n = blocknrs.len();
        let tags = blocknrs
            .enumerate()
            .map(|(i, blocknr)| BlockTag {
                blocknr,
                flags: if i + 1 == n { TagFlags::LAST } else { TagFlags::empty() },
            })
            .collect();
        Self {
            sequence,
            count: n as u32,
            tags,
        }
    }

    /// 解析描述符块，magic 或类型不匹配时返回 None
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let (magic, blocktype, sequence) = read_header(buf);
        if magic != JNL_MAGIC || blocktype != JNL_BLOCK_DESCRIPTOR {
            return None;
        }
        let count = LittleEndian::read_u32(&buf[12..16]);

        let mut tags = Vec::new();
        if (1..=JNL_MAX_BLOCKS_PER_TXN as u32).contains(&count) {
            tags.reserve(count as usize);
            for i in 0..count as usize {
                let off = DESCRIPTOR_HEADER_SIZE + i * TAG_SIZE;
                tags.push(BlockTag {
                    blocknr: LittleEndian::read_u32(&buf[off..off + 4]),
                    flags: TagFlags::from_bits_retain(LittleEndian::read_u32(&buf[off + 4..off + 8])),
                });
            }
        }

        Some(Self { sequence, count, tags })
    }

    /// 编码到块缓冲区，其余部分补 0
    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        write_header(buf, JNL_BLOCK_DESCRIPTOR, self.sequence);
        LittleEndian::write_u32(&mut buf[12..16], self.tags.len() as u32);
        for (i, tag) in self.tags.iter().enumerate() {
            let off = DESCRIPTOR_HEADER_SIZE + i * TAG_SIZE;
            LittleEndian::write_u32(&mut buf[off..off + 4], tag.blocknr);
            LittleEndian::write_u32(&mut buf[off + 4..off + 8], tag.flags.bits());
        }
    }
}

// =============================================================================
// Commit Block
// =============================================================================

/// 提交块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitBlock {
    /// 事务序列号，必须与描述符一致
    pub sequence: u32,
    /// 全部数据块的 XOR 校验和
    pub checksum: u32,
}

impl CommitBlock {
    /// 解析提交块，magic 或类型不匹配时返回 None
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let (magic, blocktype, sequence) = read_header(buf);
        if magic != JNL_MAGIC || blocktype != JNL_BLOCK_COMMIT {
            return None;
        }
        Some(Self {
            sequence,
            checksum: LittleEndian::read_u32(&buf[12..16]),
        })
    }

    /// 编码到块缓冲区，其余部分补 0
    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        write_header(buf, JNL_BLOCK_COMMIT, self.sequence);
        LittleEndian::write_u32(&mut buf[12..16], self.checksum);
    }
}
