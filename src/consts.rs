//! 块存储常量定义
//!
//! 这个模块包含了块存储核心的所有常量定义，包括：
//! - 扇区和设备表容量
//! - 缓存容量
//! - MBR / GPT 分区表布局
//! - Journal 磁盘格式

//=============================================================================
// 基础常量
//=============================================================================

/// 扇区大小（字节），本子系统所有计算都以此为单位
pub const SECTOR_SIZE: u32 = 512;

/// 扇区大小（usize 版本，方便切片运算）
pub const SECTOR_BYTES: usize = SECTOR_SIZE as usize;

/// 设备表最大容量
pub const MAX_BLOCK_DEVICES: usize = 16;

/// 设备名最大长度（字节）
pub const DEVICE_NAME_MAX: usize = 32;

/// 分区名中保留的父设备名最大长度
pub const PARTITION_PARENT_NAME_MAX: usize = 28;

//=============================================================================
// 缓存
//=============================================================================

/// 默认缓存块数量（128 × 512 字节 = 64 KiB）
pub const DEFAULT_CACHE_SIZE: usize = 128;

//=============================================================================
// MBR
//=============================================================================

/// MBR 分区表在扇区内的偏移
pub const MBR_PARTITION_TABLE_OFFSET: usize = 446;

/// MBR 分区项大小
pub const MBR_ENTRY_SIZE: usize = 16;

/// MBR 分区项数量
pub const MBR_ENTRY_COUNT: usize = 4;

/// MBR 签名偏移
pub const MBR_SIGNATURE_OFFSET: usize = 510;

/// MBR 签名（小端存储为 0x55 0xAA）
pub const MBR_SIGNATURE: u16 = 0xAA55;

//=============================================================================
// GPT
//=============================================================================

/// GPT 头部所在 LBA
pub const GPT_HEADER_LBA: u64 = 1;

/// GPT 签名
pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

/// 解析的分区项上限（不论头部声明多少）
pub const GPT_MAX_ENTRIES: u32 = 128;

/// GPT 分区项最小大小
pub const GPT_MIN_ENTRY_SIZE: u32 = 128;

/// GPT 分区名长度（UTF-16LE 码元数）
pub const GPT_NAME_UNITS: usize = 36;

//=============================================================================
// Journal
//=============================================================================

/// Journal 魔数 ("JRNL")
pub const JNL_MAGIC: u32 = 0x4A52_4E4C;

/// 块类型：superblock
pub const JNL_BLOCK_SUPER: u32 = 1;

/// 块类型：描述符块
pub const JNL_BLOCK_DESCRIPTOR: u32 = 2;

/// 块类型：提交块
pub const JNL_BLOCK_COMMIT: u32 = 3;

/// 块类型：撤销块（保留，不实现）
pub const JNL_BLOCK_REVOKE: u32 = 4;

/// Journal 最少块数
pub const JNL_MIN_BLOCKS: u32 = 8;

/// 每个事务最多记录的元数据块
pub const JNL_MAX_BLOCKS_PER_TXN: usize = 32;

/// 恢复扫描的迭代上限
pub const JNL_RECOVERY_PASS_LIMIT: usize = 256;

/// Journal superblock 所在块（永久排除在环形区域之外）
pub const JNL_SUPERBLOCK_INDEX: u32 = 0;

/// 第一个可用 journal 块
pub const JNL_FIRST_USABLE: u32 = 1;

/// 初始事务序列号
pub const JNL_INITIAL_SEQUENCE: u32 = 1;
