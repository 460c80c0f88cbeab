//! 块设备抽象
//!
//! 提供统一的扇区读写接口，物理设备和分区（虚拟设备）都遵循同一套约定。
//! block/device.rs 定义 `BlockDevice` 能力、设备记录 `Device` 和分区地址转换 `PartitionDev`

//! block/registry.rs 提供设备表：注册、按名称查找、创建分区子设备

//! block/lock.rs 把需要独占访问的驱动包装成可共享的设备

mod device;
mod lock;
mod registry;

pub use device::{BlockDevice, Device, DeviceId, PartitionDev, PartitionInfo};
pub use lock::{LockedDevice, RawBlockDevice};
pub use registry::DeviceRegistry;
