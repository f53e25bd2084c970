//! # 任务注册表
//!
//! 保存客户端已知的全部任务，并派生出“当前活跃任务”。
//!
//! 1. **单一写入口**：`replace_all` 整体替换，`remove` 仅用于已确认的删除
//! 2. **不做字段合并**：每次轮询用完整记录替换旧记录
//! 3. **事件驱动**：变更通过 broadcast 通道通知订阅者

pub mod events;
pub mod store;

pub use events::RegistryEvent;
pub use store::{RegistrySnapshot, TaskRegistry};
