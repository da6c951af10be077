// File Model - 文件模型
//
// 职责：以块链表示文件当前内容，
//       支持超大文件、内存映射、撤销重做与原位保存

mod block;
mod changes;
mod chunk_iter;
pub(crate) mod fileio;
mod file_model;
mod mmap;
mod result;
mod trivial;

// 重新导出
pub use self::changes::{Change, ChangeKind, ChangeLog};
pub use self::chunk_iter::ChunkIter;
pub use self::file_model::FileModel;
pub use self::mmap::FileMap;
pub use self::result::{Direction, OpenMode, OperationResult};
pub use self::trivial::TrivialFileModel;

/// 内存块容量
pub const MEMORY_BLOCK_SIZE: u64 = 4 * 1024; // 4KB
/// 物化映射块时围绕修改点保留的前缀上限
pub const MID_MEMORY_BLOCK: u64 = MEMORY_BLOCK_SIZE / 2; // 2KB
/// 自有内存总量上限
pub const MAX_MEMORY_USED: u64 = 100 * 1024 * 1024; // 100MB
