// Editor Core - 编辑器核心
//
// 职责：文件模型引擎：块链、变更日志、搜索与参照模型

pub mod model;

pub use model::{
    Change, ChangeKind, ChangeLog, ChunkIter, Direction, FileModel, OpenMode,
    OperationResult, TrivialFileModel,
};
