// bedit - 大文件字节编辑器核心库
//
// Copyright (c) 2025 bedit team
//
// Licensed under MIT License

pub mod core;
pub mod fsutil;

pub use crate::core::model::{
    ChangeKind, ChangeLog,
    Direction, OpenMode, OperationResult,
    FileModel, TrivialFileModel,
};
