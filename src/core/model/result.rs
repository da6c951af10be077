// 操作结果
//
// 职责：定义编辑操作的结果码、打开模式与搜索方向

use std::fmt;

/// 编辑操作结果码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    ErrorReadOnly,
    ErrorBlockDevice,
    InvalidOperation,
    ChangeBiggerMaxMemoryUsed,
    NoMemory,
    ErrorNeedSave,
    ErrorUndoDisabled,
    NoMoreChanges,
    Success,
}

impl OperationResult {
    /// 稳定的文本名称（错误消息中使用）
    pub fn as_str(self) -> &'static str {
        match self {
            OperationResult::ErrorReadOnly => "ErrorReadOnly",
            OperationResult::ErrorBlockDevice => "ErrorBlockDevice",
            OperationResult::InvalidOperation => "InvalidOperation",
            OperationResult::ChangeBiggerMaxMemoryUsed => "ChangeBiggerMaxMemoryUsed",
            OperationResult::NoMemory => "NoMemory",
            OperationResult::ErrorNeedSave => "ErrorNeedSave",
            OperationResult::ErrorUndoDisabled => "ErrorUndoDisabled",
            OperationResult::NoMoreChanges => "NoMoreChanges",
            OperationResult::Success => "Success",
        }
    }

    /// 是否成功
    pub fn is_success(self) -> bool {
        self == OperationResult::Success
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 打开模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

/// 搜索方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}
