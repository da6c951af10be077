// 内存映射
//
// 职责：以只读方式共享映射文件区间，按字节切片访问

use std::fs::File;
use std::io;
use std::ops::Range;

use memmap2::{Mmap, MmapOptions};

/// 只读文件映射（MAP_SHARED）
#[derive(Debug)]
pub struct FileMap {
    mmap: Mmap,
    length: u64,
}

impl FileMap {
    /// 映射 [0, length)。块设备的 metadata 长度为 0，因此长度由调用方显式传入
    pub fn map(file: &File, length: u64) -> io::Result<Self> {
        let mmap = unsafe { MmapOptions::new().len(length as usize).map(file)? };

        Ok(Self { mmap, length })
    }

    /// 映射长度（字节）
    pub fn len(&self) -> u64 {
        self.length
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// 获取字节切片（越界部分被截断）
    pub fn bytes(&self, range: Range<u64>) -> &[u8] {
        let start = range.start.min(self.length) as usize;
        let end = range.end.min(self.length) as usize;

        if start >= end {
            return &[];
        }

        &self.mmap[start..end]
    }

    /// 完整映射内容
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..self.length as usize]
    }
}
