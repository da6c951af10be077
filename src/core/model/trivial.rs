// 参照文件模型
//
// 职责：以整文件重写实现同一组操作，作为差分测试的基准

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use memchr::memmem;

use crate::core::model::fileio;
use crate::core::model::mmap::FileMap;
use crate::core::model::result::Direction;

/// 参照模型：每次变更都重写整个文件
#[derive(Debug)]
pub struct TrivialFileModel {
    filename: PathBuf,
    file: Option<File>,
    read_only: bool,
    block_device: bool,
    file_size: u64,
    map: Option<FileMap>,
}

impl TrivialFileModel {
    pub fn new() -> Self {
        Self {
            filename: PathBuf::new(),
            file: None,
            read_only: true,
            block_device: false,
            file_size: 0,
            map: None,
        }
    }

    /// 是否只读
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// 是否块设备
    pub fn block_device(&self) -> bool {
        self.block_device
    }

    /// 当前长度（字节）
    pub fn length(&self) -> u64 {
        self.file_size
    }

    /// 以读写方式打开
    pub fn open(&mut self, path: &Path) -> io::Result<()> {
        if path.as_os_str().len() >= libc::PATH_MAX as usize {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "文件名过长"));
        }

        self.close();
        self.filename = path.to_path_buf();

        self.reopen()
    }

    /// 关闭文件
    pub fn close(&mut self) {
        self.read_only = true;
        self.map = None;
        self.file = None;
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.filename)?;

        let meta = file.metadata()?;
        let ftype = meta.file_type();

        if ftype.is_file() {
            self.block_device = false;
            self.file_size = meta.len();
        } else if ftype.is_block_device() {
            self.block_device = true;
            self.file_size = fileio::block_device_size(&file)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "既不是普通文件也不是块设备",
            ));
        }

        if self.file_size != 0 {
            self.map = Some(FileMap::map(&file, self.file_size)?);
        }

        self.file = Some(file);
        self.read_only = false;

        Ok(())
    }

    fn map_bytes(&self, off: u64, end: u64) -> &[u8] {
        match &self.map {
            Some(map) => map.bytes(off..end),
            None => &[],
        }
    }

    /// 覆盖 [off, off + data.len())
    pub fn modify(&mut self, off: u64, data: &[u8]) -> bool {
        if self.read_only {
            return false;
        }

        match off.checked_add(data.len() as u64) {
            Some(end) if end <= self.file_size => {}
            _ => return false,
        }

        if data.is_empty() {
            return true;
        }

        let ok = match &self.file {
            Some(file) => fileio::pwrite_full(file, data, off).is_ok(),
            None => false,
        };
        if !ok {
            return false;
        }

        self.close();

        self.reopen().is_ok()
    }

    /// 在 off 处插入
    pub fn add(&mut self, off: u64, data: &[u8]) -> bool {
        if self.read_only {
            return false;
        }

        if self.block_device {
            return false;
        }

        if data.is_empty() {
            return true;
        }

        if off > self.file_size {
            return false;
        }

        let tmpname = tmp_file_name(&self.filename);
        let tmp = match File::create(&tmpname) {
            Ok(tmp) => tmp,
            Err(_) => return false,
        };

        // 前缀、新内容、后缀依次写入临时文件
        let ok = fileio::pwrite_full(&tmp, self.map_bytes(0, off), 0).is_ok()
            && fileio::pwrite_full(&tmp, data, off).is_ok()
            && fileio::pwrite_full(
                &tmp,
                self.map_bytes(off, self.file_size),
                off + data.len() as u64,
            )
            .is_ok();

        drop(tmp);

        if !ok {
            let _ = fs::remove_file(&tmpname);
            return false;
        }

        self.close();

        if fs::rename(&tmpname, &self.filename).is_err() {
            return false;
        }

        self.reopen().is_ok()
    }

    /// 删除从 off 起最多 len 个字节
    pub fn remove(&mut self, off: u64, len: u64) -> bool {
        if self.read_only {
            return false;
        }

        if self.block_device {
            return false;
        }

        if len == 0 {
            return true;
        }

        if off >= self.file_size {
            return false;
        }

        let end = off.saturating_add(len).min(self.file_size);

        let tmpname = tmp_file_name(&self.filename);
        let tmp = match File::create(&tmpname) {
            Ok(tmp) => tmp,
            Err(_) => return false,
        };

        // 跳过被删除的区间，前后两段拼接
        let ok = fileio::pwrite_full(&tmp, self.map_bytes(0, off), 0).is_ok()
            && fileio::pwrite_full(&tmp, self.map_bytes(end, self.file_size), off).is_ok();

        drop(tmp);

        if !ok {
            let _ = fs::remove_file(&tmpname);
            return false;
        }

        self.close();

        if fs::rename(&tmpname, &self.filename).is_err() {
            return false;
        }

        self.reopen().is_ok()
    }

    /// 从 off 起读取至多 out.len() 个字节
    pub fn get(&self, off: u64, out: &mut [u8]) -> Option<usize> {
        if off >= self.file_size {
            return None;
        }

        let n = (out.len() as u64).min(self.file_size - off) as usize;
        out[..n].copy_from_slice(self.map_bytes(off, off + n as u64));

        Some(n)
    }

    /// 按方向搜索子串
    pub fn find(&self, off: u64, dir: Direction, needle: &[u8]) -> Option<u64> {
        match dir {
            Direction::Forward => self.find_forward(off, needle),
            Direction::Backward => self.find_backward(off, needle),
        }
    }

    fn find_forward(&self, off: u64, needle: &[u8]) -> Option<u64> {
        match off.checked_add(needle.len() as u64) {
            Some(end) if end <= self.file_size => {}
            _ => return None,
        }

        if needle.is_empty() {
            return None;
        }

        memmem::find(self.map_bytes(off, self.file_size), needle).map(|hit| off + hit as u64)
    }

    fn find_backward(&self, off: u64, needle: &[u8]) -> Option<u64> {
        let needlelen = needle.len() as u64;

        if needlelen > self.file_size {
            return None;
        }

        if needle.is_empty() {
            return None;
        }

        // 匹配起点不大于 off
        let start = off.min(self.file_size - needlelen);

        memmem::rfind(self.map_bytes(0, start + needlelen), needle).map(|hit| hit as u64)
    }
}

impl Default for TrivialFileModel {
    fn default() -> Self {
        Self::new()
    }
}

fn tmp_file_name(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");

    PathBuf::from(name)
}
