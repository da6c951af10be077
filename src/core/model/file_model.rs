// 文件模型核心实现
//
// 职责：维护块链与变更日志，实现 修改/插入/删除、
//       撤销重做、双向搜索以及两种保存方式

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use memchr::memmem;
use tracing::debug;

use crate::core::model::block::{BlockChain, BlockData, SENTINEL};
use crate::core::model::changes::{ChangeKind, ChangeLog};
use crate::core::model::chunk_iter::ChunkIter;
use crate::core::model::fileio;
use crate::core::model::mmap::FileMap;
use crate::core::model::result::{Direction, OpenMode, OperationResult};
use crate::core::model::{MAX_MEMORY_USED, MEMORY_BLOCK_SIZE, MID_MEMORY_BLOCK};

/// 文件模型
#[derive(Debug)]
pub struct FileModel {
    // --- 撤销重做 ---
    undo_enabled: bool,
    changes: ChangeLog,
    nchange: usize,

    // --- 打开的文件 ---
    filename: PathBuf,
    file: Option<File>,
    mode: OpenMode,
    read_only: bool,
    block_device: bool,
    file_size: u64,
    map: Option<FileMap>,

    // --- 当前内容 ---
    chain: BlockChain,
    len: u64,
    memory_used: u64,
    max_memory_used: u64,
    modified: bool,
    size_modified: bool,
}

// ========== 构造方法 ==========

impl FileModel {
    pub fn new(undo_enabled: bool) -> Self {
        Self::with_limits(undo_enabled, MAX_MEMORY_USED)
    }

    /// 指定自有内存上限（测试用；默认值见 MAX_MEMORY_USED）
    pub fn with_limits(undo_enabled: bool, max_memory_used: u64) -> Self {
        Self {
            undo_enabled,
            changes: ChangeLog::new(),
            nchange: 0,
            filename: PathBuf::new(),
            file: None,
            mode: OpenMode::ReadWrite,
            read_only: true,
            block_device: false,
            file_size: 0,
            map: None,
            chain: BlockChain::new(),
            len: 0,
            memory_used: 0,
            max_memory_used,
            modified: false,
            size_modified: false,
        }
    }
}

impl Default for FileModel {
    fn default() -> Self {
        Self::new(true)
    }
}

// ========== 基本查询 ==========

impl FileModel {
    /// 是否只读
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// 是否块设备
    pub fn block_device(&self) -> bool {
        self.block_device
    }

    /// 当前逻辑长度（字节）
    pub fn length(&self) -> u64 {
        self.len
    }

    /// 自有缓冲区占用的内存总量
    pub fn memory_used(&self) -> u64 {
        self.memory_used
    }

    /// 自上次打开或保存以来是否发生过修改
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// 自上次打开或保存以来长度是否发生过变化
    pub fn size_modified(&self) -> bool {
        self.size_modified
    }

    /// 变更日志
    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// 已应用的变更数（日志游标）
    pub fn nchange(&self) -> usize {
        self.nchange
    }

    /// 链上的块数
    pub fn block_count(&self) -> usize {
        self.chain.count()
    }

    /// 按链序产出各块负载
    pub fn chunks(&self) -> ChunkIter<'_> {
        ChunkIter::new(&self.chain, self.map.as_ref())
    }
}

// ========== 打开 / 关闭 / 保存 ==========

impl FileModel {
    /// 打开文件并以单个映射块覆盖全部内容。
    /// 启用撤销时清空变更日志；保存后的自重开不经过此入口
    pub fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<()> {
        if path.as_os_str().len() >= libc::PATH_MAX as usize {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "文件名过长"));
        }

        self.close();

        self.filename = path.to_path_buf();
        self.mode = mode;

        if self.undo_enabled {
            self.changes.clear();
            self.nchange = 0;
        }

        self.reopen()
    }

    /// 关闭文件，回到空状态。变更日志保留
    pub fn close(&mut self) {
        self.read_only = true;
        self.len = 0;
        self.memory_used = 0;

        self.chain.clear();
        self.map = None;
        self.file = None;

        self.modified = false;
        self.size_modified = false;
    }

    /// 保存。长度未变时原位写回自有块；
    /// 否则整链写入临时文件后改名覆盖。成功后自动重开
    pub fn save(&mut self) -> io::Result<()> {
        if !self.modified {
            return Ok(());
        }

        if !self.size_modified {
            return self.save_in_place();
        }

        let tmpname = tmp_file_name(&self.filename);

        let tmp = File::create(&tmpname)?;
        for chunk in self.chunks() {
            if let Err(e) = fileio::write_full(&tmp, chunk) {
                drop(tmp);
                let _ = fs::remove_file(&tmpname);

                return Err(e);
            }
        }
        drop(tmp);

        debug!(file = %self.filename.display(), "save: rewrite through temp");

        self.close();
        fs::rename(&tmpname, &self.filename)?;

        self.reopen()
    }

    // 以当前文件名和模式重新打开；日志与游标保持不变
    fn reopen(&mut self) -> io::Result<()> {
        let read_only = self.mode == OpenMode::ReadOnly;

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&self.filename)?;

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
            let map = FileMap::map(&file, self.file_size)?;
            let idx = self
                .chain
                .alloc(BlockData::Mapped { map_off: 0 }, self.file_size);
            self.chain.link_after(SENTINEL, idx);
            self.map = Some(map);
        }

        self.read_only = read_only;
        self.file = Some(file);
        self.len = self.file_size;

        debug!(
            file = %self.filename.display(),
            size = self.file_size,
            block_device = self.block_device,
            "opened"
        );

        Ok(())
    }

    fn save_in_place(&mut self) -> io::Result<()> {
        let file = match &self.file {
            Some(file) => file,
            None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "文件未打开")),
        };

        // 只写回自有块，映射块的内容本来就在文件里
        let mut off = 0;
        let mut idx = self.chain.first();
        while idx != SENTINEL {
            let b = self.chain.block(idx);
            if let BlockData::Owned(buf) = &b.data {
                fileio::pwrite_full(file, &buf[..b.len as usize], off)?;
            }

            off += b.len;
            idx = b.next;
        }

        debug!(file = %self.filename.display(), "save: in place");

        self.close();

        self.reopen()
    }
}

// ========== 编辑操作 ==========

impl FileModel {
    /// 覆盖 [off, off + data.len()) 的内容，不改变长度
    pub fn modify(&mut self, off: u64, data: &[u8]) -> OperationResult {
        self.do_modify(off, data, true)
    }

    /// 在 off 处插入内容；off 等于当前长度时为追加
    pub fn add(&mut self, off: u64, data: &[u8]) -> OperationResult {
        self.do_add(off, data, true)
    }

    /// 删除从 off 起最多 len 个字节（截断到文件末尾）
    pub fn remove(&mut self, off: u64, len: u64) -> OperationResult {
        self.do_remove(off, len, true)
    }

    fn do_modify(&mut self, off: u64, mut data: &[u8], record: bool) -> OperationResult {
        if self.read_only {
            return OperationResult::ErrorReadOnly;
        }

        let len = data.len() as u64;

        // 修改不得越过文件末尾
        match off.checked_add(len) {
            Some(end) if end <= self.len => {}
            _ => return OperationResult::InvalidOperation,
        }

        if len > self.max_memory_used {
            return OperationResult::ChangeBiggerMaxMemoryUsed;
        }

        let (mut bidx, mut pos) = match self.chain.seek(off) {
            Some(v) => v,
            // 文件为空
            None => return OperationResult::InvalidOperation,
        };

        if data.is_empty() {
            return OperationResult::Success;
        }

        if self.memory_used + len > self.max_memory_used {
            return OperationResult::ErrorNeedSave;
        }

        let record = record && self.undo_enabled;
        if record {
            let mut old = vec![0u8; data.len()];
            self.read_from(bidx, pos, &mut old);

            self.changes.truncate(self.nchange);
            self.changes.modify(off, old, data);
        }

        loop {
            let (blen, next, mapped_off) = {
                let b = self.chain.block(bidx);
                let mapped_off = match &b.data {
                    BlockData::Mapped { map_off } => Some(*map_off),
                    BlockData::Owned(_) => None,
                };
                (b.len, b.next, mapped_off)
            };

            match mapped_off {
                Some(map_off) => {
                    // 映射块：围绕 pos 物化一个内存块
                    let mut buf = vec![0u8; MEMORY_BLOCK_SIZE as usize].into_boxed_slice();

                    let begin;
                    let mut count;
                    {
                        let src = self.map_bytes(map_off, blen);

                        // 复制修改点之前的前缀，至多半块
                        if pos <= MID_MEMORY_BLOCK {
                            begin = 0;
                            count = pos;
                            if pos > 0 {
                                buf[..pos as usize].copy_from_slice(&src[..pos as usize]);
                            }
                        } else {
                            begin = pos - MID_MEMORY_BLOCK;
                            count = MID_MEMORY_BLOCK;
                            buf[..count as usize]
                                .copy_from_slice(&src[begin as usize..pos as usize]);
                        }

                        let mut room = MEMORY_BLOCK_SIZE - count;

                        let mut l = (data.len() as u64).min(room);
                        if pos + l > blen {
                            l = blen - pos;
                        }

                        buf[count as usize..(count + l) as usize]
                            .copy_from_slice(&data[..l as usize]);
                        data = &data[l as usize..];

                        count += l;
                        room -= l;

                        // 用户数据耗尽而缓冲区有剩余空间时，用映射块尾部补齐
                        if data.is_empty() && room > 0 {
                            let end = pos + l;
                            if end < blen {
                                let tail = (blen - end).min(room);
                                buf[count as usize..(count + tail) as usize].copy_from_slice(
                                    &src[end as usize..(end + tail) as usize],
                                );
                                count += tail;
                            }
                        }
                    }

                    let nextblk;
                    if begin == 0 {
                        if count == blen {
                            // 内存块恰好覆盖整个映射块：就地替换节点
                            let b = self.chain.block_mut(bidx);
                            b.data = BlockData::Owned(buf);
                            nextblk = b.next;
                        } else {
                            // 映射块左移 count 字节，内存块链入其前
                            let memidx = self.chain.alloc(BlockData::Owned(buf), count);
                            {
                                let b = self.chain.block_mut(bidx);
                                if let BlockData::Mapped { map_off } = &mut b.data {
                                    *map_off += count;
                                }
                                b.len -= count;
                            }
                            self.chain.link_before(bidx, memidx);
                            nextblk = bidx;
                        }
                    } else {
                        let memidx = self.chain.alloc(BlockData::Owned(buf), count);

                        let end = begin + count;
                        if end < blen {
                            // 映射块分裂为左右两段，内存块居中
                            let diskidx = self.chain.alloc(
                                BlockData::Mapped {
                                    map_off: map_off + end,
                                },
                                blen - end,
                            );

                            self.chain.block_mut(bidx).len = begin;
                            self.chain.link_after(bidx, memidx);
                            self.chain.link_after(memidx, diskidx);
                            nextblk = diskidx;
                        } else {
                            self.chain.block_mut(bidx).len = begin;
                            self.chain.link_after(bidx, memidx);
                            nextblk = next;
                        }
                    }

                    self.memory_used += MEMORY_BLOCK_SIZE;
                    bidx = nextblk;
                }
                None => {
                    // 内存块：就地覆盖
                    let l = (data.len() as u64).min(blen - pos);

                    if let BlockData::Owned(buf) = &mut self.chain.block_mut(bidx).data {
                        buf[pos as usize..(pos + l) as usize].copy_from_slice(&data[..l as usize]);
                    }
                    data = &data[l as usize..];

                    bidx = next;
                }
            }

            pos = 0;

            if data.is_empty() {
                break;
            }
        }

        self.modified = true;

        if record {
            self.nchange += 1;
        }

        OperationResult::Success
    }

    fn do_add(&mut self, mut off: u64, mut data: &[u8], record: bool) -> OperationResult {
        if self.read_only {
            return OperationResult::ErrorReadOnly;
        }

        if self.block_device {
            return OperationResult::ErrorBlockDevice;
        }

        let len = data.len() as u64;
        if len > self.max_memory_used {
            return OperationResult::ChangeBiggerMaxMemoryUsed;
        }

        let (bidx, pos) = match self.chain.seek(off) {
            Some(v) => v,
            None => {
                if off != self.len {
                    return OperationResult::InvalidOperation;
                }
                // 追加：定位到最后一个块的末尾
                let last = self.chain.last();
                (last, self.chain.block(last).len)
            }
        };

        if data.is_empty() {
            return OperationResult::Success;
        }

        if self.memory_used + len > self.max_memory_used {
            return OperationResult::ErrorNeedSave;
        }

        let record = record && self.undo_enabled;
        if record {
            self.changes.truncate(self.nchange);
            self.changes.add(off, data);
        }

        if self.chain.block(bidx).in_memory() {
            let blen = self.chain.block(bidx).len;
            let room = MEMORY_BLOCK_SIZE - blen;

            if len <= room {
                // 整段放得下：块内右移后写入
                if let BlockData::Owned(buf) = &mut self.chain.block_mut(bidx).data {
                    let p = pos as usize;
                    buf.copy_within(p..blen as usize, p + data.len());
                    buf[p..p + data.len()].copy_from_slice(data);
                }
                self.chain.block_mut(bidx).len += len;

                self.len += len;

                self.modified = true;
                self.size_modified = true;

                if record {
                    self.nchange += 1;
                }

                return OperationResult::Success;
            } else if off == self.len && room > 0 {
                // 尾部追加：先填满当前块，剩余部分走整块分配
                if let BlockData::Owned(buf) = &mut self.chain.block_mut(bidx).data {
                    buf[blen as usize..].copy_from_slice(&data[..room as usize]);
                }
                self.chain.block_mut(bidx).len = MEMORY_BLOCK_SIZE;

                data = &data[room as usize..];

                self.len += room;
                off += room;

                self.modified = true;
                self.size_modified = true;
            }
        }

        // 为剩余数据构造整块列表
        let remaining = data.len() as u64;
        let mut new_blocks = Vec::new();
        while !data.is_empty() {
            let l = data.len().min(MEMORY_BLOCK_SIZE as usize);
            let mut buf = vec![0u8; MEMORY_BLOCK_SIZE as usize].into_boxed_slice();
            buf[..l].copy_from_slice(&data[..l]);
            data = &data[l..];

            new_blocks.push(self.chain.alloc(BlockData::Owned(buf), l as u64));
        }

        let mut nblocks = new_blocks.len() as u64;

        if pos == 0 {
            // 链入当前块之前
            for &nb in &new_blocks {
                self.chain.link_before(bidx, nb);
            }
        } else if off != self.len {
            // 块中间：在 pos 处切分，新列表置于两半之间
            let blen = self.chain.block(bidx).len;
            let l = blen - pos;

            let right = match &self.chain.block(bidx).data {
                BlockData::Mapped { map_off } => BlockData::Mapped {
                    map_off: map_off + pos,
                },
                BlockData::Owned(buf) => {
                    let mut suffix = vec![0u8; MEMORY_BLOCK_SIZE as usize].into_boxed_slice();
                    suffix[..l as usize].copy_from_slice(&buf[pos as usize..blen as usize]);
                    nblocks += 1;
                    BlockData::Owned(suffix)
                }
            };
            let rightidx = self.chain.alloc(right, l);

            self.chain.block_mut(bidx).len = pos;

            let mut at = bidx;
            for &nb in &new_blocks {
                self.chain.link_after(at, nb);
                at = nb;
            }
            self.chain.link_after(at, rightidx);
        } else {
            // 追加到文件末尾：链入哨兵之前
            for &nb in &new_blocks {
                self.chain.link_before(SENTINEL, nb);
            }
        }

        self.len += remaining;
        self.memory_used += nblocks * MEMORY_BLOCK_SIZE;

        self.modified = true;
        self.size_modified = true;

        if record {
            self.nchange += 1;
        }

        OperationResult::Success
    }

    fn do_remove(&mut self, off: u64, mut len: u64, record: bool) -> OperationResult {
        if self.read_only {
            return OperationResult::ErrorReadOnly;
        }

        if self.block_device {
            return OperationResult::ErrorBlockDevice;
        }

        let (mut bidx, pos) = match self.chain.seek(off) {
            Some(v) => v,
            None => return OperationResult::InvalidOperation,
        };

        if len == 0 {
            return OperationResult::Success;
        }

        let record = record && self.undo_enabled;
        if record {
            // 旧内容按截断后的长度记录
            let clamped = len.min(self.len - off);
            let mut old = vec![0u8; clamped as usize];
            self.read_from(bidx, pos, &mut old);

            self.changes.truncate(self.nchange);
            self.changes.remove(off, old);
        }

        if off + len > self.len {
            len = self.len - off;
        }
        let total = len;

        let blen = self.chain.block(bidx).len;
        let n = pos + len;

        if n < blen {
            // 删除范围完全在块内
            if self.chain.block(bidx).in_memory() {
                let b = self.chain.block_mut(bidx);
                if let BlockData::Owned(buf) = &mut b.data {
                    buf.copy_within(n as usize..blen as usize, pos as usize);
                }
                b.len -= len;
            } else if pos == 0 {
                let b = self.chain.block_mut(bidx);
                if let BlockData::Mapped { map_off } = &mut b.data {
                    *map_off += len;
                }
                b.len -= len;
            } else if let BlockData::Mapped { map_off } = self.chain.block(bidx).data {
                // 围绕空洞分裂为两个映射块
                let rightidx = self.chain.alloc(
                    BlockData::Mapped {
                        map_off: map_off + n,
                    },
                    blen - n,
                );
                self.chain.block_mut(bidx).len = pos;
                self.chain.link_after(bidx, rightidx);
            }
        } else if n == blen {
            // 恰好删到块尾
            if pos == 0 {
                if self.chain.block(bidx).in_memory() {
                    self.memory_used -= MEMORY_BLOCK_SIZE;
                }
                self.chain.unlink(bidx);
            } else {
                self.chain.block_mut(bidx).len = pos;
            }
        } else {
            // 跨块删除
            if pos != 0 {
                let b = self.chain.block_mut(bidx);
                len -= b.len - pos;
                b.len = pos;
                bidx = b.next;
            }

            let prev = self.chain.block(bidx).prev;

            loop {
                let (blen, next, in_memory) = {
                    let b = self.chain.block(bidx);
                    (b.len, b.next, b.in_memory())
                };

                if len >= blen {
                    // 整块覆盖：释放
                    if in_memory {
                        self.memory_used -= MEMORY_BLOCK_SIZE;
                    }
                    self.chain.release(bidx);

                    len -= blen;
                    bidx = next;

                    if len == 0 {
                        break;
                    }
                } else {
                    // 部分覆盖：从左侧裁剪
                    let b = self.chain.block_mut(bidx);
                    match &mut b.data {
                        BlockData::Mapped { map_off } => *map_off += len,
                        BlockData::Owned(buf) => {
                            buf.copy_within(len as usize..blen as usize, 0);
                        }
                    }
                    b.len -= len;

                    break;
                }
            }

            self.chain.relink(prev, bidx);
        }

        self.len -= total;

        self.modified = true;
        self.size_modified = true;

        if record {
            self.nchange += 1;
        }

        OperationResult::Success
    }
}

// ========== 撤销 / 重做 ==========

impl FileModel {
    /// 撤销最近一次已应用的变更
    pub fn undo(&mut self) -> OperationResult {
        if self.read_only {
            return OperationResult::ErrorReadOnly;
        }

        if !self.undo_enabled {
            return OperationResult::ErrorUndoDisabled;
        }

        if self.nchange == 0 {
            return OperationResult::NoMoreChanges;
        }

        let (kind, off, len, old) = match self.changes.get(self.nchange - 1) {
            Some(c) => (c.kind, c.off, c.len, c.old.clone()),
            None => return OperationResult::NoMoreChanges,
        };

        // 逆向重放，不再记录
        let res = match (kind, old) {
            (ChangeKind::Modify, Some(old)) => self.do_modify(off, &old, false),
            (ChangeKind::Add, _) => self.do_remove(off, len, false),
            (ChangeKind::Remove, Some(old)) => self.do_add(off, &old, false),
            _ => OperationResult::InvalidOperation,
        };

        if res == OperationResult::Success {
            self.nchange -= 1;
        }

        res
    }

    /// 重做最近一次被撤销的变更
    pub fn redo(&mut self) -> OperationResult {
        if self.read_only {
            return OperationResult::ErrorReadOnly;
        }

        if !self.undo_enabled {
            return OperationResult::ErrorUndoDisabled;
        }

        if self.nchange == self.changes.size() {
            return OperationResult::NoMoreChanges;
        }

        let (kind, off, len, new) = match self.changes.get(self.nchange) {
            Some(c) => (c.kind, c.off, c.len, c.new.clone()),
            None => return OperationResult::NoMoreChanges,
        };

        // 正向重放，不再记录
        let res = match (kind, new) {
            (ChangeKind::Modify, Some(new)) => self.do_modify(off, &new, false),
            (ChangeKind::Add, Some(new)) => self.do_add(off, &new, false),
            (ChangeKind::Remove, _) => self.do_remove(off, len, false),
            _ => OperationResult::InvalidOperation,
        };

        if res == OperationResult::Success {
            self.nchange += 1;
        }

        res
    }
}

// ========== 读取 ==========

impl FileModel {
    /// 从 off 起读取至多 out.len() 个字节，返回实际读取数。
    /// 偏移不小于当前长度时失败
    pub fn get(&self, off: u64, out: &mut [u8]) -> Option<usize> {
        let (bidx, pos) = self.chain.seek(off)?;

        Some(self.read_from(bidx, pos, out))
    }

    // 从指定块位置起跨块复制
    fn read_from(&self, mut bidx: usize, mut pos: u64, out: &mut [u8]) -> usize {
        let mut written = 0;

        while bidx != SENTINEL && written < out.len() {
            let b = self.chain.block(bidx);
            let next = b.next;

            let avail = (b.len - pos) as usize;
            let n = avail.min(out.len() - written);

            let src = self.block_slice(bidx);
            out[written..written + n].copy_from_slice(&src[pos as usize..pos as usize + n]);

            written += n;
            bidx = next;
            pos = 0;
        }

        written
    }

    // 块的有效负载切片
    fn block_slice(&self, idx: usize) -> &[u8] {
        let b = self.chain.block(idx);

        match &b.data {
            BlockData::Mapped { map_off } => self.map_bytes(*map_off, b.len),
            BlockData::Owned(buf) => &buf[..b.len as usize],
        }
    }

    fn map_bytes(&self, map_off: u64, len: u64) -> &[u8] {
        match &self.map {
            Some(map) => map.bytes(map_off..map_off + len),
            None => &[],
        }
    }
}

// ========== 搜索 ==========

impl FileModel {
    /// 按方向搜索子串，返回匹配的绝对偏移
    pub fn find(&self, off: u64, dir: Direction, needle: &[u8]) -> Option<u64> {
        match dir {
            Direction::Forward => self.find_forward(off, needle),
            Direction::Backward => self.find_backward(off, needle),
        }
    }

    /// 返回起点不小于 off 的第一个匹配
    pub fn find_forward(&self, off: u64, needle: &[u8]) -> Option<u64> {
        let needlelen = needle.len() as u64;

        match off.checked_add(needlelen) {
            Some(end) if end <= self.len => {}
            _ => return None,
        }

        if needle.is_empty() {
            return None;
        }

        let (mut bidx, mut pos) = self.chain.seek(off)?;

        // off 改指块首
        let mut off = off - pos;

        loop {
            let blen = self.chain.block(bidx).len;
            let slice = self.block_slice(bidx);

            // 针放得进当前块剩余部分时先做块内搜索
            if pos + needlelen <= blen {
                if let Some(hit) = memmem::find(&slice[pos as usize..], needle) {
                    return Some(off + pos + hit as u64);
                }

                pos = blen - needlelen + 1;
            }

            let next = self.chain.block(bidx).next;
            if next == SENTINEL {
                return None;
            }

            // 跨块匹配：针的前缀在当前块尾部，剩余部分延续到后继块
            while pos < blen {
                let left = (blen - pos) as usize;

                if slice[pos as usize..] == needle[..left] {
                    let mut l = needle.len() - left;
                    let mut idx = left;
                    let mut nb = next;

                    loop {
                        let nslice = self.block_slice(nb);

                        if l <= nslice.len() {
                            if nslice[..l] == needle[idx..] {
                                return Some(off + pos);
                            }

                            break;
                        } else if nslice[..] == needle[idx..idx + nslice.len()] {
                            idx += nslice.len();
                            l -= nslice.len();

                            nb = self.chain.block(nb).next;
                            if nb == SENTINEL {
                                return None;
                            }
                        } else {
                            break;
                        }
                    }
                }

                pos += 1;
            }

            off += blen;

            bidx = next;
            pos = 0;
        }
    }

    /// 返回起点不大于 off 的最后一个匹配
    pub fn find_backward(&self, off: u64, needle: &[u8]) -> Option<u64> {
        let needlelen = needle.len() as u64;

        if needlelen > self.len {
            return None;
        }

        if needle.is_empty() {
            return None;
        }

        let (mut bidx, mut pos, mut off) = if off.saturating_add(needlelen) >= self.len {
            // 匹配终点已到或越过文件末尾：从最后一个块的末尾开始
            let last = self.chain.last();
            let blen = self.chain.block(last).len;
            (last, blen, self.len - blen)
        } else {
            let target = off + needlelen;
            let (b, p) = self.chain.seek(target)?;
            (b, p, target - p)
        };

        loop {
            let slice = self.block_slice(bidx);

            // 终点不越过 pos 的块内完整匹配，自右向左
            if needlelen <= pos {
                if let Some(hit) = memmem::rfind(&slice[..pos as usize], needle) {
                    return Some(off + hit as u64);
                }

                pos = needlelen - 1;
            }

            let prev = self.chain.block(bidx).prev;
            if prev == SENTINEL {
                return None;
            }

            off -= self.chain.block(prev).len;

            // 跨块匹配：针的后缀在当前块首部，剩余部分延续到前驱块
            let mut left = pos;
            while left > 0 {
                let l0 = (needlelen - left) as usize;

                if slice[..left as usize] == needle[l0..] {
                    let mut l = l0;
                    let mut pb = prev;
                    let mut tmpoff = off;

                    loop {
                        let pslice = self.block_slice(pb);
                        let plen = pslice.len();

                        if l <= plen {
                            let idx = plen - l;
                            if pslice[idx..] == needle[..l] {
                                return Some(tmpoff + idx as u64);
                            }

                            break;
                        } else if pslice[..] == needle[l - plen..l] {
                            l -= plen;

                            pb = self.chain.block(pb).prev;
                            if pb == SENTINEL {
                                return None;
                            }

                            tmpoff -= self.chain.block(pb).len;
                        } else {
                            break;
                        }
                    }
                }

                left -= 1;
            }

            bidx = prev;
            pos = self.chain.block(bidx).len;
        }
    }
}

fn tmp_file_name(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");

    PathBuf::from(name)
}
