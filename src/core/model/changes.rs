// 变更日志
//
// 职责：记录 修改/插入/删除 三类变更以支撑撤销重做，
//       并以文本格式装载、保存变更序列

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modify,
    Add,
    Remove,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Modify => "Modify",
            ChangeKind::Add => "Add",
            ChangeKind::Remove => "Remove",
        }
    }
}

/// 一条变更记录
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub off: u64,
    pub len: u64,
    /// 被覆盖或被删除的旧内容（Modify / Remove）
    pub old: Option<Box<[u8]>>,
    /// 写入的新内容（Modify / Add）
    pub new: Option<Box<[u8]>>,
}

/// 变更日志
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Vec<Change>,
}

// ========== 记录管理 ==========

impl ChangeLog {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// 清空日志
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// 记录数
    pub fn size(&self) -> usize {
        self.changes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// 获取记录
    pub fn get(&self, pos: usize) -> Option<&Change> {
        self.changes.get(pos)
    }

    /// 记录一次修改；old 与 new 等长
    pub fn modify(&mut self, off: u64, old: Vec<u8>, new: &[u8]) {
        debug_assert_eq!(old.len(), new.len());
        self.register(ChangeKind::Modify, off, Some(old), Some(new));
    }

    /// 记录一次插入
    pub fn add(&mut self, off: u64, new: &[u8]) {
        self.register(ChangeKind::Add, off, None, Some(new));
    }

    /// 记录一次删除；old 为被删除的内容
    pub fn remove(&mut self, off: u64, old: Vec<u8>) {
        self.register(ChangeKind::Remove, off, Some(old), None);
    }

    // 零长度变更不产生记录
    fn register(&mut self, kind: ChangeKind, off: u64, old: Option<Vec<u8>>, new: Option<&[u8]>) {
        let len = match (&old, new) {
            (Some(old), _) => old.len() as u64,
            (None, Some(new)) => new.len() as u64,
            (None, None) => 0,
        };
        if len == 0 {
            return;
        }

        self.changes.push(Change {
            kind,
            off,
            len,
            old: old.map(Vec::into_boxed_slice),
            new: new.map(|d| d.to_vec().into_boxed_slice()),
        });
    }

    /// 丢弃最近一条记录
    pub fn drop_last(&mut self) -> bool {
        self.changes.pop().is_some()
    }

    /// 丢弃 pos 及其后的所有记录
    pub fn truncate(&mut self, pos: usize) {
        self.changes.truncate(pos);
    }
}

// ========== 文本格式 ==========

impl ChangeLog {
    /// 保存为文本格式
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        writeln!(w, "Number of changes: {}.", self.changes.len())?;

        for chg in &self.changes {
            writeln!(
                w,
                "{}: offset: {}, length: {}.",
                chg.kind.as_str(),
                chg.off,
                chg.len
            )?;

            // Modify / Add 附带新内容的十六进制转储
            if let Some(new) = &chg.new {
                hexdump(&mut w, new)?;
            }
        }

        w.flush()
    }

    /// 从文本格式装载，替换当前内容。
    /// 解析先进入临时序列，失败时日志保持原样
    pub fn load(&mut self, path: &Path) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(parse_error());
        }

        let buf = fs::read(path)?;
        let parsed = parse_change_log(&buf)?;

        debug!(changes = parsed.len(), "change log loaded");

        self.changes = parsed;

        Ok(())
    }
}

fn hexdump(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    for byte in data {
        write!(w, "{:02x}", byte)?;
    }

    writeln!(w)
}

fn parse_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "变更日志格式错误")
}

/// 截取下一行（不含换行符）；没有换行符则失败
fn next_line(buf: &[u8]) -> io::Result<(&[u8], &[u8])> {
    match memchr::memchr(b'\n', buf) {
        Some(eol) => Ok((&buf[..eol], &buf[eol + 1..])),
        None => Err(parse_error()),
    }
}

/// 贪婪解析十进制数，带溢出检测；返回值与剩余部分
fn parse_decimal(p: &[u8]) -> io::Result<(u64, &[u8])> {
    let mut val: u64 = 0;
    let mut n = 0;

    while n < p.len() && p[n].is_ascii_digit() {
        val = val
            .checked_mul(10)
            .and_then(|v| v.checked_add((p[n] - b'0') as u64))
            .ok_or_else(parse_error)?;
        n += 1;
    }

    if n == 0 {
        return Err(parse_error());
    }

    Ok((val, &p[n..]))
}

fn parse_hex(line: &[u8]) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(line.len() / 2);

    for pair in line.chunks(2) {
        let hi = (pair[0] as char).to_digit(16).ok_or_else(parse_error)?;
        let lo = (pair[1] as char).to_digit(16).ok_or_else(parse_error)?;
        data.push(((hi << 4) | lo) as u8);
    }

    Ok(data)
}

fn parse_change_log(buf: &[u8]) -> io::Result<Vec<Change>> {
    // 头部行：声明的记录数
    let (line, mut rest) = next_line(buf)?;
    if line.len() < 20 || !line.starts_with(b"Number of changes: ") {
        return Err(parse_error());
    }

    let (declared, tail) = parse_decimal(&line[19..])?;
    if tail != b"." {
        return Err(parse_error());
    }

    let mut changes = Vec::new();

    while !rest.is_empty() {
        let (line, after) = next_line(rest)?;
        if line.len() < 20 {
            return Err(parse_error());
        }
        rest = after;

        let (kind, p) = if let Some(p) = line.strip_prefix(b"Modify: ") {
            (ChangeKind::Modify, p)
        } else if let Some(p) = line.strip_prefix(b"Add: ") {
            (ChangeKind::Add, p)
        } else if let Some(p) = line.strip_prefix(b"Remove: ") {
            (ChangeKind::Remove, p)
        } else {
            return Err(parse_error());
        };

        let p = p.strip_prefix(b"offset: ").ok_or_else(parse_error)?;
        let (off, p) = parse_decimal(p)?;

        let p = p.strip_prefix(b", length: ").ok_or_else(parse_error)?;
        let (len, p) = parse_decimal(p)?;

        // 长度字段以 '.' 结尾且必须大于零
        if p != b"." || len == 0 {
            return Err(parse_error());
        }

        let new = match kind {
            ChangeKind::Remove => None,
            ChangeKind::Modify | ChangeKind::Add => {
                let (hexline, after) = next_line(rest)?;
                if len.checked_mul(2) != Some(hexline.len() as u64) {
                    return Err(parse_error());
                }
                rest = after;

                Some(parse_hex(hexline)?.into_boxed_slice())
            }
        };

        changes.push(Change {
            kind,
            off,
            len,
            old: None,
            new,
        });
    }

    // 记录数必须与头部声明一致
    if changes.len() as u64 != declared {
        return Err(parse_error());
    }

    Ok(changes)
}
