// 文件工具
//
// 职责：夹具的生成与校验：字节复制、字节比较、随机内容文件

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::core::model::fileio;
use crate::core::model::FileMap;

/// 逐字节复制普通文件；源为空时产生空文件
pub fn copy(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    if !meta.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "不是普通文件"));
    }

    let infile = File::open(src)?;
    let out = File::create(dest)?;

    if meta.len() == 0 {
        return Ok(());
    }

    let map = FileMap::map(&infile, meta.len())?;
    if let Err(e) = fileio::write_full(&out, map.as_slice()) {
        drop(out);
        let _ = fs::remove_file(dest);

        return Err(e);
    }

    Ok(())
}

/// 两个普通文件的长度与内容是否完全一致
pub fn diff(file1: &Path, file2: &Path) -> io::Result<bool> {
    let meta1 = fs::metadata(file1)?;
    let meta2 = fs::metadata(file2)?;
    if !meta1.is_file() || !meta2.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "不是普通文件"));
    }

    if meta1.len() != meta2.len() {
        return Ok(false);
    }

    if meta1.len() == 0 {
        return Ok(true);
    }

    let f1 = File::open(file1)?;
    let f2 = File::open(file2)?;

    let map1 = FileMap::map(&f1, meta1.len())?;
    let map2 = FileMap::map(&f2, meta2.len())?;

    Ok(map1.as_slice() == map2.as_slice())
}

/// 写入 len 个随机字节，种子取自墙上时钟
pub fn random_file(path: &Path, len: u64) -> io::Result<()> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    random_file_seeded(path, len, seed)
}

/// 指定种子的随机文件（可复现的夹具）
pub fn random_file_seeded(path: &Path, len: u64, seed: u64) -> io::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut buf = [0u8; 8192];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        rng.fill_bytes(&mut buf[..n]);
        w.write_all(&buf[..n])?;

        remaining -= n as u64;
    }

    w.flush()
}
