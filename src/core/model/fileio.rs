// 文件系统调用辅助
//
// 职责：分块写入与定位写入（单次系统调用不超过 1GB，短写重试），
//       以及块设备的大小查询

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;

/// 单次 write/pwrite 的字节上限
const MAX_WRITE: usize = 1024 * 1024 * 1024; // 1GB

/// 顺序写入整个缓冲区
pub(crate) fn write_full(mut file: &File, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = buf.len().min(MAX_WRITE);

        match file.write(&buf[..n]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(written) => buf = &buf[written..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// 在指定偏移写入整个缓冲区
pub(crate) fn pwrite_full(file: &File, mut buf: &[u8], mut off: u64) -> io::Result<()> {
    while !buf.is_empty() {
        let n = buf.len().min(MAX_WRITE);

        match file.write_at(&buf[..n], off) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(written) => {
                off += written as u64;
                buf = &buf[written..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// 查询块设备大小（字节）
pub(crate) fn block_device_size(file: &File) -> io::Result<u64> {
    // BLKGETSIZE64 = _IOR(0x12, 114, u64)
    const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

    let mut size: u64 = 0;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut size as *mut u64) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(size)
}
