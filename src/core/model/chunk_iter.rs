// 块负载迭代器
//
// 职责：按链序流式产出每个块的字节负载，避免整体物化

use crate::core::model::block::{BlockChain, BlockData, SENTINEL};
use crate::core::model::mmap::FileMap;

/// 按块产出逻辑内容的迭代器
pub struct ChunkIter<'a> {
    chain: &'a BlockChain,
    map: Option<&'a FileMap>,
    current: usize,
}

impl<'a> ChunkIter<'a> {
    pub(crate) fn new(chain: &'a BlockChain, map: Option<&'a FileMap>) -> Self {
        Self {
            chain,
            map,
            current: chain.first(),
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == SENTINEL {
            return None;
        }

        let b = self.chain.block(self.current);
        self.current = b.next;

        Some(match &b.data {
            BlockData::Mapped { map_off } => match self.map {
                Some(map) => map.bytes(*map_off..*map_off + b.len),
                None => &[],
            },
            BlockData::Owned(buf) => &buf[..b.len as usize],
        })
    }
}
