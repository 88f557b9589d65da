use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::codec::Decoder;
use crate::storage::page::b_plus_tree::Leaf;
use crate::storage::{RecordId, StorageResult};
use async_stream::try_stream;
use futures::Stream;
use std::sync::Arc;

/// Forward cursor over the leaf chain in ascending key order.
///
/// The iterator keeps a decoded snapshot of its current leaf and holds
/// neither latch nor pin in between steps; the next leaf in the chain is
/// latched only while it is being decoded. Exhaustion (`next()` returning
/// `Ok(None)`) marks the position one past the last entry of the rightmost
/// leaf.
pub struct IndexIter<K> {
    buffer_pool: Arc<BufferPoolManager>,
    leaf: Option<Leaf<K>>,
    position: usize,
}

impl<K> IndexIter<K> {
    pub(crate) fn new(buffer_pool: Arc<BufferPoolManager>, leaf: Leaf<K>, position: usize) -> Self {
        Self {
            buffer_pool,
            leaf: Some(leaf),
            position,
        }
    }

    pub(crate) fn empty(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            leaf: None,
            position: 0,
        }
    }

    pub async fn next(&mut self) -> StorageResult<Option<(K, RecordId)>>
    where
        K: Decoder + Clone,
    {
        loop {
            let Some(leaf) = self.leaf.as_ref() else {
                return Ok(None);
            };
            if self.position < leaf.kv.len() {
                let entry = leaf.kv[self.position].clone();
                self.position += 1;
                return Ok(Some(entry));
            }
            match leaf.next() {
                None => {
                    self.leaf = None;
                    return Ok(None);
                }
                Some(next_id) => {
                    let (_page, node) = self.buffer_pool.fetch_page_node::<K>(next_id).await?;
                    self.leaf = Some(node.assume_leaf());
                    self.position = 0;
                }
            }
        }
    }

    pub fn into_stream(mut self) -> impl Stream<Item = StorageResult<(K, RecordId)>>
    where
        K: Decoder + Clone,
    {
        try_stream! {
            while let Some(entry) = self.next().await? {
                yield entry;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::buffer_pool_manager::BufferPoolManager;
    use crate::storage::disk::disk_manager::DiskManager;
    use crate::storage::index::Index;
    use crate::storage::{PageId, RecordId, StorageResult};
    use futures::TryStreamExt;
    use std::sync::Arc;

    async fn seeded_index(len: u32) -> StorageResult<Index<u32>> {
        let file = tempfile::NamedTempFile::new()?;
        let disk_manager = DiskManager::new(file.path()).await?;
        let buffer_pool = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
        let index = Index::new(buffer_pool, "scan", 4, 4).await?;
        for key in (1..=len).rev() {
            index
                .insert(
                    key,
                    RecordId {
                        page_id: key as PageId,
                        slot_num: 0,
                    },
                )
                .await?;
        }
        Ok(index)
    }

    #[tokio::test]
    async fn scan_all() -> StorageResult<()> {
        let index = seeded_index(50).await?;
        let mut iter = index.iter().await?;
        let mut keys = Vec::new();
        while let Some((key, value)) = iter.next().await? {
            assert_eq!(key as PageId, value.page_id);
            keys.push(key);
        }
        assert_eq!(keys, (1..=50).collect::<Vec<_>>());
        // exhausted iterators stay exhausted
        assert!(iter.next().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn scan_from_key() -> StorageResult<()> {
        let index = seeded_index(50).await?;
        let mut iter = index.iter_from(&30).await?;
        let mut keys = Vec::new();
        while let Some((key, _)) = iter.next().await? {
            keys.push(key);
        }
        assert_eq!(keys, (30..=50).collect::<Vec<_>>());

        // a start key past the maximum yields nothing
        let mut iter = index.iter_from(&100).await?;
        assert!(iter.next().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn scan_empty() -> StorageResult<()> {
        let file = tempfile::NamedTempFile::new()?;
        let disk_manager = DiskManager::new(file.path()).await?;
        let buffer_pool = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
        let index = Index::<u32>::new(buffer_pool, "empty", 4, 4).await?;
        let mut iter = index.iter().await?;
        assert!(iter.next().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stream() -> StorageResult<()> {
        let index = seeded_index(20).await?;
        let entries: Vec<(u32, RecordId)> =
            index.iter().await?.into_stream().try_collect().await?;
        assert_eq!(entries.len(), 20);
        assert!(entries.windows(2).all(|pair| pair[0].0 < pair[1].0));
        Ok(())
    }
}
