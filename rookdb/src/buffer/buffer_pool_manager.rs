use crate::buffer::lru_k_replacer::LruKReplacer;
use crate::buffer::{Error, FrameId};
use crate::codec::{Decoder, Encoder};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::page::b_plus_tree::Node;
use crate::storage::page::{Page, PageTrait};
use crate::storage::{PageId, HEADER_PAGE_ID, PAGE_SIZE};
use log::debug;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{
    OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

const PAGE_TABLE_BUCKET_SIZE: usize = 8;

/// A pool of in-memory frames backed by the disk manager. The page directory
/// (`page_id -> frame_id`) is an extendible hash table; victim frames are
/// chosen by the LRU-K replacer. Pages hand out RAII [`PageRef`] pins whose
/// drop makes the frame evictable again.
pub struct BufferPoolManager {
    inner: RwLock<Inner>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: Arc<Mutex<LruKReplacer>>,
    disk_manager: DiskManager,
    next_page_id: AtomicUsize,
    pool_size: usize,
}

struct Inner {
    pages: Vec<Arc<Page>>,
    free_list: VecDeque<FrameId>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, k: usize, disk_manager: DiskManager) -> Self {
        let replacer = Arc::new(Mutex::new(LruKReplacer::new(pool_size, k)));
        let free_list = (0..pool_size).collect();
        let pages = (0..pool_size).map(|_| Arc::new(Page::new(0))).collect();
        Self {
            inner: RwLock::new(Inner { pages, free_list }),
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer,
            disk_manager,
            next_page_id: AtomicUsize::new(HEADER_PAGE_ID + 1),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocates a page with a freshly minted id, pinned. Returns `None`
    /// when every frame is pinned.
    pub async fn new_page_ref(&self) -> Result<Option<PageRef>, Error> {
        let mut inner = self.inner.write().await;
        let Some(frame_id) = self.available_frame(&mut inner).await? else {
            return Ok(None);
        };
        let page_id = self.allocate_page();
        let page = Arc::new(Page::new(page_id));
        page.pin_count.store(1, Ordering::Relaxed);
        inner.pages[frame_id] = page.clone();
        self.page_table.insert(page_id, frame_id);
        {
            let mut replacer = self.replacer.lock().unwrap();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }
        Ok(Some(PageRef::new(page, frame_id, self.replacer.clone())))
    }

    /// Pins the frame holding `page_id`, reading it from disk if it is not
    /// resident. Returns `None` when every frame is pinned.
    pub async fn fetch_page_ref(&self, page_id: PageId) -> Result<Option<PageRef>, Error> {
        let mut inner = self.inner.write().await;
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let page = inner.pages[frame_id].clone();
            page.pin_count.fetch_add(1, Ordering::Relaxed);
            let mut replacer = self.replacer.lock().unwrap();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
            return Ok(Some(PageRef::new(page, frame_id, self.replacer.clone())));
        }
        let Some(frame_id) = self.available_frame(&mut inner).await? else {
            return Ok(None);
        };
        let page = inner.pages[frame_id].clone();
        {
            let data = page.data();
            let mut data = data.write().await;
            self.disk_manager.read_page(page_id, data.as_mut()).await?;
        }
        page.set_page_id(page_id);
        page.pin_count.store(1, Ordering::Relaxed);
        self.page_table.insert(page_id, frame_id);
        {
            let mut replacer = self.replacer.lock().unwrap();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }
        Ok(Some(PageRef::new(page, frame_id, self.replacer.clone())))
    }

    pub async fn flush_page(&self, page_id: PageId) -> Result<(), Error> {
        let inner = self.inner.read().await;
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let page = inner.pages[frame_id].clone();
            if page.is_dirty() {
                let data = page.data();
                let data = data.read().await;
                self.disk_manager
                    .write_page(page.page_id(), data.as_ref())
                    .await?;
                page.set_dirty(false);
            }
        }
        Ok(())
    }

    pub async fn flush_page_all(&self) -> Result<(), Error> {
        let inner = self.inner.read().await;
        for page in inner.pages.iter() {
            if page.is_dirty() {
                let data = page.data();
                let data = data.read().await;
                self.disk_manager
                    .write_page(page.page_id(), data.as_ref())
                    .await?;
                page.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Frees a resident page. Returns `None` if the page is still pinned or
    /// not resident; the caller must hold no reference to it.
    pub async fn delete_page(&self, page_id: PageId) -> Result<Option<PageId>, Error> {
        let mut inner = self.inner.write().await;
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(None);
        };
        let page = inner.pages[frame_id].clone();
        if page.pin_count.load(Ordering::Relaxed) > 0 {
            return Ok(None);
        }
        // a frame whose last unpin is not published yet counts as referenced
        if self.replacer.lock().unwrap().remove(frame_id).is_err() {
            return Ok(None);
        }
        if page.is_dirty() {
            let data = page.data();
            let data = data.read().await;
            self.disk_manager
                .write_page(page.page_id(), data.as_ref())
                .await?;
            page.set_dirty(false);
        }
        page.reset().await;
        inner.free_list.push_back(frame_id);
        self.page_table.remove(&page_id);
        debug!("deleted page {} from frame {}", page_id, frame_id);
        Ok(Some(page_id))
    }

    async fn available_frame(
        &self,
        inner: &mut RwLockWriteGuard<'_, Inner>,
    ) -> Result<Option<FrameId>, Error> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let victim = self.replacer.lock().unwrap().evict();
        let Some(frame_id) = victim else {
            return Ok(None);
        };
        let page = inner.pages[frame_id].clone();
        if page.is_dirty() {
            let data = page.data();
            let data = data.read().await;
            self.disk_manager
                .write_page(page.page_id(), data.as_ref())
                .await?;
            page.set_dirty(false);
        }
        self.page_table.remove(&page.page_id());
        debug!("evicted page {} from frame {}", page.page_id(), frame_id);
        Ok(Some(frame_id))
    }

    fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::AcqRel)
    }
}

impl BufferPoolManager {
    pub async fn fetch_page_read_owned(
        &self,
        page_id: PageId,
    ) -> Result<OwnedPageDataReadGuard, Error> {
        let page = self
            .fetch_page_ref(page_id)
            .await?
            .ok_or(Error::BufferInsufficient)?;
        Ok(page.data_read_owned().await)
    }

    pub async fn fetch_page_write_owned(
        &self,
        page_id: PageId,
    ) -> Result<OwnedPageDataWriteGuard, Error> {
        let page = self
            .fetch_page_ref(page_id)
            .await?
            .ok_or(Error::BufferInsufficient)?;
        Ok(page.data_write_owned().await)
    }

    /// Allocates a page, stamps its id into `node` and returns the
    /// write-latched frame; the caller encodes the image when it is final.
    pub async fn new_page_write_owned<T>(&self, node: &mut T) -> Result<OwnedPageDataWriteGuard, Error>
    where
        T: PageTrait,
    {
        let guard = self
            .new_page_ref()
            .await?
            .ok_or(Error::BufferInsufficient)?
            .data_write_owned()
            .await;
        node.set_page_id(guard.page_id());
        Ok(guard)
    }

    /// Fetches and decodes a tree page, releasing the latch but keeping the
    /// pin until the returned [`PageRef`] is dropped.
    pub async fn fetch_page_node<K>(&self, page_id: PageId) -> Result<(PageRef, Node<K>), Error>
    where
        K: Decoder,
    {
        let page = self
            .fetch_page_ref(page_id)
            .await?
            .ok_or(Error::BufferInsufficient)?;
        let node = page.data_read().await.decode()?;
        Ok((page, node))
    }
}

/// RAII pin on a frame. Dropping the reference unpins the page and, at pin
/// count zero, marks the frame evictable.
pub struct PageRef {
    page: Arc<Page>,
    frame_id: FrameId,
    replacer: Arc<Mutex<LruKReplacer>>,
}

impl PageRef {
    pub fn new(page: Arc<Page>, frame_id: FrameId, replacer: Arc<Mutex<LruKReplacer>>) -> Self {
        Self {
            page,
            frame_id,
            replacer,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }

    pub async fn data_read(&self) -> PageDataReadGuard<'_> {
        let guard = self.page.data_ref().read().await;
        PageDataReadGuard {
            guard,
            page_id: self.page.page_id(),
        }
    }

    pub async fn data_write(&self) -> PageDataWriteGuard<'_> {
        let guard = self.page.data_ref().write().await;
        PageDataWriteGuard {
            guard,
            page_id: self.page.page_id(),
            is_dirty: &self.page.is_dirty,
        }
    }

    pub async fn data_read_owned(self) -> OwnedPageDataReadGuard {
        let guard = self.page.data().read_owned().await;
        OwnedPageDataReadGuard {
            guard,
            page_ref: self,
        }
    }

    pub async fn data_write_owned(self) -> OwnedPageDataWriteGuard {
        let guard = self.page.data().write_owned().await;
        OwnedPageDataWriteGuard {
            guard,
            page_ref: self,
        }
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        if self.page.pin_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.replacer
                .lock()
                .unwrap()
                .set_evictable(self.frame_id, true);
        }
    }
}

pub struct PageDataReadGuard<'a> {
    guard: RwLockReadGuard<'a, [u8; PAGE_SIZE]>,
    page_id: PageId,
}

pub struct PageDataWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, [u8; PAGE_SIZE]>,
    page_id: PageId,
    is_dirty: &'a AtomicBool,
}

pub struct OwnedPageDataReadGuard {
    guard: OwnedRwLockReadGuard<[u8; PAGE_SIZE]>,
    page_ref: PageRef,
}

pub struct OwnedPageDataWriteGuard {
    guard: OwnedRwLockWriteGuard<[u8; PAGE_SIZE]>,
    page_ref: PageRef,
}

impl PageDataReadGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn decode<T>(&self) -> Result<T, Error>
    where
        T: Decoder,
    {
        Ok(T::decode(&mut self.guard.as_ref())?)
    }
}

impl PageDataWriteGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn decode<T>(&self) -> Result<T, Error>
    where
        T: Decoder,
    {
        Ok(T::decode(&mut self.guard.as_ref())?)
    }

    pub fn encode<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Encoder,
    {
        Ok(value.encode(&mut self.guard.as_mut())?)
    }
}

impl OwnedPageDataReadGuard {
    pub fn page_id(&self) -> PageId {
        self.page_ref.page_id()
    }

    pub fn decode<T>(&self) -> Result<T, Error>
    where
        T: Decoder,
    {
        Ok(T::decode(&mut self.guard.as_ref())?)
    }
}

impl OwnedPageDataWriteGuard {
    pub fn page_id(&self) -> PageId {
        self.page_ref.page_id()
    }

    pub fn decode<T>(&self) -> Result<T, Error>
    where
        T: Decoder,
    {
        Ok(T::decode(&mut self.guard.as_ref())?)
    }

    pub fn encode<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Encoder,
    {
        Ok(value.encode(&mut self.guard.as_mut())?)
    }
}

impl Deref for PageDataReadGuard<'_> {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl Deref for PageDataWriteGuard<'_> {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl DerefMut for PageDataWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl Drop for PageDataWriteGuard<'_> {
    fn drop(&mut self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }
}

impl Deref for OwnedPageDataReadGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl Deref for OwnedPageDataWriteGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl DerefMut for OwnedPageDataWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl Drop for OwnedPageDataWriteGuard {
    fn drop(&mut self) {
        self.page_ref.page.set_dirty(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn test_bpm(pool_size: usize) -> Result<BufferPoolManager, Error> {
        let file = tempfile::NamedTempFile::new()?;
        let disk_manager = DiskManager::new(file.path()).await?;
        Ok(BufferPoolManager::new(pool_size, 2, disk_manager))
    }

    #[tokio::test]
    async fn buffer_pool_manager() -> Result<(), Error> {
        let random_data = [2u8; PAGE_SIZE];
        let buffer_pool_size = 10;
        let bpm = test_bpm(buffer_pool_size).await?;

        // Scenario: The buffer pool is empty. We should be able to create a new page.
        let page1 = bpm.new_page_ref().await?;
        assert!(page1.is_some());
        let page1 = page1.unwrap();
        // page id 0 is reserved for the header page
        assert_eq!(1, page1.page_id());

        // Scenario: Once we have a page, we should be able to read and write content.
        page1.data_write().await.clone_from_slice(&random_data);

        // Scenario: We should be able to create new pages until we fill up the buffer pool.
        let mut pages = Vec::new();
        for _ in 1..buffer_pool_size {
            let page = bpm.new_page_ref().await?;
            assert!(page.is_some());
            pages.push(page.unwrap());
        }

        // Scenario: Once the buffer pool is full, we should not be able to create any new pages.
        for _ in buffer_pool_size..2 * buffer_pool_size {
            assert!(bpm.new_page_ref().await?.is_none());
        }

        // Scenario: After unpinning pages {1, 2, 3, 4, 5}, we should be able to create 5 new pages.
        drop(page1);
        for _ in 0..4 {
            pages.remove(0);
        }
        for _ in 0..5 {
            assert!(bpm.new_page_ref().await?.is_some());
        }

        // Scenario: We should be able to fetch the data we wrote a while ago.
        let page1 = bpm.fetch_page_ref(1).await?;
        assert!(page1.is_some());
        let page1 = page1.unwrap();
        assert_eq!(page1.data_read().await.as_ref(), random_data.as_ref());

        Ok(())
    }

    #[tokio::test]
    async fn fetch_after_eviction() -> Result<(), Error> {
        let bpm = test_bpm(10).await?;

        let page1 = bpm.new_page_ref().await?.unwrap();
        let data = "Hello".as_bytes();
        page1.data_write().await.as_mut().write_all(data)?;
        drop(page1);

        // fill the pool and keep every frame pinned, forcing page 1 out
        let mut pages = Vec::new();
        for _ in 0..10 {
            pages.push(bpm.new_page_ref().await?.unwrap());
        }
        assert!(bpm.new_page_ref().await?.is_none());
        assert!(bpm.fetch_page_ref(1).await?.is_none());

        // page 1 must have been flushed on eviction
        drop(pages);
        let page1 = bpm.fetch_page_ref(1).await?.unwrap();
        let mut expected = [0u8; PAGE_SIZE];
        expected.as_mut_slice().write_all(data)?;
        assert_eq!(page1.data_read().await.as_ref(), expected.as_ref());
        Ok(())
    }

    #[tokio::test]
    async fn delete_page() -> Result<(), Error> {
        let bpm = test_bpm(2).await?;

        let page = bpm.new_page_ref().await?.unwrap();
        let page_id = page.page_id();

        // pinned pages cannot be deleted
        assert_eq!(bpm.delete_page(page_id).await?, None);
        drop(page);
        assert_eq!(bpm.delete_page(page_id).await?, Some(page_id));
        // already gone
        assert_eq!(bpm.delete_page(page_id).await?, None);

        // the frame is reusable afterwards
        let page2 = bpm.new_page_ref().await?.unwrap();
        let page3 = bpm.new_page_ref().await?.unwrap();
        assert_ne!(page2.page_id(), page3.page_id());
        Ok(())
    }
}
