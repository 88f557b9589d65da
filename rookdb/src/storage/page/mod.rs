pub mod b_plus_tree;
pub mod header;

use crate::storage::{AtomicPageId, PageId, PAGE_SIZE};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type PageData = Arc<RwLock<[u8; PAGE_SIZE]>>;

/// An in-memory frame: the raw page bytes behind the page latch, plus the
/// pin/dirty bookkeeping the buffer pool needs.
pub struct Page {
    page_id: AtomicPageId,
    data: PageData,
    pub pin_count: AtomicU32,
    pub is_dirty: AtomicBool,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id: AtomicPageId::new(page_id),
            data: Arc::new(RwLock::new([0; PAGE_SIZE])),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    pub fn data(&self) -> PageData {
        self.data.clone()
    }

    pub fn data_ref(&self) -> &PageData {
        &self.data
    }

    pub async fn reset(&self) {
        self.page_id.store(0, Ordering::Relaxed);
        {
            let mut data = self.data.write().await;
            *data = [0; PAGE_SIZE];
        }
        self.pin_count.store(0, Ordering::Relaxed);
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Relaxed)
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Relaxed)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    pub fn set_dirty(&self, is_dirty: bool) {
        self.is_dirty.store(is_dirty, Ordering::Relaxed);
    }
}

/// Page images that carry their own page id, so the buffer pool can stamp a
/// freshly allocated id into a new image.
pub trait PageTrait {
    fn page_id(&self) -> PageId;
    fn set_page_id(&mut self, page_id: PageId);
}
