use crate::buffer;
use crate::buffer::buffer_pool_manager::{
    BufferPoolManager, OwnedPageDataReadGuard, OwnedPageDataWriteGuard,
};
use crate::codec::{Decoder, Encoder};
use crate::storage::index::IndexIter;
use crate::storage::page::b_plus_tree::{Header, Internal, Leaf, Node};
use crate::storage::page::header::HeaderPage;
use crate::storage::page::PageTrait;
use crate::storage::{PageId, RecordId, StorageResult, HEADER_PAGE_ID, NULL_PAGE};
use indexmap::IndexMap;
use log::debug;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A concurrent B+Tree index mapping keys to [`RecordId`]s over buffer-pool
/// pages.
///
/// Descents crab through page latches: readers couple child and parent read
/// latches, writers keep the chain of ancestors that might still be touched
/// by a split or merge in a [`Route`] and release everything above the first
/// safe page. The root page id lives under its own guard; every root change
/// is mirrored into the header page record for this index name while that
/// guard is held.
pub struct Index<K> {
    buffer_pool: Arc<BufferPoolManager>,
    root: RwLock<PageId>,
    name: String,
    leaf_max_size: usize,
    internal_max_size: usize,
    _data: PhantomData<K>,
}

impl<K> Index<K> {
    /// Opens the index named `name`, recovering its root from the header
    /// page when a record exists.
    pub async fn new(
        buffer_pool: Arc<BufferPoolManager>,
        name: impl Into<String>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> StorageResult<Self> {
        assert!(leaf_max_size >= 3, "leaf fanout too small");
        assert!(internal_max_size >= 3, "internal fanout too small");
        let name = name.into();
        let header = buffer_pool.fetch_page_read_owned(HEADER_PAGE_ID).await?;
        let root = header
            .decode::<HeaderPage>()?
            .search_record(&name)
            .unwrap_or(NULL_PAGE);
        drop(header);
        Ok(Self {
            buffer_pool,
            root: RwLock::new(root),
            name,
            leaf_max_size,
            internal_max_size,
            _data: PhantomData,
        })
    }

    pub async fn search(&self, key: &K) -> StorageResult<Option<RecordId>>
    where
        K: Decoder + Ord,
    {
        let mut route = Route::new(RouteAction::Search);
        let Some(page_id) = self.find_route(KeyCondition::Equal(key), &mut route).await? else {
            return Ok(None);
        };
        let leaf = route.latch(&page_id).decode::<Node<K>>()?.assume_leaf();
        Ok(leaf.search(key))
    }

    /// Inserts a unique key. Returns false, leaving the tree untouched, when
    /// the key is already present.
    pub async fn insert(&self, key: K, value: RecordId) -> StorageResult<bool>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        let mut route = Route::new(RouteAction::Insert);
        match self.find_route(KeyCondition::Equal(&key), &mut route).await? {
            Some(page_id) => self.insert_inner(page_id, route, key, value).await,
            None => {
                self.init_tree(&mut route, key, value).await?;
                Ok(true)
            }
        }
    }

    /// Removes a key, returning the entry it held. Pages emptied by merges
    /// are deleted once every latch of the operation has been released.
    pub async fn delete(&self, key: &K) -> StorageResult<Option<(K, RecordId)>>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        let mut route = Route::new(RouteAction::Delete);
        let Some(page_id) = self.find_route(KeyCondition::Equal(key), &mut route).await? else {
            return Ok(None);
        };
        let removed = self.delete_inner(page_id, &mut route, key).await?;
        let deleted = mem::take(&mut route.deleted);
        drop(route);
        for page_id in deleted {
            if self.buffer_pool.delete_page(page_id).await?.is_none() {
                debug!("page {} still referenced, left to the replacer", page_id);
            }
        }
        Ok(removed)
    }

    /// Cursor positioned at the smallest key.
    pub async fn iter(&self) -> StorageResult<IndexIter<K>>
    where
        K: Decoder + Ord,
    {
        let mut route = Route::new(RouteAction::Search);
        let Some(page_id) = self.find_route(KeyCondition::Min, &mut route).await? else {
            return Ok(IndexIter::empty(self.buffer_pool.clone()));
        };
        let leaf = route.latch(&page_id).decode::<Node<K>>()?.assume_leaf();
        Ok(IndexIter::new(self.buffer_pool.clone(), leaf, 0))
    }

    /// Cursor positioned at the first key `>= key`.
    pub async fn iter_from(&self, key: &K) -> StorageResult<IndexIter<K>>
    where
        K: Decoder + Ord,
    {
        let mut route = Route::new(RouteAction::Search);
        let Some(page_id) = self.find_route(KeyCondition::Equal(key), &mut route).await? else {
            return Ok(IndexIter::empty(self.buffer_pool.clone()));
        };
        let leaf = route.latch(&page_id).decode::<Node<K>>()?.assume_leaf();
        let position = leaf
            .kv
            .binary_search_by(|(k, _)| k.cmp(key))
            .unwrap_or_else(|index| index);
        Ok(IndexIter::new(self.buffer_pool.clone(), leaf, position))
    }

    /// Descends to the leaf responsible for `key`, latching pages in crab
    /// fashion. Writers release the root guard and all ancestor latches as
    /// soon as the current page is safe for the operation; whatever is still
    /// held when the leaf is reached ends up in `route`. Returns `None` on
    /// an empty tree, with the root guard parked in `route`.
    async fn find_route<'a>(
        &'a self,
        key: KeyCondition<&K>,
        route: &mut Route<'a>,
    ) -> StorageResult<Option<PageId>>
    where
        K: Decoder + Ord,
    {
        let root_latch = match route.action {
            RouteAction::Search => RootLatch::Read(self.root.read().await),
            RouteAction::Insert | RouteAction::Delete => RootLatch::Write(self.root.write().await),
        };
        let mut page_id = *root_latch;
        route.root_latch = Some(root_latch);
        if page_id == NULL_PAGE {
            return Ok(None);
        }
        loop {
            let page = self
                .buffer_pool
                .fetch_page_ref(page_id)
                .await?
                .ok_or(buffer::Error::BufferInsufficient)?;
            let (latch, node) = match route.action {
                RouteAction::Search => {
                    let guard = page.data_read_owned().await;
                    let node = guard.decode::<Node<K>>()?;
                    (Latch::Read(guard), node)
                }
                RouteAction::Insert | RouteAction::Delete => {
                    let guard = page.data_write_owned().await;
                    let node = guard.decode::<Node<K>>()?;
                    (Latch::Write(guard), node)
                }
            };
            let safe = match route.action {
                RouteAction::Search => true,
                RouteAction::Insert => node.allow_insert(),
                RouteAction::Delete => node.allow_delete(),
            };
            if safe {
                route.release_ancestors();
            }
            route.nodes.insert(page_id, latch);
            match node {
                Node::Internal(ref internal) => {
                    page_id = match key {
                        KeyCondition::Min => internal.kv[0].1,
                        KeyCondition::Equal(key) => internal.search(key).1,
                    };
                }
                Node::Leaf(_) => return Ok(Some(page_id)),
            }
        }
    }

    /// First insert into an empty tree: a fresh leaf becomes the root.
    async fn init_tree(&self, route: &mut Route<'_>, key: K, value: RecordId) -> StorageResult<()>
    where
        K: Encoder,
    {
        let mut node = Node::Leaf(Leaf {
            header: Header {
                size: 1,
                max_size: self.leaf_max_size,
                parent: None,
                page_id: 0,
                next: None,
            },
            kv: vec![(key, value)],
        });
        let mut latch = self.buffer_pool.new_page_write_owned(&mut node).await?;
        latch.encode(&node)?;
        self.set_root(route, node.page_id()).await
    }

    async fn insert_inner(
        &self,
        page_id: PageId,
        mut route: Route<'_>,
        key: K,
        value: RecordId,
    ) -> StorageResult<bool>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        let mut latch = route.take_latch(&page_id).assume_write();
        let mut node: Node<K> = latch.decode()?;
        {
            let leaf = node.assume_leaf_mut();
            match leaf.kv.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(_) => return Ok(false),
                Err(index) => leaf.insert(index, key, value),
            }
        }
        loop {
            if !node.is_overflow() {
                latch.encode(&node)?;
                return Ok(true);
            }
            let (median_key, mut sibling) = node.split();
            let mut sibling_latch = self.buffer_pool.new_page_write_owned(&mut sibling).await?;
            let sibling_page_id = sibling.page_id();
            debug!("page {} split, new sibling {}", node.page_id(), sibling_page_id);
            match (&mut node, &sibling) {
                (Node::Leaf(leaf), Node::Leaf(_)) => {
                    // the sibling inherited this leaf's old next pointer
                    leaf.header.next = Some(sibling_page_id);
                }
                (Node::Internal(_), Node::Internal(sibling_internal)) => {
                    for (_, child_id) in sibling_internal.kv.iter() {
                        self.reparent(*child_id, sibling_page_id).await?;
                    }
                }
                _ => unreachable!(),
            }
            match node.parent() {
                Some(parent_id) => {
                    let mut parent_latch = route.take_latch(&parent_id).assume_write();
                    let mut parent_node: Node<K> = parent_latch.decode()?;
                    {
                        let internal = parent_node.assume_internal_mut();
                        let index = internal
                            .value_index(node.page_id())
                            .unwrap_or_else(|| unreachable!("split child missing from parent"));
                        internal.insert_at(index + 1, median_key, sibling_page_id);
                    }
                    sibling_latch.encode(&sibling)?;
                    latch.encode(&node)?;
                    // the parent may be oversize now; the next round splits
                    // it before it is written back
                    node = parent_node;
                    latch = parent_latch;
                }
                None => {
                    let mut root_node = Node::Internal(Internal {
                        header: Header {
                            size: 2,
                            max_size: self.internal_max_size,
                            parent: None,
                            page_id: 0,
                            next: None,
                        },
                        kv: vec![
                            (K::default(), node.page_id()),
                            (median_key, sibling_page_id),
                        ],
                    });
                    let mut root_latch =
                        self.buffer_pool.new_page_write_owned(&mut root_node).await?;
                    let root_page_id = root_node.page_id();
                    node.set_parent(Some(root_page_id));
                    sibling.set_parent(Some(root_page_id));
                    root_latch.encode(&root_node)?;
                    sibling_latch.encode(&sibling)?;
                    latch.encode(&node)?;
                    self.set_root(&mut route, root_page_id).await?;
                    return Ok(true);
                }
            }
        }
    }

    async fn delete_inner(
        &self,
        page_id: PageId,
        route: &mut Route<'_>,
        key: &K,
    ) -> StorageResult<Option<(K, RecordId)>>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        let mut latch = route.take_latch(&page_id).assume_write();
        let mut node: Node<K> = latch.decode()?;
        let removed = match node.assume_leaf_mut().remove(key) {
            None => return Ok(None),
            Some(entry) => entry,
        };
        latch.encode(&node)?;
        loop {
            match node.parent() {
                None => {
                    self.adjust_root(route, &node, latch).await?;
                    return Ok(Some(removed));
                }
                Some(parent_id) => {
                    if !node.is_underflow() {
                        return Ok(Some(removed));
                    }
                    let mut parent_latch = route.take_latch(&parent_id).assume_write();
                    let mut parent: Internal<K> =
                        parent_latch.decode::<Node<K>>()?.assume_internal();
                    let index = parent
                        .value_index(node.page_id())
                        .unwrap_or_else(|| unreachable!("underflow child missing from parent"));
                    if self
                        .redistribute(&mut parent, index, &mut node, &mut latch)
                        .await?
                    {
                        parent_latch.encode(&Node::Internal(parent))?;
                        return Ok(Some(removed));
                    }
                    self.coalesce(route, &mut parent, index, node, latch).await?;
                    let parent_node = Node::Internal(parent);
                    parent_latch.encode(&parent_node)?;
                    node = parent_node;
                    latch = parent_latch;
                }
            }
        }
    }

    /// Moves one entry from the preferred sibling (left when there is one)
    /// into the underflowing node and fixes the separator in the parent.
    /// Returns false when the sibling has nothing to spare.
    async fn redistribute(
        &self,
        parent: &mut Internal<K>,
        index: usize,
        node: &mut Node<K>,
        latch: &mut OwnedPageDataWriteGuard,
    ) -> StorageResult<bool>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        if index > 0 {
            let sibling_id = parent.kv[index - 1].1;
            let mut sibling_latch = self.buffer_pool.fetch_page_write_owned(sibling_id).await?;
            let mut sibling: Node<K> = sibling_latch.decode()?;
            match (&mut *node, &mut sibling) {
                (Node::Leaf(leaf), Node::Leaf(sibling_leaf)) => {
                    let Some((key, value)) = sibling_leaf.steal_last() else {
                        return Ok(false);
                    };
                    leaf.push_front(key, value);
                    parent.set_key_at(index, leaf.kv[0].0.clone());
                }
                (Node::Internal(internal), Node::Internal(sibling_internal)) => {
                    let Some((key, child_id)) = sibling_internal.steal_last() else {
                        return Ok(false);
                    };
                    // the parent separator comes down, the stolen key goes up
                    let separator = mem::replace(parent.key_at_mut(index), key);
                    internal.push_front(separator, child_id);
                    self.reparent(child_id, internal.page_id()).await?;
                }
                _ => unreachable!(),
            }
            debug!("page {} borrowed from left sibling {}", latch.page_id(), sibling_id);
            sibling_latch.encode(&sibling)?;
        } else {
            let sibling_id = parent.kv[index + 1].1;
            let mut sibling_latch = self.buffer_pool.fetch_page_write_owned(sibling_id).await?;
            let mut sibling: Node<K> = sibling_latch.decode()?;
            match (&mut *node, &mut sibling) {
                (Node::Leaf(leaf), Node::Leaf(sibling_leaf)) => {
                    let Some((key, value)) = sibling_leaf.steal_first() else {
                        return Ok(false);
                    };
                    leaf.push_back(key, value);
                    parent.set_key_at(index + 1, sibling_leaf.kv[0].0.clone());
                }
                (Node::Internal(internal), Node::Internal(sibling_internal)) => {
                    let Some((promoted, child_id)) = sibling_internal.steal_first() else {
                        return Ok(false);
                    };
                    let separator = mem::replace(parent.key_at_mut(index + 1), promoted);
                    internal.push_back(separator, child_id);
                    self.reparent(child_id, internal.page_id()).await?;
                }
                _ => unreachable!(),
            }
            debug!("page {} borrowed from right sibling {}", latch.page_id(), sibling_id);
            sibling_latch.encode(&sibling)?;
        }
        latch.encode(&*node)?;
        Ok(true)
    }

    /// Merges the underflowing node with its preferred sibling into the left
    /// of the two pages and removes the separator from the parent. The
    /// emptied page is queued for deletion at the end of the operation.
    async fn coalesce(
        &self,
        route: &mut Route<'_>,
        parent: &mut Internal<K>,
        index: usize,
        node: Node<K>,
        latch: OwnedPageDataWriteGuard,
    ) -> StorageResult<()>
    where
        K: Decoder + Encoder + Ord + Clone + Default,
    {
        if index > 0 {
            // merge node into its left sibling
            let sibling_id = parent.kv[index - 1].1;
            let mut sibling_latch = self.buffer_pool.fetch_page_write_owned(sibling_id).await?;
            let mut sibling: Node<K> = sibling_latch.decode()?;
            let (separator, _) = parent.remove_at(index);
            match (&mut sibling, node) {
                (Node::Leaf(left), Node::Leaf(mut right)) => {
                    left.merge(&mut right);
                }
                (Node::Internal(left), Node::Internal(mut right)) => {
                    let moved = right.kv.iter().map(|(_, child)| *child).collect::<Vec<_>>();
                    left.merge(separator, &mut right);
                    for child_id in moved {
                        self.reparent(child_id, left.page_id()).await?;
                    }
                }
                _ => unreachable!(),
            }
            debug!("page {} merged into left sibling {}", latch.page_id(), sibling_id);
            sibling_latch.encode(&sibling)?;
            route.deleted.push(latch.page_id());
        } else {
            // no left sibling: pull the right sibling into the node
            let sibling_id = parent.kv[index + 1].1;
            let mut sibling_latch = self.buffer_pool.fetch_page_write_owned(sibling_id).await?;
            let sibling: Node<K> = sibling_latch.decode()?;
            let (separator, _) = parent.remove_at(index + 1);
            let mut node = node;
            match (&mut node, sibling) {
                (Node::Leaf(left), Node::Leaf(mut right)) => {
                    left.merge(&mut right);
                }
                (Node::Internal(left), Node::Internal(mut right)) => {
                    let moved = right.kv.iter().map(|(_, child)| *child).collect::<Vec<_>>();
                    left.merge(separator, &mut right);
                    for child_id in moved {
                        self.reparent(child_id, left.page_id()).await?;
                    }
                }
                _ => unreachable!(),
            }
            debug!("page {} absorbed right sibling {}", latch.page_id(), sibling_id);
            let mut latch = latch;
            latch.encode(&node)?;
            route.deleted.push(sibling_latch.page_id());
        }
        Ok(())
    }

    /// Handles underflow at the root: an internal root left with a single
    /// child hands the tree over to that child, an emptied leaf root leaves
    /// the tree empty. Anything else is left alone.
    async fn adjust_root(
        &self,
        route: &mut Route<'_>,
        node: &Node<K>,
        latch: OwnedPageDataWriteGuard,
    ) -> StorageResult<()>
    where
        K: Decoder + Encoder,
    {
        match node {
            Node::Internal(internal) if internal.header.size == 1 => {
                let child_id = internal.kv[0].1;
                let mut child_latch = self.buffer_pool.fetch_page_write_owned(child_id).await?;
                let mut child: Node<K> = child_latch.decode()?;
                child.set_parent(None);
                child_latch.encode(&child)?;
                self.set_root(route, child_id).await?;
                route.deleted.push(latch.page_id());
            }
            Node::Leaf(leaf) if leaf.header.size == 0 => {
                self.set_root(route, NULL_PAGE).await?;
                route.deleted.push(latch.page_id());
            }
            _ => {}
        }
        Ok(())
    }

    /// Publishes a new root id through the held root guard and mirrors it
    /// into this index's header page record.
    async fn set_root(&self, route: &mut Route<'_>, new_root: PageId) -> StorageResult<()> {
        match route.root_latch.as_mut() {
            Some(RootLatch::Write(guard)) => **guard = new_root,
            _ => unreachable!("root change without the root guard held"),
        }
        let mut header_latch = self
            .buffer_pool
            .fetch_page_write_owned(HEADER_PAGE_ID)
            .await?;
        let mut header: HeaderPage = header_latch.decode()?;
        if !header.update_record(&self.name, new_root) {
            header.insert_record(&self.name, new_root);
        }
        header_latch.encode(&header)?;
        debug!("index {} root changed to {}", self.name, new_root);
        Ok(())
    }

    async fn reparent(&self, child_id: PageId, parent_id: PageId) -> StorageResult<()>
    where
        K: Decoder + Encoder,
    {
        let mut child_latch = self.buffer_pool.fetch_page_write_owned(child_id).await?;
        let mut child: Node<K> = child_latch.decode()?;
        child.set_parent(Some(parent_id));
        child_latch.encode(&child)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum KeyCondition<K> {
    Min,
    Equal(K),
}

enum RouteAction {
    Search,
    Insert,
    Delete,
}

/// Per-operation scratch: the write latches still held (in acquisition
/// order), the root guard sentinel, and the pages queued for deletion once
/// everything has been released.
struct Route<'a> {
    action: RouteAction,
    // declared before the page latches so the guard is also released first
    // when the route is dropped wholesale
    root_latch: Option<RootLatch<'a>>,
    nodes: IndexMap<PageId, Latch>,
    deleted: Vec<PageId>,
}

impl Route<'_> {
    fn new(action: RouteAction) -> Self {
        Self {
            action,
            root_latch: None,
            nodes: IndexMap::new(),
            deleted: Vec::new(),
        }
    }

    /// Drops the root guard and every held latch, in acquisition order.
    fn release_ancestors(&mut self) {
        self.root_latch = None;
        self.nodes.clear();
    }

    fn latch(&self, page_id: &PageId) -> &Latch {
        self.nodes
            .get(page_id)
            .unwrap_or_else(|| unreachable!("latch for page {} not held", page_id))
    }

    fn take_latch(&mut self, page_id: &PageId) -> Latch {
        self.nodes
            .shift_remove(page_id)
            .unwrap_or_else(|| unreachable!("latch for page {} not held", page_id))
    }
}

enum Latch {
    Read(OwnedPageDataReadGuard),
    Write(OwnedPageDataWriteGuard),
}

impl Latch {
    fn decode<T>(&self) -> Result<T, buffer::Error>
    where
        T: Decoder,
    {
        match self {
            Latch::Read(guard) => guard.decode(),
            Latch::Write(guard) => guard.decode(),
        }
    }

    fn assume_write(self) -> OwnedPageDataWriteGuard {
        match self {
            Latch::Write(guard) => guard,
            Latch::Read(_) => unreachable!("write latch expected"),
        }
    }
}

enum RootLatch<'a> {
    Read(RwLockReadGuard<'a, PageId>),
    Write(RwLockWriteGuard<'a, PageId>),
}

impl Deref for RootLatch<'_> {
    type Target = PageId;

    fn deref(&self) -> &Self::Target {
        match self {
            RootLatch::Read(guard) => guard.deref(),
            RootLatch::Write(guard) => guard.deref(),
        }
    }
}

#[cfg(test)]
impl<K> Index<K>
where
    K: Decoder + Ord + Clone,
{
    /// Walks the whole tree checking ordering, size bounds, parent pointers
    /// and the leaf chain.
    async fn check_integrity(&self) -> StorageResult<()> {
        use std::collections::VecDeque;
        let root_id = *self.root.read().await;
        if root_id == NULL_PAGE {
            return Ok(());
        }
        let mut queue = VecDeque::from([(root_id, None::<PageId>, None::<K>, None::<K>)]);
        let mut leaves: Vec<Leaf<K>> = Vec::new();
        while let Some((page_id, parent, lower, upper)) = queue.pop_front() {
            let (_page, node) = self.buffer_pool.fetch_page_node::<K>(page_id).await?;
            match node {
                Node::Internal(internal) => {
                    assert_eq!(internal.page_id(), page_id);
                    assert_eq!(internal.parent(), parent);
                    assert_eq!(internal.header.size, internal.kv.len());
                    assert!(internal.header.size <= internal.header.max_size);
                    if parent.is_some() {
                        assert!(internal.header.size >= internal.min_size());
                    }
                    let keys = internal.kv[1..]
                        .iter()
                        .map(|(key, _)| key.clone())
                        .collect::<Vec<_>>();
                    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
                    if let (Some(lower), Some(first)) = (lower.as_ref(), keys.first()) {
                        assert!(lower <= first);
                    }
                    if let (Some(upper), Some(last)) = (upper.as_ref(), keys.last()) {
                        assert!(last < upper);
                    }
                    for (slot, (_, child)) in internal.kv.iter().enumerate() {
                        let child_lower = if slot == 0 {
                            lower.clone()
                        } else {
                            Some(internal.kv[slot].0.clone())
                        };
                        let child_upper = internal
                            .kv
                            .get(slot + 1)
                            .map(|(key, _)| key.clone())
                            .or_else(|| upper.clone());
                        queue.push_back((*child, Some(page_id), child_lower, child_upper));
                    }
                }
                Node::Leaf(leaf) => {
                    assert_eq!(leaf.page_id(), page_id);
                    assert_eq!(leaf.parent(), parent);
                    assert_eq!(leaf.header.size, leaf.kv.len());
                    if parent.is_some() {
                        assert!(leaf.header.size >= leaf.min_size());
                        assert!(leaf.header.size < leaf.header.max_size);
                    }
                    assert!(leaf.kv.windows(2).all(|pair| pair[0].0 < pair[1].0));
                    for (key, _) in leaf.kv.iter() {
                        if let Some(lower) = lower.as_ref() {
                            assert!(lower <= key);
                        }
                        if let Some(upper) = upper.as_ref() {
                            assert!(key < upper);
                        }
                    }
                    leaves.push(leaf);
                }
            }
        }
        // breadth-first order visits leaves left to right; the chain must agree
        for pair in leaves.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1].page_id()));
        }
        if let Some(last) = leaves.last() {
            assert_eq!(last.next(), None);
        }
        Ok(())
    }
}
