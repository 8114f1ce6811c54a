use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::storage::page::{FrameId, Page, PageId};
use crate::storage::{DiskManager, LogManager};

use super::replacer::{new_replacer, Replacer, ReplacerType};

/// Bookkeeping protected by the instance latch: the page table, the free
/// list, the replacer and the page id counter. The frame contents are not
/// covered here; each frame carries its own reader/writer latch.
struct PoolState {
    /// page table for keeping track of resident pages.
    page_table: HashMap<PageId, FrameId>,
    /// frames that currently hold no page, handed out front first.
    free_list: VecDeque<FrameId>,
    /// picks the eviction victim among the unpinned resident frames.
    replacer: Box<dyn Replacer>,
    /// the next page id this instance will allocate.
    next_page_id: PageId,
}

/// One buffer pool instance owning a fixed array of frames. It moves
/// physical pages back and forth between main memory and the disk
/// manager, so the system can work with databases larger than the memory
/// available to it.
///
/// Clients address pages by id and never learn whether a page was already
/// resident or had to be fetched from disk. A fetched or created page is
/// returned pinned; the client must unpin it once done, at which point it
/// becomes a candidate for eviction again.
///
/// An instance can stand alone or be one shard of a
/// [`ParallelBufferPool`](super::parallel::ParallelBufferPool). In the
/// sharded arrangement, every id this instance allocates routes back to
/// it: `page_id % num_instances == instance_index`.
///
/// Latching: the instance latch covers the bookkeeping and is ordered
/// before the per-frame latches. It is never held across the disk read of
/// a fetch miss; the frame is reserved first so no other caller can race
/// for the same slot or the same page id.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: usize,
    instance_index: usize,
    /// array of frames. the vector index is the FrameId, i.e. the
    /// FrameId is in range [0, pool_size).
    frames: Vec<Arc<Page>>,
    /// the instance latch.
    state: Mutex<PoolState>,
    disk: Arc<dyn DiskManager>,
    log: Arc<dyn LogManager>,
}

impl BufferPoolInstance {
    /// Create a standalone instance that owns the whole page id space.
    pub fn new(
        pool_size: usize,
        replacer_type: ReplacerType,
        disk: Arc<dyn DiskManager>,
        log: Arc<dyn LogManager>,
    ) -> BufferPoolInstance {
        Self::sharded(pool_size, 1, 0, replacer_type, disk, log)
    }

    /// Create one shard of a parallel pool. The instance allocates page
    /// ids congruent to `instance_index` modulo `num_instances`.
    pub fn sharded(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        replacer_type: ReplacerType,
        disk: Arc<dyn DiskManager>,
        log: Arc<dyn LogManager>,
    ) -> BufferPoolInstance {
        assert!(pool_size > 0, "pool size should be larger than zero");
        assert!(num_instances > 0, "number of instances should be larger than zero");
        assert!(
            instance_index < num_instances,
            "instance index should be less than the number of instances"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(Arc::new(Page::new()));
            // initially, every frame is in the free list
            free_list.push_back(i);
        }
        let state = PoolState {
            page_table: HashMap::new(),
            free_list,
            replacer: new_replacer(replacer_type, pool_size),
            next_page_id: instance_index as PageId,
        };
        info!(
            "buffer pool instance {}/{} with {} frames ({:?} replacement)",
            instance_index, num_instances, pool_size, replacer_type
        );
        BufferPoolInstance {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(state),
            disk,
            log,
        }
    }

    /// Number of frames this instance owns.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn instance_index(&self) -> usize {
        self.instance_index
    }

    /// Number of pages currently resident in the pool.
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().unwrap().page_table.len()
    }

    /// Number of frames currently holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().unwrap().free_list.len()
    }

    /// Number of resident frames that could be evicted right now.
    pub fn evictable_frame_count(&self) -> usize {
        self.state.lock().unwrap().replacer.size()
    }

    /// Create a new page in the buffer pool, returning its freshly
    /// allocated id and the pinned frame holding it. The page starts
    /// zeroed and dirty, so it reaches disk on its first eviction or
    /// flush even if the client never writes a byte.
    ///
    /// Fails with [`Error::NoAvailableFrame`] when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, Arc<Page>)> {
        let mut state = self.state.lock()?;
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.allocate_page(&mut state);

        let page = Arc::clone(&self.frames[frame_id]);
        {
            let mut guard = page.write()?;
            guard.id = page_id;
            guard.pin_count = 1;
            guard.is_dirty = true;
            guard.data.fill(0);
        }
        state.page_table.insert(page_id, frame_id);

        Ok((page_id, page))
    }

    /// Fetch the page with the given id, reading it from disk if it is
    /// not resident. The returned frame is pinned; concurrent fetches of
    /// the same page all land on the same frame and each add one pin.
    ///
    /// Fails with [`Error::NoAvailableFrame`] when the page would have to
    /// be read from disk but every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        let mut state = self.state.lock()?;

        // the page is resident already: pin it and hand it out.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = Arc::clone(&self.frames[frame_id]);
            let mut guard = page.write()?;
            guard.pin_count += 1;
            drop(guard);
            state.replacer.pin(frame_id);
            return Ok(page);
        }

        // miss: reserve a frame while still holding the instance latch,
        // so no other caller can claim the same slot or install the same
        // page a second time.
        let frame_id = self.acquire_frame(&mut state)?;
        let page = Arc::clone(&self.frames[frame_id]);
        let mut guard = page.write()?;
        guard.id = page_id;
        guard.pin_count = 1;
        guard.is_dirty = false;
        state.page_table.insert(page_id, frame_id);

        // read the bytes without the instance latch. The frame write
        // latch stays held, so concurrent fetchers of this page block
        // until the data is valid, and delete_page refuses while our
        // reservation pin is outstanding.
        drop(state);
        match self.disk.read_page(page_id, &mut guard.data) {
            Ok(()) => {
                drop(guard);
                Ok(page)
            }
            Err(err) => {
                drop(guard);
                self.rollback_failed_fetch(page_id, frame_id);
                Err(err)
            }
        }
    }

    /// Unpin the given page, with `is_dirty` declaring whether the client
    /// modified it. Returns false if the page is not resident or its pin
    /// count is already zero.
    ///
    /// When the last pin goes away the frame becomes an eviction
    /// candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let mut state = self.state.lock()?;
        let frame_id = state.page_table.get(&page_id);
        if frame_id.is_none() {
            return Ok(false);
        }
        let &frame_id = frame_id.unwrap();

        let mut guard = self.frames[frame_id].write()?;
        if guard.pin_count == 0 {
            return Ok(false);
        }
        guard.pin_count -= 1;
        // a true dirty flag is sticky; only a flush or a delete clears it.
        if is_dirty {
            guard.is_dirty = true;
        }
        if guard.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(true)
    }

    /// Write the page's bytes to disk and clear its dirty flag, pinned or
    /// not. Returns false if the page is not resident. Neither the pin
    /// count nor residency change.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock()?;
        let frame_id = state.page_table.get(&page_id);
        if frame_id.is_none() {
            return Ok(false);
        }
        let &frame_id = frame_id.unwrap();

        let mut guard = self.frames[frame_id].write()?;
        self.log.force_flush_up_to(guard.lsn)?;
        self.disk.write_page(page_id, &guard.data)?;
        guard.is_dirty = false;
        Ok(true)
    }

    /// Write every resident page to disk, clearing the dirty flags. There
    /// is no ordering guarantee between frames.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock()?;
        for (&page_id, &frame_id) in state.page_table.iter() {
            let mut guard = self.frames[frame_id].write()?;
            self.log.force_flush_up_to(guard.lsn)?;
            self.disk.write_page(page_id, &guard.data)?;
            guard.is_dirty = false;
        }
        Ok(())
    }

    /// Drop the page from the pool and tell the disk manager its id died.
    /// A page that is not resident deletes vacuously; a pinned page
    /// refuses with false.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock()?;
        let frame_id = state.page_table.get(&page_id);
        if frame_id.is_none() {
            // nothing resident to tear down.
            return Ok(true);
        }
        let &frame_id = frame_id.unwrap();

        let mut guard = self.frames[frame_id].write()?;
        if guard.pin_count != 0 {
            return Ok(false);
        }
        self.disk.deallocate_page(page_id)?;
        state.page_table.remove(&page_id);
        // an unpinned resident frame sits in the replacer; drop it there
        // before it goes back on the free list.
        state.replacer.pin(frame_id);
        guard.clear();
        drop(guard);
        state.free_list.push_back(frame_id);
        debug!("deleted page {} from frame {}", page_id, frame_id);
        Ok(true)
    }

    /// Pick a frame to hold an incoming page: free list first, then an
    /// eviction victim. A dirty victim is written back (after the log
    /// manager confirms its mutations are durable) and its old mapping is
    /// dropped from the page table. Called under the instance latch.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match state.replacer.victim() {
            Some(frame_id) => frame_id,
            None => return Err(Error::NoAvailableFrame),
        };
        let mut guard = self.frames[frame_id].write()?;
        debug_assert_eq!(0, guard.pin_count, "victim frame must be unpinned");

        if guard.is_dirty {
            debug!("evicting dirty page {} from frame {}", guard.id, frame_id);
            let written = self
                .log
                .force_flush_up_to(guard.lsn)
                .and_then(|_| self.disk.write_page(guard.id, &guard.data));
            if let Err(err) = written {
                // the victim stays resident and evictable.
                drop(guard);
                state.replacer.unpin(frame_id);
                return Err(err);
            }
            guard.is_dirty = false;
        }
        state.page_table.remove(&guard.id);
        guard.clear();
        Ok(frame_id)
    }

    /// A miss-path disk read failed after the frame had been reserved.
    /// Undo the reservation: drop this call's pin, and unless a
    /// concurrent fetch pinned the mapping in the meantime, remove the
    /// page table entry and return the frame to the free list.
    fn rollback_failed_fetch(&self, page_id: PageId, frame_id: FrameId) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        let mut guard = match self.frames[frame_id].write() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        guard.pin_count -= 1;
        if guard.pin_count > 0 {
            // another caller pinned the page while the read was in
            // flight; the mapping stays and they surface their own error
            // when they look at the bytes.
            return;
        }
        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        guard.clear();
        drop(guard);
        state.free_list.push_back(frame_id);
    }

    /// Hand out the next page id owned by this instance. Called under the
    /// instance latch.
    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;
        // allocated pages mod back to this instance
        assert_eq!(
            self.instance_index,
            (page_id % self.num_instances as PageId) as usize,
            "allocated page id does not route back to its instance"
        );
        page_id
    }
}
