use std::ops::Deref;
use std::sync::RwLock;

/// Identifier of a page on disk. Allocated ids are non-negative; the
/// special value [`INVALID_PAGE_ID`] marks a frame that holds no page.
pub type PageId = i32;

/// Index of a frame slot within a single buffer pool instance, always in
/// the range `[0, pool_size)`.
pub type FrameId = usize;

/// Size of a data page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Invalid page id.
pub const INVALID_PAGE_ID: PageId = -1;

/// The actual frame content: the resident page's bytes plus the in-memory
/// bookkeeping like the dirty bit, the pin count and the last-modifying
/// log sequence number.
pub struct PageData {
    pub(crate) id: PageId,
    pub(crate) data: Vec<u8>,
    pub(crate) is_dirty: bool,
    pub(crate) pin_count: i32,
    pub(crate) lsn: u64,
}

impl PageData {
    pub(crate) fn new() -> Self {
        Self {
            id: INVALID_PAGE_ID,
            data: vec![0; PAGE_SIZE],
            is_dirty: false,
            pin_count: 0,
            lsn: 0,
        }
    }

    /// Id of the resident page, or [`INVALID_PAGE_ID`] when the frame is
    /// empty.
    pub fn page_id(&self) -> PageId {
        self.id
    }

    /// Number of clients currently holding this frame. A frame with a pin
    /// count of zero is eligible for eviction.
    pub fn pin_count(&self) -> i32 {
        self.pin_count
    }

    /// Whether the in-memory bytes diverge from the on-disk copy.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Log sequence number of the last modification, zero when the client
    /// does not track one.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        self.lsn = lsn;
    }

    /// The page bytes, always exactly [`PAGE_SIZE`] long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the page bytes. Mutating the bytes does not mark
    /// the frame dirty by itself; the client declares that on unpin.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset the frame to the empty state, zeroing the buffer.
    pub(crate) fn clear(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.is_dirty = false;
        self.pin_count = 0;
        self.lsn = 0;
        self.data.fill(0);
    }
}

/// Page acts as the container of the actual page data for providing
/// concurrent access protection: readers of the bytes share the latch,
/// writers exclude each other and all readers.
pub struct Page {
    inner: RwLock<PageData>,
}

impl Page {
    /// Allocate a frame in memory with a zeroed [`PAGE_SIZE`] buffer and
    /// init the metadata accordingly.
    pub(crate) fn new() -> Self {
        Page { inner: RwLock::new(PageData::new()) }
    }
}

impl Deref for Page {
    type Target = RwLock<PageData>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
