use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::page::{Page, PageId};
use crate::storage::{DiskManager, LogManager};

use super::bufferpool::BufferPoolInstance;
use super::replacer::ReplacerType;

/// A buffer pool sharded over independent instances to cut latch
/// contention. Every page id belongs to exactly one shard, `page_id mod
/// num_instances`, and all page-keyed operations route there; new pages
/// are allocated round-robin so the shards fill evenly.
///
/// The shards share one disk manager and one log manager and add no
/// latches of their own on top of the per-instance ones.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// where the next new_page starts probing. Only a load-spreading
    /// hint, so plain relaxed updates are enough.
    starting_index: AtomicUsize,
}

impl ParallelBufferPool {
    /// Create `num_instances` shards of `pool_size` frames each.
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        replacer_type: ReplacerType,
        disk: Arc<dyn DiskManager>,
        log: Arc<dyn LogManager>,
    ) -> Result<ParallelBufferPool> {
        if num_instances == 0 {
            return Err(Error::value("parallel pool needs at least one instance"));
        }
        let mut instances = Vec::with_capacity(num_instances);
        for index in 0..num_instances {
            instances.push(BufferPoolInstance::sharded(
                pool_size,
                num_instances,
                index,
                replacer_type,
                Arc::clone(&disk),
                Arc::clone(&log),
            ));
        }
        Ok(ParallelBufferPool { instances, starting_index: AtomicUsize::new(0) })
    }

    /// Total number of frames across all shards.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|bpm| bpm.pool_size()).sum()
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The shard that owns the given page id. rem_euclid keeps ids that
    /// were never allocated (including negative ones) from panicking;
    /// they simply route to a shard that does not know them.
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let index = page_id.rem_euclid(self.instances.len() as PageId) as usize;
        &self.instances[index]
    }

    /// Create a new page on the first shard with a frame to spare,
    /// probing round-robin from a rotating start.
    pub fn new_page(&self) -> Result<(PageId, Arc<Page>)> {
        let start = self.starting_index.load(Ordering::Relaxed);
        for offset in 0..self.instances.len() {
            let index = (start + offset) % self.instances.len();
            match self.instances[index].new_page() {
                Ok(created) => {
                    self.starting_index.fetch_add(1, Ordering::Relaxed);
                    return Ok(created);
                }
                Err(Error::NoAvailableFrame) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::NoAvailableFrame)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Flush every resident page of every shard.
    pub fn flush_all_pages(&self) -> Result<()> {
        for bpm in &self.instances {
            bpm.flush_all_pages()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::storage::memory::MemoryDiskManager;
    use crate::storage::StubLogManager;

    fn new_parallel(num_instances: usize, pool_size: usize) -> Result<ParallelBufferPool> {
        ParallelBufferPool::new(
            num_instances,
            pool_size,
            ReplacerType::Lru,
            Arc::new(MemoryDiskManager::new()),
            Arc::new(StubLogManager),
        )
    }

    #[test]
    fn test_pool_size_is_sum_of_shards() -> Result<()> {
        let pool = new_parallel(4, 10)?;
        assert_eq!(40, pool.pool_size());
        assert_eq!(4, pool.num_instances());
        assert!(new_parallel(0, 10).is_err());
        Ok(())
    }

    #[test]
    fn test_round_robin_allocation_covers_all_shards() -> Result<()> {
        let pool = new_parallel(4, 10)?;

        // Scenario: the first four creations land on four distinct
        // shards, one each, so the ids modulo 4 form a permutation of
        // 0..4.
        let mut shards = HashSet::new();
        for _ in 0..4 {
            let (page_id, _) = pool.new_page()?;
            shards.insert(page_id.rem_euclid(4));
        }
        assert_eq!(4, shards.len());
        Ok(())
    }

    #[test]
    fn test_page_ops_route_to_owner() -> Result<()> {
        let pool = new_parallel(4, 10)?;

        let mut page_ids = Vec::new();
        for _ in 0..8 {
            let (page_id, page) = pool.new_page()?;
            page.write()?.data_mut()[0] = page_id as u8;
            assert_eq!(true, pool.unpin_page(page_id, true)?);
            page_ids.push(page_id);
        }

        // Scenario: fetches find every page again on its owning shard
        // and read back what was written there.
        for &page_id in &page_ids {
            let page = pool.fetch_page(page_id)?;
            assert_eq!(page_id as u8, page.read()?.data()[0]);
            assert_eq!(true, pool.unpin_page(page_id, false)?);
        }

        // operations on ids no shard knows are clean failures.
        assert_eq!(false, pool.unpin_page(9999, false)?);
        assert_eq!(false, pool.flush_page(9999)?);
        assert_eq!(true, pool.delete_page(9999)?);
        assert_eq!(false, pool.unpin_page(-1, false)?);
        Ok(())
    }

    #[test]
    fn test_new_page_spills_to_other_shards() -> Result<()> {
        let pool = new_parallel(2, 1)?;

        // Scenario: with one frame per shard, the first two creations
        // fill the pool, the third fails everywhere.
        let (page_id0, _) = pool.new_page()?;
        let (page_id1, _) = pool.new_page()?;
        assert_ne!(
            page_id0.rem_euclid(2),
            page_id1.rem_euclid(2),
            "two creations should spread over both shards"
        );
        assert_eq!(Err(Error::NoAvailableFrame), pool.new_page().map(|(id, _)| id));

        // Scenario: unpinning one page frees exactly one shard; the next
        // creation must land there regardless of the rotating start.
        assert_eq!(true, pool.unpin_page(page_id0, false)?);
        let (page_id2, _) = pool.new_page()?;
        assert_eq!(page_id0.rem_euclid(2), page_id2.rem_euclid(2));
        Ok(())
    }

    #[test]
    fn test_flush_all_pages_covers_every_shard() -> Result<()> {
        let disk = Arc::new(MemoryDiskManager::new());
        let pool = ParallelBufferPool::new(
            4,
            10,
            ReplacerType::Clock,
            Arc::clone(&disk) as Arc<dyn DiskManager>,
            Arc::new(StubLogManager),
        )?;

        let mut page_ids = Vec::new();
        for i in 0..8u8 {
            let (page_id, page) = pool.new_page()?;
            page.write()?.data_mut()[0] = i;
            assert_eq!(true, pool.unpin_page(page_id, true)?);
            page_ids.push(page_id);
        }
        pool.flush_all_pages()?;

        for (i, &page_id) in page_ids.iter().enumerate() {
            let mut buf = vec![0u8; crate::storage::page::PAGE_SIZE];
            disk.read_page(page_id, &mut buf)?;
            assert_eq!(i as u8, buf[0]);
        }
        Ok(())
    }
}
