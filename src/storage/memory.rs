use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::page::PageId;
use crate::storage::{check_page_io, DiskManager};

/// An in-memory disk manager, mainly for tests and ephemeral pools.
/// Pages live in a BTreeMap keyed by page id; a single mutex is enough
/// since there is no real I/O to overlap.
#[derive(Debug)]
pub struct MemoryDiskManager {
    pages: Mutex<BTreeMap<PageId, Vec<u8>>>,
}

impl MemoryDiskManager {
    pub fn new() -> MemoryDiskManager {
        MemoryDiskManager { pages: Mutex::new(BTreeMap::new()) }
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        let pages = self.pages.lock()?;
        match pages.get(&page_id) {
            Some(bytes) => buf.copy_from_slice(bytes),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        check_page_io(page_id, buf.len())?;
        let mut pages = self.pages.lock()?;
        pages.insert(page_id, buf.to_vec());
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut pages = self.pages.lock()?;
        pages.remove(&page_id);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::page::PAGE_SIZE;

    #[test]
    fn test_unwritten_page_reads_as_zeroes() -> Result<()> {
        let disk = MemoryDiskManager::new();
        let mut buf = vec![0xau8; PAGE_SIZE];
        disk.read_page(3, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_write_read_round_trip() -> Result<()> {
        let disk = MemoryDiskManager::new();
        let mut data = vec![0u8; PAGE_SIZE];
        data[..5].copy_from_slice(b"hello");
        disk.write_page(0, &data)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(0, &mut buf)?;
        assert_eq!(data, buf);
        Ok(())
    }

    #[test]
    fn test_deallocated_page_reads_as_zeroes() -> Result<()> {
        let disk = MemoryDiskManager::new();
        let data = vec![0x7fu8; PAGE_SIZE];
        disk.write_page(1, &data)?;
        disk.deallocate_page(1)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(1, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_rejects_bad_arguments() -> Result<()> {
        let disk = MemoryDiskManager::new();
        let mut short = vec![0u8; 16];
        assert!(matches!(disk.read_page(0, &mut short), Err(Error::Value(_))));
        assert!(matches!(disk.write_page(-1, &vec![0u8; PAGE_SIZE]), Err(Error::Value(_))));
        Ok(())
    }
}
