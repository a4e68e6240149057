use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
/// The database file is a flat array of PAGE_SIZE blocks addressed by
/// page id; page identifier allocation is the buffer pool's job, so the
/// disk layer never tracks which pages are live.
pub struct DiskManager {
    /// The database file. One mutex guards the shared cursor.
    file: Mutex<File>,
    /// Path the file was opened from
    db_path: PathBuf,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    ///
    /// A page that was never written reads back as zeroes: short reads
    /// past the end of the file zero-fill the remainder of the buffer.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            let n = file.read(&mut data[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total < PAGE_SIZE {
            data[total..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Forces all file state down to the storage device.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_manager_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let page_id = PageId::new(3);

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_unwritten_page_is_zeroed() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let mut data = [0xFFu8; PAGE_SIZE];
        dm.read_page(PageId::new(7), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        {
            let dm = DiskManager::new(&path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(PageId::new(1), &data).unwrap();
        }

        {
            let dm = DiskManager::new(&path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(1), &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }

    #[test]
    fn test_disk_manager_counters() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let data = [0u8; PAGE_SIZE];
        dm.write_page(PageId::new(0), &data).unwrap();
        dm.write_page(PageId::new(1), &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(0), &mut buf).unwrap();

        assert_eq!(dm.num_writes(), 2);
        assert_eq!(dm.num_reads(), 1);
    }
}
