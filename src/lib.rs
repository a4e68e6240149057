//! Strata - a disk-oriented database storage core
//!
//! This crate provides the storage substrate a disk-oriented DBMS sits
//! on: a buffer pool that caches fixed-size pages of an on-disk file in
//! a bounded set of in-memory frames, and an extendible hash index
//! whose directory and buckets live entirely in those pages.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and page layouts
//!   - `DiskManager`: block-addressed synchronous page reads and writes
//!   - `HashTableDirectoryPage` / `HashTableBucketPage`: typed views
//!     over raw page bytes, with structured accessors at fixed offsets
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolInstance`: pin/unpin lifecycle, LRU eviction, dirty
//!     write-back, page-id allocation
//!   - `ParallelBufferPool`: shards page ids across N instances by
//!     `page_id mod N`
//!   - `LruReplacer`: strict least-recently-used victim selection
//!
//! - **Index** (`index`): page-resident data structures
//!   - `ExtendibleHashTable`: hashed insert/search/remove with bucket
//!     splits and directory doubling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::{BufferPool, ParallelBufferPool};
//! use strata::index::{ExtendibleHashTable, MurmurHasher, OrdComparator};
//! use strata::storage::disk::DiskManager;
//! use strata::{PageId, RecordId};
//!
//! // A pool of 4 instances with 16 frames each over one database file.
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let pool: Arc<dyn BufferPool> =
//!     Arc::new(ParallelBufferPool::new(4, 16, disk_manager, None));
//!
//! // A hash index from u32 keys to record ids, stored in pool pages.
//! let index = ExtendibleHashTable::<u32, RecordId, _, _>::new(
//!     pool.clone(),
//!     OrdComparator,
//!     MurmurHasher::new(),
//! )
//! .unwrap();
//!
//! let rid = RecordId::new(PageId::new(7), 0);
//! index.insert(None, &42, &rid).unwrap();
//! assert_eq!(index.get_value(None, &42).unwrap(), vec![rid]);
//!
//! pool.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, RecordId, Result, StrataError, Transaction};
