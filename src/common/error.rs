use thiserror::Error;

use super::types::PageId;

/// Storage core error types.
///
/// Only genuinely exceptional conditions live here. Recoverable
/// outcomes (page not resident, page still pinned, duplicate index
/// entry, saturated index) are boolean returns on the operations that
/// produce them.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

pub type Result<T> = std::result::Result<T, StrataError>;
