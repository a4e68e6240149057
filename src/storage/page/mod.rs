mod hash_bucket_page;
mod hash_directory_page;
mod storable;

pub use hash_bucket_page::*;
pub use hash_directory_page::*;
pub use storable::*;
