mod bucket;
mod codec;
mod directory;

pub use bucket::{BucketInsert, HashBucketPage};
pub use codec::SlotCodec;
pub use directory::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_DEPTH};
