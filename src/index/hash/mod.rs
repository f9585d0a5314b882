mod error;
mod hasher;
mod table;

pub use error::HashIndexError;
pub use hasher::{DefaultKeyHasher, KeyHasher};
pub use table::ExtendibleHashIndex;
