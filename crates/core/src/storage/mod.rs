pub mod blob;
pub mod index;

pub use blob::{ArchiveStore, FilesystemArchiveStore, ObjectStoreArchiveStore};
pub use index::{ProjectStore, StoreTxn};
