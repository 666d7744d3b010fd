mod base;
mod file;

pub use base::{get_store, EntryMeta, ScratchStore};
pub use file::FileScratchStore;
