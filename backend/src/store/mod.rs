pub mod result_store;

pub use result_store::{ResultStore, StoreSnapshot, StoredImage};
