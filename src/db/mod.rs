pub mod store;
pub mod memstore;
pub mod pgstore;

pub use memstore::MemStore;
pub use pgstore::PgStore;
pub use store::{DocStore, StoreError, StoreResult};
