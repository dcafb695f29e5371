// Library interface for morningbrief modules
// This allows tests and the CLI binary to import modules

pub mod clock;
pub mod error;
pub mod manager;
pub mod model;
pub mod render;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DigestError, DigestResult};
pub use manager::{DigestManager, Imported};
pub use model::{Category, NewsDigest, NewsItem, NewsItemPatch, Section, Slot};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
