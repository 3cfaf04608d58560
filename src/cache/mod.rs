//! Local artifact cache
//!
//! Maps a `CacheKey` (one immutable remote artifact version) to a directory
//! on local disk. Entries are populated at most once per key, even when
//! several processes on the host fetch the same artifact concurrently.
//!
//! # Entry States
//!
//! | State | On disk | `get_path` |
//! |-------|---------|------------|
//! | Miss | nothing at `<root>/<key>` | `None` |
//! | Populating | `.staging/<key>~<random>/`, key lock held | `None` |
//! | Crashed | staging leftover, lock released by the OS | `None`, swept on next populate |
//! | Complete | `<root>/<key>/.layer-entry.json` | `Some(path)` |

pub mod entry;
pub mod key;
pub mod local;
pub mod lock;

pub use entry::{CacheEntry, CompletionMarker, MARKER_FILE};
pub use key::CacheKey;
pub use local::{LocalCache, ScratchDir};
pub use lock::KeyLock;
