//! # strata
//!
//! Metadata and compaction planning core of an LSM-tree storage engine.
//!
//! ## Features
//!
//! - **Manifest**: An append-only journal of session records describing
//!   every change to the set of table files
//! - **Versions**: Immutable snapshots of the per-level file layout,
//!   published atomically and readable without locks
//! - **Recovery**: Rebuild the current version by replaying the manifest,
//!   strictly or tolerating damaged records
//! - **Compaction Planning**: Size- and seek-triggered picking, range
//!   compactions, input expansion and output-splitting heuristics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata::{FileStorage, MemTables, Options, Session, SessionRecord};
//!
//! let storage = Arc::new(FileStorage::open("./my_data")?);
//! let mut session = Session::open(storage, Options::default(), Arc::new(MemTables::new()))?;
//! if !session.recover()? {
//!     session.create()?;
//! }
//!
//! let mut rec = SessionRecord::new();
//! rec.set_journal_num(session.new_file_number());
//! session.commit(&mut rec)?;
//!
//! if let Some(compaction) = session.pick_compaction() {
//!     println!("compact level {}", compaction.level());
//! }
//! ```

// Public modules
pub mod error;
pub mod options;
pub mod types;

// Session
pub mod session;

// Components
pub mod compaction;
pub mod journal;
pub mod storage;
pub mod table;
pub mod util;
pub mod version;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{Options, OptionsBuilder, SyncMode, MAX_LEVELS};
pub use types::{InternalKey, ValueType};

// Session
pub use session::{Session, VersionReader};

// Versions
pub use version::{FileMetadata, SessionRecord, Version};

// Compaction
pub use compaction::{Compaction, CompactionReason};

// Storage and tables
pub use storage::{FileDesc, FileKind, FileStorage, MemStorage, Storage};
pub use table::{MemTables, ReadOptions, TableOps};

// Comparators
pub use util::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
