//! Prompt lineage: the history of generated prompts and their enhancements.
//!
//! Entries are kept newest first. Every enhanced entry links to an original
//! entry in the same sequence; an enhancement whose parent is missing is
//! refused rather than stored as an orphan.
//!
//! Flat history from before lineage tracking is converted once by
//! [`PromptLineageStore::migrate_legacy`].

pub mod entry;
pub mod migrate;
pub mod persistence;
pub mod store;

pub use entry::{EntryType, LegacyEntry, LegacyTimestamp, LineageGroup, PromptEntry};
pub use migrate::MigrationOutcome;
pub use persistence::{DocumentLineagePersistence, LineagePersistence, LINEAGE_DOCUMENT_VERSION};
pub use store::PromptLineageStore;
