/// Versioned knowledge-base files.
pub mod knowledge;
/// Duplicate migration detection.
pub mod migrations;

pub use knowledge::{sync_knowledge, SyncOptions, SyncReport, Version};
pub use migrations::{find_redundant_migrations, prune_migrations, RedundantMigration};
