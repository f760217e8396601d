/// Column matching and upsert SQL for table copies.
pub mod plan;
/// Live PostgreSQL connections: shapes, copies, and patch files.
#[cfg(feature = "db")]
pub mod pg;

pub use plan::{plan_copy, ColumnInfo, CopyPlan, PlanSkip, TableRef, TableShape};
