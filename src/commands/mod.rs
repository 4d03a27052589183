pub mod collect;
pub mod collect_snapshot;
pub mod drain;
pub mod init_schema;
