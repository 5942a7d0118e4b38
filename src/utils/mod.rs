//! # 通用工具

pub mod snapshot;

pub use snapshot::SnapshotCell;
