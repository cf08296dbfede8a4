// ABOUTME: Persistence layer for promptui: an append-only archive of rendered prompt snapshots.
// ABOUTME: The archive plugs into sessions as their snapshot sink.

pub mod archive;

pub use archive::{ARCHIVE_FILE, SnapshotError, SnapshotRecord, SnapshotStore};
