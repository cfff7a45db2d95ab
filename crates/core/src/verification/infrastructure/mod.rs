pub mod jpeg_snapshot_store;
