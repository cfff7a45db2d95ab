pub mod snapshot_store;
pub mod verification_result;
