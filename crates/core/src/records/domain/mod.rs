pub mod detection_record;
pub mod detection_repository;
