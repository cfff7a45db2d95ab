pub mod in_memory_detection_repository;
pub mod json_lines_detection_repository;
