pub mod detection_set;
pub mod object_detector;
