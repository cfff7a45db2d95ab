pub mod camera_id;
pub mod capture_device;
pub mod fps_meter;
