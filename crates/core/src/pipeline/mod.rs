pub mod detection_recorder;
pub mod inspect_image_use_case;
pub mod live_session;
