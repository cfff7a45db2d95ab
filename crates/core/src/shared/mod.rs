pub mod constants;
pub mod detection;
pub mod frame;
pub mod settings;
pub mod species;
