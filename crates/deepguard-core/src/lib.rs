pub mod detector;
pub mod errors;
pub mod events;
pub mod frame;
pub mod ids;
pub mod media;
pub mod result;
pub mod settings;
pub mod stats;
pub mod surface;
