pub mod client;
pub mod wire;

pub mod mock;

pub use client::HttpDetector;
pub use mock::MockDetector;
