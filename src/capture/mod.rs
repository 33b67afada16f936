// # Capture Module
//
// Frame producers feeding the upstream camera topic.

pub mod synthetic;

pub use synthetic::SyntheticCamera;
