// Headless supervisor for an ODrive-class motor controller, bridged to
// presentation clients over zenoh.

pub mod config;
pub mod device;
pub mod history;
pub mod messages;
pub mod runtime;
pub mod supervisor;
