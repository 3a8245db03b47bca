//! Real service implementations backed by the OS and the network

pub mod launcher;
pub mod probe;
pub mod toolchain;

pub use launcher::BinaryLauncher;
pub use probe::HttpHealthProbe;
pub use toolchain::CommandToolchain;
