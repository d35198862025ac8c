pub mod address_file;
pub mod graceful_shutdown;
pub mod port_scan;

pub use graceful_shutdown::GracefulShutdown;
