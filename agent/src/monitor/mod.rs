mod client;
mod subsystem;

pub use client::MonitorClient;
pub use subsystem::{NativeMonitor, MONITOR_OK};
