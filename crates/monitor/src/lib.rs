//! Monitoring view state: bounded chart histories per server.

pub mod buffer;
pub mod state;

pub use buffer::RingBuffer;
pub use state::{FleetMonitor, LOCAL_SERVER, Metric, ServerHistory, StatsPoint};
