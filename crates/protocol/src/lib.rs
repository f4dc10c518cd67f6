pub mod constants;
pub mod envelope;
pub mod events;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::EventName;
pub use envelope::Frame;
pub use events::{
    CpuStats, DiskStats, FileUpdate, MemoryStats, NetworkStats, Notification, NotificationLevel,
    RoomRequest, ServerStats, SystemStats, TerminalCommand, TerminalOutput,
};
pub use messages::{Inbound, Outbound, ProtocolError};
