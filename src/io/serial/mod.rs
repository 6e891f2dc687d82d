// src/io/serial/mod.rs
//
// Serial port driver with START/END marker framing.
//
// Features:
// - Port discovery with per-platform name filters
// - Read-only sessions with fixed 115200 8N1 raw, non-blocking line settings
// - Marker-delimited message extraction
// - Poll driver with callback, iterator and channel delivery

pub mod discovery;
pub mod framer;
pub mod reader;
pub mod session;
pub(crate) mod utils;

pub use discovery::{
    host_enumerator, host_filter, list_candidate_ports, AcceptAllFilter, CalloutFilter,
    DeviceDirectory, Discovery, PortDescriptor, PortEnumerator, PortFilter, SystemPorts,
    UsbSerialFilter,
};
pub use framer::{MarkerFramer, Message, END_MARKER, START_MARKER};
pub use reader::{
    open_and_report, spawn_reader, ChannelConsumer, MessageConsumer, PollDriver,
    DEFAULT_READ_SIZE,
};
pub use session::{DeviceOpener, LineDevice, PortSession, SessionState, SystemOpener};
pub use utils::{FlowControl, Parity, SessionConfig};
