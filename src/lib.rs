// src/lib.rs
//
// Serial monitor core for devices that wrap text messages in START/END
// markers: port discovery, read-only sessions, marker framing and a poll
// driver that any front end can drive.

pub mod error;
pub mod io;
pub mod logging;
pub mod settings;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{ErrorKind, Result, SerialError};
pub use io::serial::{
    list_candidate_ports, spawn_reader, Discovery, MarkerFramer, Message, MessageConsumer,
    PollDriver, PortDescriptor, PortSession, SessionConfig, SessionState,
};
pub use io::{StopReason, StreamEvent};
pub use settings::{load_settings, MonitorSettings};
