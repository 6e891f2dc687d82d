// src/io/serial/utils.rs
//
// Fixed line settings for monitor sessions and their conversion to the
// serialport crate's types.

use serde::Serialize;
use serialport::{DataBits, FlowControl as SpFlowControl, Parity as SpParity, StopBits};
use std::time::Duration;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control setting for serial port configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Line discipline applied to every session.
///
/// The values are fixed: 115200 baud, 8N1, no flow control, raw input and
/// output, and reads that return immediately (VMIN = 0, VTIME = 0).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    baud_rate: u32,
    data_bits: u8,
    parity: Parity,
    stop_bits: u8,
    flow_control: FlowControl,
    raw: bool,
    min_bytes: u8,
    timeout_deciseconds: u8,
}

impl SessionConfig {
    pub const FIXED: SessionConfig = SessionConfig {
        baud_rate: 115_200,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
        flow_control: FlowControl::None,
        raw: true,
        min_bytes: 0,
        timeout_deciseconds: 0,
    };

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn stop_bits(&self) -> u8 {
        self.stop_bits
    }

    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    /// Non-canonical input and unprocessed output.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Minimum bytes a read waits for (termios VMIN).
    pub fn min_bytes(&self) -> u8 {
        self.min_bytes
    }

    /// Inter-byte read timeout in tenths of a second (termios VTIME).
    pub fn timeout_deciseconds(&self) -> u8 {
        self.timeout_deciseconds
    }

    /// Read timeout expressed for the serialport crate. Zero means a read
    /// returns whatever is buffered without waiting.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_deciseconds) * 100)
    }

    /// Short form used in log lines, e.g. `115200 8N1`.
    pub fn describe(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            match self.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            self.stop_bits
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::FIXED
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Convert our FlowControl enum to serialport crate's FlowControl type
pub fn to_serialport_flow_control(f: FlowControl) -> SpFlowControl {
    match f {
        FlowControl::None => SpFlowControl::None,
        FlowControl::Software => SpFlowControl::Software,
        FlowControl::Hardware => SpFlowControl::Hardware,
    }
}

// ============================================================================
// Tests
// ============================================================================
