//! OpenFlow error messages and datapath error handling.
//!
//! Switches report failures asynchronously as `OFPT_ERROR` messages. The
//! controller only logs them, so decoding stops at the type name plus the
//! raw code and payload.

use std::fmt;
use thiserror::Error;

/// `ofp_error_type` values from the OpenFlow 1.3 specification.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfpErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    BadAction = 2,
    BadInstruction = 3,
    BadMatch = 4,
    FlowModFailed = 5,
    GroupModFailed = 6,
    PortModFailed = 7,
    TableModFailed = 8,
    QueueOpFailed = 9,
    SwitchConfigFailed = 10,
    RoleRequestFailed = 11,
    MeterModFailed = 12,
    TableFeaturesFailed = 13,
    Experimenter = 0xffff,
    Unknown = 0xfffe,
}

impl OfpErrorType {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => OfpErrorType::HelloFailed,
            1 => OfpErrorType::BadRequest,
            2 => OfpErrorType::BadAction,
            3 => OfpErrorType::BadInstruction,
            4 => OfpErrorType::BadMatch,
            5 => OfpErrorType::FlowModFailed,
            6 => OfpErrorType::GroupModFailed,
            7 => OfpErrorType::PortModFailed,
            8 => OfpErrorType::TableModFailed,
            9 => OfpErrorType::QueueOpFailed,
            10 => OfpErrorType::SwitchConfigFailed,
            11 => OfpErrorType::RoleRequestFailed,
            12 => OfpErrorType::MeterModFailed,
            13 => OfpErrorType::TableFeaturesFailed,
            0xffff => OfpErrorType::Experimenter,
            _ => OfpErrorType::Unknown,
        }
    }
}

impl fmt::Display for OfpErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OfpErrorType::HelloFailed => "OFPET_HELLO_FAILED",
            OfpErrorType::BadRequest => "OFPET_BAD_REQUEST",
            OfpErrorType::BadAction => "OFPET_BAD_ACTION",
            OfpErrorType::BadInstruction => "OFPET_BAD_INSTRUCTION",
            OfpErrorType::BadMatch => "OFPET_BAD_MATCH",
            OfpErrorType::FlowModFailed => "OFPET_FLOW_MOD_FAILED",
            OfpErrorType::GroupModFailed => "OFPET_GROUP_MOD_FAILED",
            OfpErrorType::PortModFailed => "OFPET_PORT_MOD_FAILED",
            OfpErrorType::TableModFailed => "OFPET_TABLE_MOD_FAILED",
            OfpErrorType::QueueOpFailed => "OFPET_QUEUE_OP_FAILED",
            OfpErrorType::SwitchConfigFailed => "OFPET_SWITCH_CONFIG_FAILED",
            OfpErrorType::RoleRequestFailed => "OFPET_ROLE_REQUEST_FAILED",
            OfpErrorType::MeterModFailed => "OFPET_METER_MOD_FAILED",
            OfpErrorType::TableFeaturesFailed => "OFPET_TABLE_FEATURES_FAILED",
            OfpErrorType::Experimenter => "OFPET_EXPERIMENTER",
            OfpErrorType::Unknown => "OFPET_UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// A decoded `OFPT_ERROR` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    /// Raw `type` field.
    pub err_type: u16,
    pub code: u16,
    /// Leading bytes of the offending request.
    pub data: Vec<u8>,
}

impl ErrorMsg {
    pub fn new(err_type: u16, code: u16, data: Vec<u8>) -> Self {
        Self {
            err_type,
            code,
            data,
        }
    }

    pub fn kind(&self) -> OfpErrorType {
        OfpErrorType::from_raw(self.err_type)
    }

    /// Payload as a lowercase hex string.
    pub fn data_hex(&self) -> String {
        self.data.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type=0x{:02x} ({}) code=0x{:02x} data={}",
            self.err_type,
            self.kind(),
            self.code,
            self.data_hex()
        )
    }
}

/// Errors raised when handing messages to a datapath.
#[derive(Debug, Clone, Error)]
pub enum OfpError {
    #[error("Datapath {dpid} is disconnected")]
    Disconnected { dpid: String },

    #[error("Failed to send {message} to datapath {dpid}: {reason}")]
    SendFailed {
        dpid: String,
        message: &'static str,
        reason: String,
    },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl OfpError {
    pub fn disconnected(dpid: impl fmt::Display) -> Self {
        OfpError::Disconnected {
            dpid: dpid.to_string(),
        }
    }

    pub fn send_failed(
        dpid: impl fmt::Display,
        message: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        OfpError::SendFailed {
            dpid: dpid.to_string(),
            message,
            reason: reason.into(),
        }
    }
}

pub type OfpResult<T> = Result<T, OfpError>;
