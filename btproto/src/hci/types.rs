//! HCI packet-type discriminators, LE Meta sub-event codes, and PB/BC flag
//! enumerations. Numeric values per the Bluetooth Core Spec Vol 4 Part E,
//! the same catalogue `nxzr_device::sock::hci` builds a raw socket filter
//! against.

use num_derive::{FromPrimitive, ToPrimitive};
use strum::Display;

pub const HCI_COMMAND_HDR_SIZE: usize = 4;
pub const HCI_ACLDATA_HDR_SIZE: usize = 5;
pub const HCI_SCODATA_HDR_SIZE: usize = 4;
pub const HCI_EVENT_HDR_SIZE: usize = 3;
pub const HCI_MAX_PAYLOAD: usize = 255;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum HciPacketType {
    Command = 0x01,
    AclData = 0x02,
    ScoData = 0x03,
    Event = 0x04,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum HciEventCode {
    DisconnectionComplete = 0x05,
    EncryptionChange = 0x08,
    CommandComplete = 0x0e,
    CommandStatus = 0x0f,
    NumberOfCompletedPackets = 0x13,
    LeMeta = 0x3e,
}

/// Sub-event code carried as the first LE-Meta parameter byte.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum HciLeMetaEventType {
    ConnectionComplete = 0x01,
    AdvertisingReport = 0x02,
    ConnectionUpdateComplete = 0x03,
    ReadRemoteUsedFeaturesComplete = 0x04,
    LongTermKeyRequest = 0x05,
    EnhancedConnectionComplete = 0x0a,
}

/// PB flag values carried in bits 12-13 of an ACL handle+flags word.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PbFlag {
    StartNonAutoFlush,
    Continuing,
    StartAutoFlush,
    CompleteL2capAutoFlush,
}

impl PbFlag {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::StartNonAutoFlush,
            0b01 => Self::Continuing,
            0b10 => Self::StartAutoFlush,
            _ => Self::CompleteL2capAutoFlush,
        }
    }

    pub fn to_bits(self) -> u8 {
        match self {
            Self::StartNonAutoFlush => 0b00,
            Self::Continuing => 0b01,
            Self::StartAutoFlush => 0b10,
            Self::CompleteL2capAutoFlush => 0b11,
        }
    }

    /// Whether a frame carried under this flag begins a new L2CAP PDU
    /// (as opposed to continuing a fragmented one).
    pub fn starts_frame(self) -> bool {
        !matches!(self, Self::Continuing)
    }
}
