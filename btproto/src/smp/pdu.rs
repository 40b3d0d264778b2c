//! SMP PDU encode/decode, opcodes 0x01..0x0E per `spec.md` §3. Key bags
//! (LTK/IRK/CSRK/DHKey) are carried as opaque little-endian byte arrays;
//! no endian conversion happens on the wire beyond what the Core Spec
//! already fixes as little-endian.

use super::opcode::SmpOpcode;
use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;
use num_traits::{FromPrimitive, ToPrimitive};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum IoCapability {
    DisplayOnly = 0x00,
    DisplayYesNo = 0x01,
    KeyboardOnly = 0x02,
    NoInputNoOutput = 0x03,
    KeyboardDisplay = 0x04,
}

impl IoCapability {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x00 => Self::DisplayOnly,
            0x01 => Self::DisplayYesNo,
            0x02 => Self::KeyboardOnly,
            0x03 => Self::NoInputNoOutput,
            0x04 => Self::KeyboardDisplay,
            _ => return Err(Error::with_message(ErrorKind::Malformed, "unknown IO capability")),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OobDataFlag {
    NotPresent = 0x00,
    Present = 0x01,
}

impl OobDataFlag {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x00 => Self::NotPresent,
            0x01 => Self::Present,
            _ => return Err(Error::with_message(ErrorKind::Malformed, "unknown OOB data flag")),
        })
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct AuthReq: u8 {
        const BONDING       = 0b0000_0001;
        const MITM          = 0b0000_0100;
        const SC            = 0b0000_1000;
        const KEYPRESS      = 0b0001_0000;
        const CT2           = 0b0010_0000;
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct KeyDistribution: u8 {
        const ENC_KEY  = 0b0000_0001;
        const ID_KEY   = 0b0000_0010;
        const SIGN_KEY = 0b0000_0100;
        const LINK_KEY = 0b0000_1000;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PairingFailedReason {
    PasskeyEntryFailed = 0x01,
    OobNotAvailable = 0x02,
    AuthenticationRequirements = 0x03,
    ConfirmValueFailed = 0x04,
    PairingNotSupported = 0x05,
    EncryptionKeySize = 0x06,
    CommandNotSupported = 0x07,
    UnspecifiedReason = 0x08,
    RepeatedAttempts = 0x09,
    InvalidParameters = 0x0a,
    DhKeyCheckFailed = 0x0b,
    NumericComparisonFailed = 0x0c,
    BrEdrPairingInProgress = 0x0d,
    CrossTransportKeyDerivationNotAllowed = 0x0e,
}

impl PairingFailedReason {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x01 => Self::PasskeyEntryFailed,
            0x02 => Self::OobNotAvailable,
            0x03 => Self::AuthenticationRequirements,
            0x04 => Self::ConfirmValueFailed,
            0x05 => Self::PairingNotSupported,
            0x06 => Self::EncryptionKeySize,
            0x07 => Self::CommandNotSupported,
            0x08 => Self::UnspecifiedReason,
            0x09 => Self::RepeatedAttempts,
            0x0a => Self::InvalidParameters,
            0x0b => Self::DhKeyCheckFailed,
            0x0c => Self::NumericComparisonFailed,
            0x0d => Self::BrEdrPairingInProgress,
            0x0e => Self::CrossTransportKeyDerivationNotAllowed,
            _ => return Err(Error::with_message(ErrorKind::Malformed, "unknown pairing failed reason")),
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SmpPdu {
    PairingRequest {
        io_capability: u8,
        oob_data_flag: u8,
        auth_req: u8,
        max_encryption_key_size: u8,
        initiator_key_distribution: u8,
        responder_key_distribution: u8,
    },
    PairingResponse {
        io_capability: u8,
        oob_data_flag: u8,
        auth_req: u8,
        max_encryption_key_size: u8,
        initiator_key_distribution: u8,
        responder_key_distribution: u8,
    },
    PairingConfirm {
        confirm_value: u128,
    },
    PairingRandom {
        random_value: u128,
    },
    PairingFailed {
        reason: u8,
    },
    EncryptionInformation {
        ltk: u128,
    },
    MasterIdentification {
        ediv: u16,
        rand: u64,
    },
    IdentityInformation {
        irk: u128,
    },
    IdentityAddressInformation {
        address_type: u8,
        address: [u8; 6],
    },
    SigningInformation {
        csrk: u128,
    },
    SecurityRequest {
        auth_req: u8,
    },
    PairingPublicKey {
        x: [u8; 32],
        y: [u8; 32],
    },
    PairingDhkeyCheck {
        dhkey_check: u128,
    },
    PairingKeypressNotification {
        notification_type: u8,
    },
}

impl SmpPdu {
    pub fn opcode(&self) -> SmpOpcode {
        match self {
            Self::PairingRequest { .. } => SmpOpcode::PairingRequest,
            Self::PairingResponse { .. } => SmpOpcode::PairingResponse,
            Self::PairingConfirm { .. } => SmpOpcode::PairingConfirm,
            Self::PairingRandom { .. } => SmpOpcode::PairingRandom,
            Self::PairingFailed { .. } => SmpOpcode::PairingFailed,
            Self::EncryptionInformation { .. } => SmpOpcode::EncryptionInformation,
            Self::MasterIdentification { .. } => SmpOpcode::MasterIdentification,
            Self::IdentityInformation { .. } => SmpOpcode::IdentityInformation,
            Self::IdentityAddressInformation { .. } => SmpOpcode::IdentityAddressInformation,
            Self::SigningInformation { .. } => SmpOpcode::SigningInformation,
            Self::SecurityRequest { .. } => SmpOpcode::SecurityRequest,
            Self::PairingPublicKey { .. } => SmpOpcode::PairingPublicKey,
            Self::PairingDhkeyCheck { .. } => SmpOpcode::PairingDhkeyCheck,
            Self::PairingKeypressNotification { .. } => SmpOpcode::PairingKeypressNotification,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode().to_u8().unwrap()];
        match self {
            Self::PairingRequest {
                io_capability,
                oob_data_flag,
                auth_req,
                max_encryption_key_size,
                initiator_key_distribution,
                responder_key_distribution,
            }
            | Self::PairingResponse {
                io_capability,
                oob_data_flag,
                auth_req,
                max_encryption_key_size,
                initiator_key_distribution,
                responder_key_distribution,
            } => {
                out.push(*io_capability);
                out.push(*oob_data_flag);
                out.push(*auth_req);
                out.push(*max_encryption_key_size);
                out.push(*initiator_key_distribution);
                out.push(*responder_key_distribution);
            }
            Self::PairingConfirm { confirm_value } => out.extend_from_slice(&confirm_value.to_le_bytes()),
            Self::PairingRandom { random_value } => out.extend_from_slice(&random_value.to_le_bytes()),
            Self::PairingFailed { reason } => out.push(*reason),
            Self::EncryptionInformation { ltk } => out.extend_from_slice(&ltk.to_le_bytes()),
            Self::MasterIdentification { ediv, rand } => {
                out.extend_from_slice(&ediv.to_le_bytes());
                out.extend_from_slice(&rand.to_le_bytes());
            }
            Self::IdentityInformation { irk } => out.extend_from_slice(&irk.to_le_bytes()),
            Self::IdentityAddressInformation { address_type, address } => {
                out.push(*address_type);
                out.extend_from_slice(address);
            }
            Self::SigningInformation { csrk } => out.extend_from_slice(&csrk.to_le_bytes()),
            Self::SecurityRequest { auth_req } => out.push(*auth_req),
            Self::PairingPublicKey { x, y } => {
                out.extend_from_slice(x);
                out.extend_from_slice(y);
            }
            Self::PairingDhkeyCheck { dhkey_check } => out.extend_from_slice(&dhkey_check.to_le_bytes()),
            Self::PairingKeypressNotification { notification_type } => out.push(*notification_type),
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let opcode_byte = *buf.first().ok_or_else(|| Error::new(ErrorKind::Malformed))?;
        let opcode = SmpOpcode::from_u8(opcode_byte)
            .ok_or_else(|| Error::with_message(ErrorKind::Malformed, "unknown SMP opcode"))?;
        let p = &buf[1..];
        let need = |n: usize| -> Result<()> {
            if p.len() != n {
                Err(Error::new(ErrorKind::Malformed))
            } else {
                Ok(())
            }
        };
        Ok(match opcode {
            SmpOpcode::PairingRequest | SmpOpcode::PairingResponse => {
                need(6)?;
                let fields = (
                    p[0],
                    p[1],
                    p[2],
                    p[3],
                    p[4],
                    p[5],
                );
                if matches!(opcode, SmpOpcode::PairingRequest) {
                    Self::PairingRequest {
                        io_capability: fields.0,
                        oob_data_flag: fields.1,
                        auth_req: fields.2,
                        max_encryption_key_size: fields.3,
                        initiator_key_distribution: fields.4,
                        responder_key_distribution: fields.5,
                    }
                } else {
                    Self::PairingResponse {
                        io_capability: fields.0,
                        oob_data_flag: fields.1,
                        auth_req: fields.2,
                        max_encryption_key_size: fields.3,
                        initiator_key_distribution: fields.4,
                        responder_key_distribution: fields.5,
                    }
                }
            }
            SmpOpcode::PairingConfirm => {
                need(16)?;
                Self::PairingConfirm { confirm_value: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::PairingRandom => {
                need(16)?;
                Self::PairingRandom { random_value: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::PairingFailed => {
                need(1)?;
                Self::PairingFailed { reason: p[0] }
            }
            SmpOpcode::EncryptionInformation => {
                need(16)?;
                Self::EncryptionInformation { ltk: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::MasterIdentification => {
                need(10)?;
                Self::MasterIdentification {
                    ediv: u16::from_le_bytes([p[0], p[1]]),
                    rand: u64::from_le_bytes(p[2..10].try_into().unwrap()),
                }
            }
            SmpOpcode::IdentityInformation => {
                need(16)?;
                Self::IdentityInformation { irk: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::IdentityAddressInformation => {
                need(7)?;
                let mut address = [0u8; 6];
                address.copy_from_slice(&p[1..7]);
                Self::IdentityAddressInformation { address_type: p[0], address }
            }
            SmpOpcode::SigningInformation => {
                need(16)?;
                Self::SigningInformation { csrk: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::SecurityRequest => {
                need(1)?;
                Self::SecurityRequest { auth_req: p[0] }
            }
            SmpOpcode::PairingPublicKey => {
                need(64)?;
                let mut x = [0u8; 32];
                let mut y = [0u8; 32];
                x.copy_from_slice(&p[0..32]);
                y.copy_from_slice(&p[32..64]);
                Self::PairingPublicKey { x, y }
            }
            SmpOpcode::PairingDhkeyCheck => {
                need(16)?;
                Self::PairingDhkeyCheck { dhkey_check: u128::from_le_bytes(p.try_into().unwrap()) }
            }
            SmpOpcode::PairingKeypressNotification => {
                need(1)?;
                Self::PairingKeypressNotification { notification_type: p[0] }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_request_round_trips() {
        let pdu = SmpPdu::PairingRequest {
            io_capability: IoCapability::KeyboardDisplay as u8,
            oob_data_flag: OobDataFlag::NotPresent as u8,
            auth_req: (AuthReq::BONDING | AuthReq::MITM | AuthReq::SC).bits(),
            max_encryption_key_size: 16,
            initiator_key_distribution: KeyDistribution::ENC_KEY.bits(),
            responder_key_distribution: (KeyDistribution::ENC_KEY | KeyDistribution::ID_KEY).bits(),
        };
        assert_eq!(SmpPdu::decode(&pdu.encode()).unwrap(), pdu);
    }

    #[test]
    fn pairing_failed_round_trips() {
        let pdu = SmpPdu::PairingFailed { reason: PairingFailedReason::DhKeyCheckFailed as u8 };
        assert_eq!(SmpPdu::decode(&pdu.encode()).unwrap(), pdu);
        assert_eq!(pdu.encode(), vec![0x05, 0x0b]);
    }

    #[test]
    fn public_key_round_trips() {
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        for i in 0..32 {
            x[i] = i as u8;
            y[i] = (31 - i) as u8;
        }
        let pdu = SmpPdu::PairingPublicKey { x, y };
        assert_eq!(SmpPdu::decode(&pdu.encode()).unwrap(), pdu);
    }
}
