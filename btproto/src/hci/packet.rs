//! HCI command encode, event/ACL decode, and ACL-to-L2CAP frame
//! extraction.

use super::types::{HciEventCode, HciLeMetaEventType, PbFlag};
use crate::error::{Error, ErrorKind, Result};
use num_traits::FromPrimitive;

/// An outbound command: `{type=0x01, opcode_le, param_size, params}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HciCommand {
    pub opcode: u16,
    pub params: Vec<u8>,
}

impl HciCommand {
    pub fn new(opcode: u16, params: Vec<u8>) -> Result<Self> {
        if params.len() > 255 {
            return Err(Error::with_message(
                ErrorKind::Malformed,
                "command parameter block exceeds 255 octets",
            ));
        }
        Ok(Self { opcode, params })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.params.len());
        out.push(0x01);
        out.extend_from_slice(&self.opcode.to_le_bytes());
        out.push(self.params.len() as u8);
        out.extend_from_slice(&self.params);
        out
    }
}

/// A decoded event: `{type=0x04, event_code, param_size, params}`, with
/// LE-Meta events additionally exposing their sub-event code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HciEvent {
    pub event_code: u8,
    pub params: Vec<u8>,
}

impl HciEvent {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 3 || buf[0] != 0x04 {
            return Err(Error::new(ErrorKind::Malformed));
        }
        let event_code = buf[1];
        let declared_len = buf[2] as usize;
        let params = &buf[3..];
        if declared_len != params.len() {
            return Err(Error::with_message(
                ErrorKind::Malformed,
                format!(
                    "event declared length {declared_len} does not match actual {}",
                    params.len()
                ),
            ));
        }
        Ok(Self {
            event_code,
            params: params.to_vec(),
        })
    }

    pub fn is_le_meta(&self) -> bool {
        self.event_code == HciEventCode::LeMeta as u8
    }

    /// `None` if this is not an LE-Meta event or the sub-event code is
    /// unrecognized.
    pub fn le_meta_subevent(&self) -> Option<HciLeMetaEventType> {
        if !self.is_le_meta() {
            return None;
        }
        self.params
            .first()
            .and_then(|&b| HciLeMetaEventType::from_u8(b))
    }

    /// Matches spec.md §4.8's command correlation: does this event
    /// resolve a pending command with the given opcode?
    pub fn resolves_opcode(&self, opcode: u16) -> Option<u16> {
        match HciEventCode::from_u8(self.event_code)? {
            HciEventCode::CommandComplete if self.params.len() >= 3 => {
                let op = u16::from_le_bytes([self.params[1], self.params[2]]);
                (op == opcode).then_some(op)
            }
            HciEventCode::CommandStatus if self.params.len() >= 3 => {
                let op = u16::from_le_bytes([self.params[1], self.params[2]]);
                (op == opcode).then_some(op)
            }
            _ => None,
        }
    }
}

/// A complete L2CAP frame recovered from one or more ACL fragments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct L2capFrameHeader {
    pub len: u16,
    pub cid: u16,
}

/// Extracts the embedded `{len, cid, payload}` header from a single ACL
/// packet. Only packets whose PB flag starts a new frame are accepted;
/// `Continuing` fragments are rejected with `NotSupported` per spec.md
/// §4.4's documented limitation (reassembly is left to the transport).
pub fn acl_to_l2cap(buf: &[u8]) -> Result<(L2capFrameHeader, &[u8])> {
    if buf.len() < 5 || buf[0] != 0x02 {
        return Err(Error::new(ErrorKind::Malformed));
    }
    let handle_flags = u16::from_le_bytes([buf[1], buf[2]]);
    let pb_flag = PbFlag::from_bits((handle_flags >> 12) as u8);
    if !pb_flag.starts_frame() {
        return Err(Error::with_message(
            ErrorKind::NotSupported,
            "ACL continuation fragments are not reassembled by this core",
        ));
    }
    let acl_len = u16::from_le_bytes([buf[3], buf[4]]) as usize;
    let l2cap_part = &buf[5..];
    if acl_len != l2cap_part.len() {
        return Err(Error::with_message(
            ErrorKind::Malformed,
            "ACL declared length does not match payload",
        ));
    }
    if l2cap_part.len() < 4 {
        return Err(Error::new(ErrorKind::Malformed));
    }
    let len = u16::from_le_bytes([l2cap_part[0], l2cap_part[1]]);
    let cid = u16::from_le_bytes([l2cap_part[2], l2cap_part[3]]);
    let payload = &l2cap_part[4..];
    if (len as usize) > payload.len() {
        return Err(Error::with_message(
            ErrorKind::Malformed,
            "L2CAP declared length exceeds payload",
        ));
    }
    Ok((L2capFrameHeader { len, cid }, &payload[..len as usize]))
}

/// `(1 + conn_latency) * conn_interval_max_ms * max(2, multiplier)`,
/// clamped below at 500ms, returned in units of 10ms.
pub fn le_supervisor_timeout_10ms(conn_latency: u16, conn_interval_max_ms: u32, multiplier: u32) -> u32 {
    let ms = (1 + conn_latency as u32) * conn_interval_max_ms * multiplier.max(2);
    ms.max(500) / 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_param_size_boundaries() {
        assert!(HciCommand::new(0x0c03, vec![0u8; 0]).is_ok());
        assert!(HciCommand::new(0x0c03, vec![0u8; 255]).is_ok());
        assert!(HciCommand::new(0x0c03, vec![0u8; 256]).is_err());
    }

    #[test]
    fn event_round_trip_checks_declared_length() {
        let bytes = vec![0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00];
        let evt = HciEvent::decode(&bytes).unwrap();
        assert_eq!(evt.event_code, 0x0e);
        assert_eq!(evt.params.len(), 4);

        let bad = vec![0x04, 0x0e, 0x05, 0x01, 0x03, 0x0c, 0x00];
        assert_eq!(HciEvent::decode(&bad).unwrap_err().kind, ErrorKind::Malformed);
    }

    #[test]
    fn supervisor_timeout_never_below_50_in_10ms_units() {
        assert!(le_supervisor_timeout_10ms(0, 1, 2) >= 50);
        assert!(le_supervisor_timeout_10ms(500, 4000, 6) >= 50);
    }

    #[test]
    fn acl_continuation_fragment_is_rejected() {
        let mut buf = vec![0x02u8, 0, 0, 0, 0];
        buf[2] = (0b01 << 4) as u8; // Continuing in PB-flag bits
        assert_eq!(
            acl_to_l2cap(&buf).unwrap_err().kind,
            ErrorKind::NotSupported
        );
    }
}
