//! L2CAP framing and CID routing. The header here is the logical
//! `{len, cid, payload}` pair that rides inside an ACL packet on LE/BR-EDR
//! transports or directly over a kernel `SOCK_SEQPACKET` bearer (see
//! `btdevice::sock::l2cap`, which speaks this format on the wire).

use crate::error::{Error, ErrorKind, Result};

pub const CID_SIGNALING_BREDR: u16 = 0x0001;
pub const CID_ATT: u16 = 0x0004;
pub const CID_SIGNALING_LE: u16 = 0x0005;
pub const CID_SMP_LE: u16 = 0x0006;
pub const CID_SMP_BREDR: u16 = 0x0007;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KnownCid {
    SignalingBrEdr,
    Att,
    SignalingLe,
    SmpLe,
    SmpBrEdr,
    Other(u16),
}

impl KnownCid {
    pub fn of(cid: u16) -> Self {
        match cid {
            CID_SIGNALING_BREDR => Self::SignalingBrEdr,
            CID_ATT => Self::Att,
            CID_SIGNALING_LE => Self::SignalingLe,
            CID_SMP_LE => Self::SmpLe,
            CID_SMP_BREDR => Self::SmpBrEdr,
            other => Self::Other(other),
        }
    }
}

/// `{len: u16, cid: u16, payload}` frame, without the ACL handle/flags
/// word -- that belongs to the HCI transport layer
/// ([`crate::hci::acl_to_l2cap`]), not to the logical frame itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct L2capFrame {
    pub cid: u16,
    pub payload: Vec<u8>,
}

impl L2capFrame {
    pub fn new(cid: u16, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > u16::MAX as usize {
            return Err(Error::new(ErrorKind::Overflow));
        }
        Ok(Self { cid, payload })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.cid.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::new(ErrorKind::Malformed));
        }
        let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let cid = u16::from_le_bytes([buf[2], buf[3]]);
        let payload = &buf[4..];
        if len != payload.len() {
            return Err(Error::with_message(
                ErrorKind::Malformed,
                "L2CAP declared length does not match payload",
            ));
        }
        Ok(Self {
            cid,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let frame = L2capFrame::new(CID_ATT, vec![0x01, 0x02, 0x03]).unwrap();
        let bytes = frame.encode();
        assert_eq!(L2capFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn known_cids_classify_the_three_bearers_this_core_cares_about() {
        assert_eq!(KnownCid::of(CID_ATT), KnownCid::Att);
        assert_eq!(KnownCid::of(CID_SMP_LE), KnownCid::SmpLe);
        assert_eq!(KnownCid::of(CID_SMP_BREDR), KnownCid::SmpBrEdr);
        assert_eq!(KnownCid::of(0x0099), KnownCid::Other(0x0099));
    }
}
