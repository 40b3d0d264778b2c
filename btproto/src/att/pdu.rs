//! ATT PDU encode/decode. Every request/response named in `spec.md` §3 is
//! a variant here; signed writes carry an appended 12-byte signature as
//! opaque bytes (the CSRK signing algorithm itself lives in
//! `crate::smp::crypto`).

use super::opcode::AttOpcode;
use crate::error::{Error, ErrorKind, Result};
use num_traits::{FromPrimitive, ToPrimitive};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttPdu {
    ErrorRsp {
        request_opcode: u8,
        handle: u16,
        error_code: u8,
    },
    ExchangeMtuReq {
        client_rx_mtu: u16,
    },
    ExchangeMtuRsp {
        server_rx_mtu: u16,
    },
    FindInformationReq {
        start: u16,
        end: u16,
    },
    /// `uuid16` pairs if `is_16bit`, else 128-bit UUIDs via `uuid128`.
    FindInformationRsp {
        is_16bit: bool,
        uuid16: Vec<(u16, u16)>,
        uuid128: Vec<(u16, u128)>,
    },
    FindByTypeValueReq {
        start: u16,
        end: u16,
        attribute_type: u16,
        attribute_value: Vec<u8>,
    },
    FindByTypeValueRsp {
        handle_ranges: Vec<(u16, u16)>,
    },
    ReadByTypeReq {
        start: u16,
        end: u16,
        attribute_type: u16,
    },
    ReadByTypeRsp {
        entry_len: u8,
        data: Vec<u8>,
    },
    ReadReq {
        handle: u16,
    },
    ReadRsp {
        value: Vec<u8>,
    },
    ReadBlobReq {
        handle: u16,
        offset: u16,
    },
    ReadBlobRsp {
        value: Vec<u8>,
    },
    ReadByGroupTypeReq {
        start: u16,
        end: u16,
        group_type: u16,
    },
    ReadByGroupTypeRsp {
        entry_len: u8,
        data: Vec<u8>,
    },
    WriteReq {
        handle: u16,
        value: Vec<u8>,
    },
    WriteRsp,
    WriteCmd {
        handle: u16,
        value: Vec<u8>,
    },
    SignedWriteCmd {
        handle: u16,
        value: Vec<u8>,
        signature: [u8; 12],
    },
    HandleValueNtf {
        handle: u16,
        value: Vec<u8>,
    },
    HandleValueInd {
        handle: u16,
        value: Vec<u8>,
    },
    HandleValueCfm,
}

impl AttPdu {
    pub fn opcode(&self) -> AttOpcode {
        match self {
            Self::ErrorRsp { .. } => AttOpcode::ErrorRsp,
            Self::ExchangeMtuReq { .. } => AttOpcode::ExchangeMtuReq,
            Self::ExchangeMtuRsp { .. } => AttOpcode::ExchangeMtuRsp,
            Self::FindInformationReq { .. } => AttOpcode::FindInformationReq,
            Self::FindInformationRsp { .. } => AttOpcode::FindInformationRsp,
            Self::FindByTypeValueReq { .. } => AttOpcode::FindByTypeValueReq,
            Self::FindByTypeValueRsp { .. } => AttOpcode::FindByTypeValueRsp,
            Self::ReadByTypeReq { .. } => AttOpcode::ReadByTypeReq,
            Self::ReadByTypeRsp { .. } => AttOpcode::ReadByTypeRsp,
            Self::ReadReq { .. } => AttOpcode::ReadReq,
            Self::ReadRsp { .. } => AttOpcode::ReadRsp,
            Self::ReadBlobReq { .. } => AttOpcode::ReadBlobReq,
            Self::ReadBlobRsp { .. } => AttOpcode::ReadBlobRsp,
            Self::ReadByGroupTypeReq { .. } => AttOpcode::ReadByGroupTypeReq,
            Self::ReadByGroupTypeRsp { .. } => AttOpcode::ReadByGroupTypeRsp,
            Self::WriteReq { .. } => AttOpcode::WriteReq,
            Self::WriteRsp => AttOpcode::WriteRsp,
            Self::WriteCmd { .. } => AttOpcode::WriteCmd,
            Self::SignedWriteCmd { .. } => AttOpcode::SignedWriteCmd,
            Self::HandleValueNtf { .. } => AttOpcode::HandleValueNtf,
            Self::HandleValueInd { .. } => AttOpcode::HandleValueInd,
            Self::HandleValueCfm => AttOpcode::HandleValueCfm,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode().to_u8().unwrap()];
        match self {
            Self::ErrorRsp {
                request_opcode,
                handle,
                error_code,
            } => {
                out.push(*request_opcode);
                out.extend_from_slice(&handle.to_le_bytes());
                out.push(*error_code);
            }
            Self::ExchangeMtuReq { client_rx_mtu } => out.extend_from_slice(&client_rx_mtu.to_le_bytes()),
            Self::ExchangeMtuRsp { server_rx_mtu } => out.extend_from_slice(&server_rx_mtu.to_le_bytes()),
            Self::FindInformationReq { start, end } => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
            }
            Self::FindInformationRsp {
                is_16bit,
                uuid16,
                uuid128,
            } => {
                out.push(if *is_16bit { 0x01 } else { 0x02 });
                if *is_16bit {
                    for (handle, uuid) in uuid16 {
                        out.extend_from_slice(&handle.to_le_bytes());
                        out.extend_from_slice(&uuid.to_le_bytes());
                    }
                } else {
                    for (handle, uuid) in uuid128 {
                        out.extend_from_slice(&handle.to_le_bytes());
                        out.extend_from_slice(&uuid.to_le_bytes());
                    }
                }
            }
            Self::FindByTypeValueReq {
                start,
                end,
                attribute_type,
                attribute_value,
            } => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
                out.extend_from_slice(&attribute_type.to_le_bytes());
                out.extend_from_slice(attribute_value);
            }
            Self::FindByTypeValueRsp { handle_ranges } => {
                for (first, last) in handle_ranges {
                    out.extend_from_slice(&first.to_le_bytes());
                    out.extend_from_slice(&last.to_le_bytes());
                }
            }
            Self::ReadByTypeReq {
                start,
                end,
                attribute_type,
            } => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
                out.extend_from_slice(&attribute_type.to_le_bytes());
            }
            Self::ReadByTypeRsp { entry_len, data } => {
                out.push(*entry_len);
                out.extend_from_slice(data);
            }
            Self::ReadReq { handle } => out.extend_from_slice(&handle.to_le_bytes()),
            Self::ReadRsp { value } => out.extend_from_slice(value),
            Self::ReadBlobReq { handle, offset } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
            }
            Self::ReadBlobRsp { value } => out.extend_from_slice(value),
            Self::ReadByGroupTypeReq {
                start,
                end,
                group_type,
            } => {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
                out.extend_from_slice(&group_type.to_le_bytes());
            }
            Self::ReadByGroupTypeRsp { entry_len, data } => {
                out.push(*entry_len);
                out.extend_from_slice(data);
            }
            Self::WriteReq { handle, value } | Self::WriteCmd { handle, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
            }
            Self::WriteRsp => {}
            Self::SignedWriteCmd {
                handle,
                value,
                signature,
            } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
                out.extend_from_slice(signature);
            }
            Self::HandleValueNtf { handle, value } | Self::HandleValueInd { handle, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
            }
            Self::HandleValueCfm => {}
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let opcode_byte = *buf.first().ok_or_else(|| Error::new(ErrorKind::Malformed))?;
        let opcode = AttOpcode::from_u8(opcode_byte)
            .ok_or_else(|| Error::with_message(ErrorKind::Malformed, "unknown ATT opcode"))?;
        let p = &buf[1..];
        let need = |n: usize| -> Result<()> {
            if p.len() < n {
                Err(Error::new(ErrorKind::Malformed))
            } else {
                Ok(())
            }
        };
        let u16_at = |o: usize| u16::from_le_bytes([p[o], p[o + 1]]);
        Ok(match opcode {
            AttOpcode::ErrorRsp => {
                need(4)?;
                Self::ErrorRsp {
                    request_opcode: p[0],
                    handle: u16_at(1),
                    error_code: p[3],
                }
            }
            AttOpcode::ExchangeMtuReq => {
                need(2)?;
                Self::ExchangeMtuReq { client_rx_mtu: u16_at(0) }
            }
            AttOpcode::ExchangeMtuRsp => {
                need(2)?;
                Self::ExchangeMtuRsp { server_rx_mtu: u16_at(0) }
            }
            AttOpcode::FindInformationReq => {
                need(4)?;
                Self::FindInformationReq { start: u16_at(0), end: u16_at(2) }
            }
            AttOpcode::FindInformationRsp => {
                need(1)?;
                let format = p[0];
                let rest = &p[1..];
                match format {
                    0x01 => {
                        let mut uuid16 = Vec::new();
                        for chunk in rest.chunks_exact(4) {
                            uuid16.push((
                                u16::from_le_bytes([chunk[0], chunk[1]]),
                                u16::from_le_bytes([chunk[2], chunk[3]]),
                            ));
                        }
                        Self::FindInformationRsp { is_16bit: true, uuid16, uuid128: vec![] }
                    }
                    0x02 => {
                        let mut uuid128 = Vec::new();
                        for chunk in rest.chunks_exact(18) {
                            let handle = u16::from_le_bytes([chunk[0], chunk[1]]);
                            let uuid = u128::from_le_bytes(chunk[2..18].try_into().unwrap());
                            uuid128.push((handle, uuid));
                        }
                        Self::FindInformationRsp { is_16bit: false, uuid16: vec![], uuid128 }
                    }
                    _ => return Err(Error::new(ErrorKind::Malformed)),
                }
            }
            AttOpcode::FindByTypeValueReq => {
                need(6)?;
                Self::FindByTypeValueReq {
                    start: u16_at(0),
                    end: u16_at(2),
                    attribute_type: u16_at(4),
                    attribute_value: p[6..].to_vec(),
                }
            }
            AttOpcode::FindByTypeValueRsp => {
                let mut handle_ranges = Vec::new();
                for chunk in p.chunks_exact(4) {
                    handle_ranges.push((
                        u16::from_le_bytes([chunk[0], chunk[1]]),
                        u16::from_le_bytes([chunk[2], chunk[3]]),
                    ));
                }
                Self::FindByTypeValueRsp { handle_ranges }
            }
            AttOpcode::ReadByTypeReq => {
                need(6)?;
                Self::ReadByTypeReq { start: u16_at(0), end: u16_at(2), attribute_type: u16_at(4) }
            }
            AttOpcode::ReadByTypeRsp => {
                need(1)?;
                Self::ReadByTypeRsp { entry_len: p[0], data: p[1..].to_vec() }
            }
            AttOpcode::ReadReq => {
                need(2)?;
                Self::ReadReq { handle: u16_at(0) }
            }
            AttOpcode::ReadRsp => Self::ReadRsp { value: p.to_vec() },
            AttOpcode::ReadBlobReq => {
                need(4)?;
                Self::ReadBlobReq { handle: u16_at(0), offset: u16_at(2) }
            }
            AttOpcode::ReadBlobRsp => Self::ReadBlobRsp { value: p.to_vec() },
            AttOpcode::ReadByGroupTypeReq => {
                need(6)?;
                Self::ReadByGroupTypeReq { start: u16_at(0), end: u16_at(2), group_type: u16_at(4) }
            }
            AttOpcode::ReadByGroupTypeRsp => {
                need(1)?;
                Self::ReadByGroupTypeRsp { entry_len: p[0], data: p[1..].to_vec() }
            }
            AttOpcode::WriteReq => {
                need(2)?;
                Self::WriteReq { handle: u16_at(0), value: p[2..].to_vec() }
            }
            AttOpcode::WriteRsp => Self::WriteRsp,
            AttOpcode::WriteCmd => {
                need(2)?;
                Self::WriteCmd { handle: u16_at(0), value: p[2..].to_vec() }
            }
            AttOpcode::SignedWriteCmd => {
                need(14)?;
                let handle = u16_at(0);
                let body_end = p.len() - 12;
                let value = p[2..body_end].to_vec();
                let mut signature = [0u8; 12];
                signature.copy_from_slice(&p[body_end..]);
                Self::SignedWriteCmd { handle, value, signature }
            }
            AttOpcode::HandleValueNtf => {
                need(2)?;
                Self::HandleValueNtf { handle: u16_at(0), value: p[2..].to_vec() }
            }
            AttOpcode::HandleValueInd => {
                need(2)?;
                Self::HandleValueInd { handle: u16_at(0), value: p[2..].to_vec() }
            }
            AttOpcode::HandleValueCfm => Self::HandleValueCfm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_by_group_type_req_matches_expected_wire_bytes() {
        let pdu = AttPdu::ReadByGroupTypeReq { start: 0x0001, end: 0xffff, group_type: 0x1234 };
        assert_eq!(pdu.encode(), vec![0x10, 0x01, 0x00, 0xff, 0xff, 0x34, 0x12]);
    }

    #[test]
    fn write_req_round_trips() {
        let pdu = AttPdu::WriteReq { handle: 0x002a, value: vec![0xde, 0xad] };
        let encoded = pdu.encode();
        assert_eq!(AttPdu::decode(&encoded).unwrap(), pdu);
    }

    #[test]
    fn handle_value_ntf_round_trips() {
        let pdu = AttPdu::HandleValueNtf { handle: 0x10, value: vec![1, 2, 3] };
        assert_eq!(AttPdu::decode(&pdu.encode()).unwrap(), pdu);
    }
}
