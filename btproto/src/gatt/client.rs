//! Client-side GATT engine: a synchronous driver that turns inbound ATT
//! PDUs into the next outbound request, so the caller (an async reader
//! task in `btdevice`) owns the bearer and the timeouts while this crate
//! owns the sequencing rules in spec.md §4.7 ("a second request may not be
//! issued until the previous response ... has been received").

use crate::att::opcode::{CCCD_UUID16, CHARACTERISTIC_UUID16, PRIMARY_SERVICE_UUID16};
use crate::att::pdu::AttPdu;
use crate::error::{Error, ErrorKind, Result};
use btshared::Uuid;



#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredService {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid128Bytes,
}

/// UUID payload carried by a GATT declaration, kept as raw bytes because
/// it may be 16 or 128 bits wide and callers compare via
/// [`btshared::Uuid`]'s 128-bit expansion.
pub type Uuid128Bytes = Vec<u8>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredCharacteristic {
    pub declaration_handle: u16,
    pub value_handle: u16,
    pub properties: u8,
    pub uuid: Uuid128Bytes,
}

#[derive(Clone, Debug)]
enum DiscoveryPhase {
    Services { cursor: u16 },
    Characteristics { service_index: usize, cursor: u16 },
    Done,
}

/// Drives `READ_BY_GROUP_TYPE` over 0x2800 for services, then
/// `READ_BY_TYPE` over 0x2803 per service for characteristics.
/// `FIND_INFORMATION` descriptor discovery is left to the caller once
/// characteristics are known, since descriptor ranges depend on the next
/// characteristic's declaration handle (or the service's end handle).
pub struct ServiceDiscovery {
    phase: DiscoveryPhase,
    services: Vec<DiscoveredService>,
    characteristics: Vec<DiscoveredCharacteristic>,
}

impl ServiceDiscovery {
    pub fn new() -> Self {
        Self {
            phase: DiscoveryPhase::Services { cursor: 0x0001 },
            services: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    pub fn start(&self) -> AttPdu {
        AttPdu::ReadByGroupTypeReq {
            start: 0x0001,
            end: 0xffff,
            group_type: PRIMARY_SERVICE_UUID16,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, DiscoveryPhase::Done)
    }

    pub fn services(&self) -> &[DiscoveredService] {
        &self.services
    }

    pub fn characteristics(&self) -> &[DiscoveredCharacteristic] {
        &self.characteristics
    }

    /// Feeds one inbound response, returning the next request to send or
    /// `None` once discovery has finished.
    pub fn on_response(&mut self, pdu: &AttPdu) -> Result<Option<AttPdu>> {
        match self.phase.clone() {
            DiscoveryPhase::Services { cursor } => self.advance_services(cursor, pdu),
            DiscoveryPhase::Characteristics { service_index, cursor } => {
                self.advance_characteristics(service_index, cursor, pdu)
            }
            DiscoveryPhase::Done => Ok(None),
        }
    }

    fn advance_services(&mut self, cursor: u16, pdu: &AttPdu) -> Result<Option<AttPdu>> {
        match pdu {
            AttPdu::ErrorRsp { error_code, .. } if *error_code == 0x0a /* AttributeNotFound */ => {
                self.begin_characteristics()
            }
            AttPdu::ReadByGroupTypeRsp { entry_len, data } => {
                let uuid_len = *entry_len as usize - 4;
                let mut last_end = cursor;
                let mut overlapped = false;
                for chunk in data.chunks_exact(*entry_len as usize) {
                    let start = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let end = u16::from_le_bytes([chunk[2], chunk[3]]);
                    if start < last_end && last_end != cursor {
                        overlapped = true;
                    }
                    self.services.push(DiscoveredService {
                        start_handle: start,
                        end_handle: end,
                        uuid: chunk[4..4 + uuid_len].to_vec(),
                    });
                    last_end = end;
                }
                if overlapped {
                    return Err(Error::new(ErrorKind::ProtocolError));
                }
                if last_end == 0xffff {
                    self.begin_characteristics()
                } else {
                    let next = last_end + 1;
                    self.phase = DiscoveryPhase::Services { cursor: next };
                    Ok(Some(AttPdu::ReadByGroupTypeReq {
                        start: next,
                        end: 0xffff,
                        group_type: PRIMARY_SERVICE_UUID16,
                    }))
                }
            }
            _ => Err(Error::new(ErrorKind::ProtocolError)),
        }
    }

    fn begin_characteristics(&mut self) -> Result<Option<AttPdu>> {
        if self.services.is_empty() {
            self.phase = DiscoveryPhase::Done;
            return Ok(None);
        }
        let svc = &self.services[0];
        self.phase = DiscoveryPhase::Characteristics {
            service_index: 0,
            cursor: svc.start_handle,
        };
        Ok(Some(AttPdu::ReadByTypeReq {
            start: svc.start_handle,
            end: svc.end_handle,
            attribute_type: CHARACTERISTIC_UUID16,
        }))
    }

    fn advance_characteristics(
        &mut self,
        service_index: usize,
        _cursor: u16,
        pdu: &AttPdu,
    ) -> Result<Option<AttPdu>> {
        let svc = self.services[service_index].clone();
        match pdu {
            AttPdu::ErrorRsp { error_code, .. } if *error_code == 0x0a => {
                self.next_service_or_done(service_index)
            }
            AttPdu::ReadByTypeRsp { entry_len, data } => {
                let uuid_len = *entry_len as usize - 5;
                let mut last_handle = svc.start_handle;
                for chunk in data.chunks_exact(*entry_len as usize) {
                    let decl_handle = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let properties = chunk[2];
                    let value_handle = u16::from_le_bytes([chunk[3], chunk[4]]);
                    self.characteristics.push(DiscoveredCharacteristic {
                        declaration_handle: decl_handle,
                        value_handle,
                        properties,
                        uuid: chunk[5..5 + uuid_len].to_vec(),
                    });
                    last_handle = decl_handle;
                }
                if last_handle >= svc.end_handle {
                    self.next_service_or_done(service_index)
                } else {
                    let next = last_handle + 1;
                    self.phase = DiscoveryPhase::Characteristics { service_index, cursor: next };
                    Ok(Some(AttPdu::ReadByTypeReq {
                        start: next,
                        end: svc.end_handle,
                        attribute_type: CHARACTERISTIC_UUID16,
                    }))
                }
            }
            _ => Err(Error::new(ErrorKind::ProtocolError)),
        }
    }

    fn next_service_or_done(&mut self, service_index: usize) -> Result<Option<AttPdu>> {
        let next_index = service_index + 1;
        if next_index >= self.services.len() {
            self.phase = DiscoveryPhase::Done;
            return Ok(None);
        }
        let svc = self.services[next_index].clone();
        self.phase = DiscoveryPhase::Characteristics { service_index: next_index, cursor: svc.start_handle };
        Ok(Some(AttPdu::ReadByTypeReq {
            start: svc.start_handle,
            end: svc.end_handle,
            attribute_type: CHARACTERISTIC_UUID16,
        }))
    }
}

impl Default for ServiceDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the `READ_REQ` → (repeated) `READ_BLOB_REQ` chain for a
/// characteristic value longer than `mtu - 1` octets.
pub struct BlobRead {
    handle: u16,
    mtu: u16,
    accumulated: Vec<u8>,
}

impl BlobRead {
    pub fn new(handle: u16, mtu: u16) -> Self {
        Self { handle, mtu, accumulated: Vec::new() }
    }

    pub fn start(&self) -> AttPdu {
        AttPdu::ReadReq { handle: self.handle }
    }

    /// Returns `Ok(Some(next_request))` to continue, `Ok(None)` once the
    /// full value has been concatenated.
    pub fn on_response(&mut self, pdu: &AttPdu) -> Result<Option<AttPdu>> {
        let value = match pdu {
            AttPdu::ReadRsp { value } => value,
            AttPdu::ReadBlobRsp { value } => value,
            _ => return Err(Error::new(ErrorKind::ProtocolError)),
        };
        let was_full_chunk = value.len() as u16 == self.mtu - 1;
        self.accumulated.extend_from_slice(value);
        if was_full_chunk {
            Ok(Some(AttPdu::ReadBlobReq {
                handle: self.handle,
                offset: self.accumulated.len() as u16,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn into_value(self) -> Vec<u8> {
        self.accumulated
    }
}

/// Builds the CCCD write that subscribes to notifications and/or
/// indications on the descriptor handle found during discovery.
pub fn subscribe_cccd_write(cccd_handle: u16, notify: bool, indicate: bool) -> AttPdu {
    let mut bits: u16 = 0;
    if notify {
        bits |= 0x0001;
    }
    if indicate {
        bits |= 0x0002;
    }
    AttPdu::WriteReq { handle: cccd_handle, value: bits.to_le_bytes().to_vec() }
}

pub fn is_cccd_uuid(uuid: Uuid) -> bool {
    uuid.as_u16() == Some(CCCD_UUID16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_read_terminates_on_short_final_chunk() {
        let mut blob = BlobRead::new(0x10, 23);
        assert_eq!(blob.start(), AttPdu::ReadReq { handle: 0x10 });
        let first = vec![0u8; 22]; // mtu - 1
        let next = blob
            .on_response(&AttPdu::ReadRsp { value: first.clone() })
            .unwrap()
            .unwrap();
        assert_eq!(next, AttPdu::ReadBlobReq { handle: 0x10, offset: 22 });
        let done = blob
            .on_response(&AttPdu::ReadBlobRsp { value: vec![1, 2, 3] })
            .unwrap();
        assert!(done.is_none());
        let mut expect = first;
        expect.extend_from_slice(&[1, 2, 3]);
        assert_eq!(blob.into_value(), expect);
    }

    #[test]
    fn service_discovery_single_service_single_characteristic() {
        let mut disc = ServiceDiscovery::new();
        assert_eq!(disc.start(), AttPdu::ReadByGroupTypeReq { start: 1, end: 0xffff, group_type: 0x2800 });

        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0xffffu16.to_le_bytes());
        data.extend_from_slice(&0x180du16.to_le_bytes());
        let next = disc
            .on_response(&AttPdu::ReadByGroupTypeRsp { entry_len: 6, data })
            .unwrap();
        let next = next.unwrap();
        assert_eq!(
            next,
            AttPdu::ReadByTypeReq { start: 1, end: 0xffff, attribute_type: CHARACTERISTIC_UUID16 }
        );

        let mut cdata = Vec::new();
        cdata.extend_from_slice(&2u16.to_le_bytes());
        cdata.push(0x02); // properties: read
        cdata.extend_from_slice(&3u16.to_le_bytes());
        cdata.extend_from_slice(&0x2a37u16.to_le_bytes());
        let done = disc
            .on_response(&AttPdu::ReadByTypeRsp { entry_len: 7, data: cdata })
            .unwrap();
        assert!(done.is_none());
        assert!(disc.is_done());
        assert_eq!(disc.characteristics().len(), 1);
        assert_eq!(disc.characteristics()[0].value_handle, 3);
    }
}
