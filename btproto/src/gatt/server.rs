//! Server-side (Peripheral) GATT database. Handles are assigned in
//! ascending order at registration time and are stable for the database's
//! lifetime; each attribute's value is behind its own `RwLock` so a
//! notification write on one characteristic never blocks a concurrent
//! read of an unrelated one.

use crate::att::opcode::{CCCD_UUID16, CHARACTERISTIC_UUID16, PRIMARY_SERVICE_UUID16};
use crate::att::pdu::AttPdu;
use crate::error::{Error, ErrorKind, Result};
use std::sync::RwLock;

pub type ReadHook = Box<dyn Fn(u16) -> Result<Vec<u8>> + Send + Sync>;
pub type WriteHook = Box<dyn Fn(u16, &[u8]) -> Result<()> + Send + Sync>;

struct Attribute {
    handle: u16,
    uuid: Vec<u8>,
    value: RwLock<Vec<u8>>,
    on_read: Option<ReadHook>,
    on_write: Option<WriteHook>,
}

pub struct CharacteristicBuilder<'a> {
    db: &'a mut AttributeDatabase,
    uuid: Vec<u8>,
    properties: u8,
    initial_value: Vec<u8>,
    on_read: Option<ReadHook>,
    on_write: Option<WriteHook>,
    with_cccd: bool,
}

impl<'a> CharacteristicBuilder<'a> {
    pub fn on_read(mut self, hook: ReadHook) -> Self {
        self.on_read = Some(hook);
        self
    }

    pub fn on_write(mut self, hook: WriteHook) -> Self {
        self.on_write = Some(hook);
        self
    }

    pub fn with_cccd(mut self) -> Self {
        self.with_cccd = true;
        self
    }

    /// Registers the characteristic declaration, value, and (if
    /// requested) CCCD attributes, and returns the value handle.
    pub fn finish(self) -> u16 {
        let decl_handle = self.db.next_handle();
        let value_handle = self.db.next_handle();
        let mut decl_value = Vec::with_capacity(3 + self.uuid.len());
        decl_value.push(self.properties);
        decl_value.extend_from_slice(&value_handle.to_le_bytes());
        decl_value.extend_from_slice(&self.uuid);
        self.db.attributes.push(Attribute {
            handle: decl_handle,
            uuid: CHARACTERISTIC_UUID16.to_le_bytes().to_vec(),
            value: RwLock::new(decl_value),
            on_read: None,
            on_write: None,
        });
        self.db.attributes.push(Attribute {
            handle: value_handle,
            uuid: self.uuid,
            value: RwLock::new(self.initial_value),
            on_read: self.on_read,
            on_write: self.on_write,
        });
        if self.with_cccd {
            let cccd_handle = self.db.next_handle();
            self.db.attributes.push(Attribute {
                handle: cccd_handle,
                uuid: CCCD_UUID16.to_le_bytes().to_vec(),
                value: RwLock::new(vec![0x00, 0x00]),
                on_read: None,
                on_write: None,
            });
        }
        value_handle
    }
}

#[derive(Default)]
pub struct AttributeDatabase {
    attributes: Vec<Attribute>,
    next_handle: u16,
}

impl AttributeDatabase {
    pub fn new() -> Self {
        Self { attributes: Vec::new(), next_handle: 1 }
    }

    fn next_handle(&mut self) -> u16 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    /// Registers a primary service, returning its start handle. The
    /// service's end handle is fixed up once no more characteristics are
    /// added to it by the caller -- call [`close_service`] when done.
    pub fn add_service(&mut self, uuid: Vec<u8>) -> u16 {
        let handle = self.next_handle();
        self.attributes.push(Attribute {
            handle,
            uuid: PRIMARY_SERVICE_UUID16.to_le_bytes().to_vec(),
            value: RwLock::new(uuid),
            on_read: None,
            on_write: None,
        });
        handle
    }

    pub fn add_characteristic(&mut self, uuid: Vec<u8>, properties: u8, initial_value: Vec<u8>) -> CharacteristicBuilder {
        CharacteristicBuilder {
            db: self,
            uuid,
            properties,
            initial_value,
            on_read: None,
            on_write: None,
            with_cccd: false,
        }
    }

    fn find(&self, handle: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.handle == handle)
    }

    fn last_handle(&self) -> u16 {
        self.attributes.last().map(|a| a.handle).unwrap_or(0)
    }

    fn group_end_handle(&self, service_start: u16) -> u16 {
        let mut end = service_start;
        let mut in_service = false;
        for a in &self.attributes {
            if a.handle == service_start {
                in_service = true;
                end = a.handle;
                continue;
            }
            if in_service {
                if a.uuid == PRIMARY_SERVICE_UUID16.to_le_bytes().to_vec() {
                    break;
                }
                end = a.handle;
            }
        }
        end
    }

    /// Answers one inbound request synchronously from the database,
    /// invoking the characteristic's read/write hook if present.
    pub fn handle_request(&self, pdu: &AttPdu) -> AttPdu {
        match pdu {
            AttPdu::ReadReq { handle } => self.handle_read(*handle, 0, AttPdu::ReadReq { handle: *handle }),
            AttPdu::ReadBlobReq { handle, offset } => {
                self.handle_read(*handle, *offset, AttPdu::ReadBlobReq { handle: *handle, offset: *offset })
            }
            AttPdu::WriteReq { handle, value } => self.handle_write(*handle, value, true),
            AttPdu::WriteCmd { handle, value } => {
                let _ = self.handle_write(*handle, value, false);
                AttPdu::WriteRsp // ignored by caller for WriteCmd; no response is sent on the wire
            }
            AttPdu::ReadByGroupTypeReq { start, end, group_type }
                if *group_type == PRIMARY_SERVICE_UUID16 =>
            {
                self.handle_read_by_group_type(*start, *end)
            }
            AttPdu::ReadByTypeReq { start, end, attribute_type }
                if *attribute_type == CHARACTERISTIC_UUID16 =>
            {
                self.handle_read_by_type_characteristic(*start, *end)
            }
            _ => AttPdu::ErrorRsp {
                request_opcode: pdu.opcode() as u8,
                handle: 0,
                error_code: 0x06, // Request Not Supported
            },
        }
    }

    fn handle_read(&self, handle: u16, offset: u16, req: AttPdu) -> AttPdu {
        let Some(attr) = self.find(handle) else {
            return AttPdu::ErrorRsp { request_opcode: req.opcode() as u8, handle, error_code: 0x01 };
        };
        let value = match &attr.on_read {
            Some(hook) => match hook(handle) {
                Ok(v) => v,
                Err(_) => {
                    return AttPdu::ErrorRsp { request_opcode: req.opcode() as u8, handle, error_code: 0x0e }
                }
            },
            None => attr.value.read().unwrap().clone(),
        };
        let offset = offset as usize;
        if offset > value.len() {
            return AttPdu::ErrorRsp { request_opcode: req.opcode() as u8, handle, error_code: 0x07 };
        }
        let slice = value[offset..].to_vec();
        match req {
            AttPdu::ReadReq { .. } => AttPdu::ReadRsp { value: slice },
            _ => AttPdu::ReadBlobRsp { value: slice },
        }
    }

    fn handle_write(&self, handle: u16, new_value: &[u8], with_response: bool) -> AttPdu {
        let Some(attr) = self.find(handle) else {
            return AttPdu::ErrorRsp { request_opcode: AttPdu::WriteReq { handle, value: vec![] }.opcode() as u8, handle, error_code: 0x01 };
        };
        if let Some(hook) = &attr.on_write {
            if let Err(e) = hook(handle, new_value) {
                let code = if e.kind == ErrorKind::Unauthorized { 0x08 } else { 0x0e };
                return AttPdu::ErrorRsp { request_opcode: 0x12, handle, error_code: code };
            }
        }
        *attr.value.write().unwrap() = new_value.to_vec();
        if with_response {
            AttPdu::WriteRsp
        } else {
            AttPdu::WriteRsp // not sent on the wire for WRITE_CMD
        }
    }

    fn handle_read_by_group_type(&self, start: u16, end: u16) -> AttPdu {
        let mut entries = Vec::new();
        for attr in &self.attributes {
            if attr.handle < start || attr.handle > end {
                continue;
            }
            if attr.uuid != PRIMARY_SERVICE_UUID16.to_le_bytes().to_vec() {
                continue;
            }
            let group_end = self.group_end_handle(attr.handle);
            let uuid = attr.value.read().unwrap().clone();
            entries.push((attr.handle, group_end, uuid));
        }
        if entries.is_empty() {
            return AttPdu::ErrorRsp { request_opcode: 0x10, handle: start, error_code: 0x0a };
        }
        let uuid_len = entries[0].2.len();
        let mut data = Vec::new();
        for (h, ge, uuid) in entries.iter().filter(|(_, _, u)| u.len() == uuid_len) {
            data.extend_from_slice(&h.to_le_bytes());
            data.extend_from_slice(&ge.to_le_bytes());
            data.extend_from_slice(uuid);
        }
        AttPdu::ReadByGroupTypeRsp { entry_len: (4 + uuid_len) as u8, data }
    }

    fn handle_read_by_type_characteristic(&self, start: u16, end: u16) -> AttPdu {
        let char_uuid16 = CHARACTERISTIC_UUID16.to_le_bytes().to_vec();
        let mut entries = Vec::new();
        for attr in &self.attributes {
            if attr.handle < start || attr.handle > end {
                continue;
            }
            if attr.uuid != char_uuid16 {
                continue;
            }
            entries.push((attr.handle, attr.value.read().unwrap().clone()));
        }
        if entries.is_empty() {
            return AttPdu::ErrorRsp { request_opcode: 0x08, handle: start, error_code: 0x0a };
        }
        let entry_len = 2 + entries[0].1.len();
        let mut data = Vec::new();
        for (h, v) in entries.iter().filter(|(_, v)| 2 + v.len() == entry_len) {
            data.extend_from_slice(&h.to_le_bytes());
            data.extend_from_slice(v);
        }
        AttPdu::ReadByTypeRsp { entry_len: entry_len as u8, data }
    }

    pub fn handle_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn highest_handle(&self) -> u16 {
        self.last_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_then_characteristic_discovery_round_trips() {
        let mut db = AttributeDatabase::new();
        let uuid16_bytes = |u: u16| u.to_le_bytes().to_vec();
        db.add_service(uuid16_bytes(0x180d));
        let value_handle = db
            .add_characteristic(uuid16_bytes(0x2a37), 0x10, vec![0, 60])
            .with_cccd()
            .finish();
        assert_eq!(value_handle, 3);

        let rsp = db.handle_request(&AttPdu::ReadByGroupTypeReq { start: 1, end: 0xffff, group_type: PRIMARY_SERVICE_UUID16 });
        match rsp {
            AttPdu::ReadByGroupTypeRsp { entry_len, data } => {
                assert_eq!(entry_len, 6);
                assert_eq!(data.len(), 6);
            }
            other => panic!("unexpected {other:?}"),
        }

        let read = db.handle_request(&AttPdu::ReadReq { handle: value_handle });
        assert_eq!(read, AttPdu::ReadRsp { value: vec![0, 60] });
    }

    #[test]
    fn write_hook_can_reject_unauthorized() {
        let mut db = AttributeDatabase::new();
        db.add_service(vec![0x0d, 0x18]);
        let handle = db
            .add_characteristic(vec![0x37, 0x2a], 0x08, vec![0])
            .on_write(Box::new(|_h, _v| Err(Error::new(ErrorKind::Unauthorized))))
            .finish();
        let rsp = db.handle_request(&AttPdu::WriteReq { handle, value: vec![1] });
        assert_eq!(
            rsp,
            AttPdu::ErrorRsp { request_opcode: 0x12, handle, error_code: 0x08 }
        );
    }
}
