//! Extended Inquiry Response / Advertising Data: `{len, type, data}` TLV
//! triples, masked emission, and the 31-octet single-PDU cap. Two EIR
//! records merge by letting a later read overlay an earlier one, which is
//! how an initial-advertisement buffer and a scan-response buffer combine
//! into one logical record.

use crate::error::{Error, ErrorKind, Result};

pub const MAX_AD_LEN: usize = 31;

const TYPE_FLAGS: u8 = 0x01;
const TYPE_UUID16_INCOMPLETE: u8 = 0x02;
const TYPE_UUID16_COMPLETE: u8 = 0x03;
const TYPE_UUID32_INCOMPLETE: u8 = 0x04;
const TYPE_UUID32_COMPLETE: u8 = 0x05;
const TYPE_UUID128_INCOMPLETE: u8 = 0x06;
const TYPE_UUID128_COMPLETE: u8 = 0x07;
const TYPE_NAME_SHORT: u8 = 0x08;
const TYPE_NAME_COMPLETE: u8 = 0x09;
const TYPE_TX_POWER: u8 = 0x0a;
const TYPE_DEVICE_CLASS: u8 = 0x0d;
const TYPE_CONN_INTERVAL_RANGE: u8 = 0x12;
const TYPE_SOLICIT_UUID16: u8 = 0x14;
const TYPE_SERVICE_DATA_16: u8 = 0x16;
const TYPE_APPEARANCE: u8 = 0x19;
const TYPE_SOLICIT_UUID128: u8 = 0x15;
const TYPE_SOLICIT_UUID32: u8 = 0x1f;
const TYPE_MANUFACTURER_DATA: u8 = 0xff;

bitflags::bitflags! {
    /// Fields an [`Eir::emit`] caller wants serialized. `ALL` is the union
    /// of every bit; emission fails with `Overflow` rather than silently
    /// truncate when the selection doesn't fit in [`MAX_AD_LEN`] octets.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EirDataType: u16 {
        const FLAGS = 1 << 0;
        const NAME = 1 << 1;
        const TX_POWER = 1 << 2;
        const MANUF_DATA = 1 << 3;
        const SERVICE_UUID = 1 << 4;
        const DEVICE_CLASS = 1 << 5;
        const CONN_INTERVAL_RANGE = 1 << 6;
        const SERVICE_DATA = 1 << 7;
        const APPEARANCE = 1 << 8;
        const SOLICIT_UUID = 1 << 9;
        const ALL = (1 << 10) - 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Eir {
    pub flags: Option<u8>,
    pub local_name: Option<(String, bool)>,
    pub tx_power: Option<i8>,
    pub device_class: Option<u32>,
    pub appearance: Option<u16>,
    pub conn_interval_range: Option<(u16, u16)>,
    pub manufacturer_specific_data: Option<(u16, Vec<u8>)>,
    pub service_uuids16: Vec<u16>,
    pub service_uuids32: Vec<u32>,
    pub service_uuids128: Vec<u128>,
    pub solicit_uuids16: Vec<u16>,
    pub service_data16: Vec<(u16, Vec<u8>)>,
}

impl Eir {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut eir = Eir::default();
        let mut i = 0usize;
        while i < buf.len() {
            let len = buf[i] as usize;
            if len == 0 {
                break; // padding
            }
            if i + 1 + len > buf.len() {
                return Err(Error::with_message(
                    ErrorKind::Malformed,
                    "AD structure length exceeds buffer",
                ));
            }
            let ad_type = buf[i + 1];
            let data = &buf[i + 2..i + 1 + len];
            eir.apply_field(ad_type, data)?;
            i += 1 + len;
        }
        Ok(eir)
    }

    fn apply_field(&mut self, ad_type: u8, data: &[u8]) -> Result<()> {
        match ad_type {
            TYPE_FLAGS => self.flags = data.first().copied(),
            TYPE_UUID16_INCOMPLETE | TYPE_UUID16_COMPLETE => {
                for chunk in data.chunks_exact(2) {
                    self.service_uuids16
                        .push(u16::from_le_bytes(chunk.try_into().unwrap()));
                }
            }
            TYPE_UUID32_INCOMPLETE | TYPE_UUID32_COMPLETE => {
                for chunk in data.chunks_exact(4) {
                    self.service_uuids32
                        .push(u32::from_le_bytes(chunk.try_into().unwrap()));
                }
            }
            TYPE_UUID128_INCOMPLETE | TYPE_UUID128_COMPLETE => {
                for chunk in data.chunks_exact(16) {
                    self.service_uuids128
                        .push(u128::from_le_bytes(chunk.try_into().unwrap()));
                }
            }
            TYPE_NAME_SHORT => {
                self.local_name = Some((String::from_utf8_lossy(data).into_owned(), false))
            }
            TYPE_NAME_COMPLETE => {
                self.local_name = Some((String::from_utf8_lossy(data).into_owned(), true))
            }
            TYPE_TX_POWER => self.tx_power = data.first().map(|&b| b as i8),
            TYPE_DEVICE_CLASS => {
                if data.len() >= 3 {
                    self.device_class = Some(u32::from_le_bytes([data[0], data[1], data[2], 0]));
                }
            }
            TYPE_APPEARANCE => {
                if data.len() >= 2 {
                    self.appearance = Some(u16::from_le_bytes([data[0], data[1]]));
                }
            }
            TYPE_CONN_INTERVAL_RANGE => {
                if data.len() >= 4 {
                    self.conn_interval_range = Some((
                        u16::from_le_bytes([data[0], data[1]]),
                        u16::from_le_bytes([data[2], data[3]]),
                    ));
                }
            }
            TYPE_SOLICIT_UUID16 => {
                for chunk in data.chunks_exact(2) {
                    self.solicit_uuids16
                        .push(u16::from_le_bytes(chunk.try_into().unwrap()));
                }
            }
            TYPE_SERVICE_DATA_16 => {
                if data.len() >= 2 {
                    self.service_data16
                        .push((u16::from_le_bytes([data[0], data[1]]), data[2..].to_vec()));
                }
            }
            TYPE_MANUFACTURER_DATA => {
                if data.len() >= 2 {
                    self.manufacturer_specific_data =
                        Some((u16::from_le_bytes([data[0], data[1]]), data[2..].to_vec()));
                }
            }
            TYPE_SOLICIT_UUID32 | TYPE_SOLICIT_UUID128 => {
                // Recognized but not modeled separately from 16-bit
                // solicitation in this core; dropped with no effect on
                // round-trip of the fields spec.md enumerates.
            }
            _ => {}
        }
        Ok(())
    }

    /// Later fields overlay earlier ones; used to combine an
    /// initial-advertisement decode with a scan-response decode into one
    /// logical record.
    pub fn merge(&mut self, other: &Eir) {
        if other.flags.is_some() {
            self.flags = other.flags;
        }
        if other.local_name.is_some() {
            self.local_name = other.local_name.clone();
        }
        if other.tx_power.is_some() {
            self.tx_power = other.tx_power;
        }
        if other.device_class.is_some() {
            self.device_class = other.device_class;
        }
        if other.appearance.is_some() {
            self.appearance = other.appearance;
        }
        if other.conn_interval_range.is_some() {
            self.conn_interval_range = other.conn_interval_range;
        }
        if other.manufacturer_specific_data.is_some() {
            self.manufacturer_specific_data = other.manufacturer_specific_data.clone();
        }
        if !other.service_uuids16.is_empty() {
            self.service_uuids16 = other.service_uuids16.clone();
        }
        if !other.service_uuids32.is_empty() {
            self.service_uuids32 = other.service_uuids32.clone();
        }
        if !other.service_uuids128.is_empty() {
            self.service_uuids128 = other.service_uuids128.clone();
        }
        if !other.solicit_uuids16.is_empty() {
            self.solicit_uuids16 = other.solicit_uuids16.clone();
        }
        if !other.service_data16.is_empty() {
            self.service_data16 = other.service_data16.clone();
        }
    }

    pub fn emit(&self, mask: EirDataType) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(MAX_AD_LEN);
        if mask.contains(EirDataType::FLAGS) {
            if let Some(flags) = self.flags {
                push_ad(&mut out, TYPE_FLAGS, &[flags])?;
            }
        }
        if mask.contains(EirDataType::NAME) {
            if let Some((name, complete)) = &self.local_name {
                let ty = if *complete {
                    TYPE_NAME_COMPLETE
                } else {
                    TYPE_NAME_SHORT
                };
                push_ad(&mut out, ty, name.as_bytes())?;
            }
        }
        if mask.contains(EirDataType::TX_POWER) {
            if let Some(tx) = self.tx_power {
                push_ad(&mut out, TYPE_TX_POWER, &[tx as u8])?;
            }
        }
        if mask.contains(EirDataType::DEVICE_CLASS) {
            if let Some(class) = self.device_class {
                let b = class.to_le_bytes();
                push_ad(&mut out, TYPE_DEVICE_CLASS, &b[..3])?;
            }
        }
        if mask.contains(EirDataType::APPEARANCE) {
            if let Some(app) = self.appearance {
                push_ad(&mut out, TYPE_APPEARANCE, &app.to_le_bytes())?;
            }
        }
        if mask.contains(EirDataType::CONN_INTERVAL_RANGE) {
            if let Some((min, max)) = self.conn_interval_range {
                let mut data = Vec::with_capacity(4);
                data.extend_from_slice(&min.to_le_bytes());
                data.extend_from_slice(&max.to_le_bytes());
                push_ad(&mut out, TYPE_CONN_INTERVAL_RANGE, &data)?;
            }
        }
        if mask.contains(EirDataType::MANUF_DATA) {
            if let Some((company, payload)) = &self.manufacturer_specific_data {
                let mut data = Vec::with_capacity(2 + payload.len());
                data.extend_from_slice(&company.to_le_bytes());
                data.extend_from_slice(payload);
                push_ad(&mut out, TYPE_MANUFACTURER_DATA, &data)?;
            }
        }
        if mask.contains(EirDataType::SERVICE_UUID) {
            if !self.service_uuids16.is_empty() {
                let mut data = Vec::with_capacity(self.service_uuids16.len() * 2);
                for u in &self.service_uuids16 {
                    data.extend_from_slice(&u.to_le_bytes());
                }
                push_ad(&mut out, TYPE_UUID16_COMPLETE, &data)?;
            }
            if !self.service_uuids32.is_empty() {
                let mut data = Vec::with_capacity(self.service_uuids32.len() * 4);
                for u in &self.service_uuids32 {
                    data.extend_from_slice(&u.to_le_bytes());
                }
                push_ad(&mut out, TYPE_UUID32_COMPLETE, &data)?;
            }
            if !self.service_uuids128.is_empty() {
                let mut data = Vec::with_capacity(self.service_uuids128.len() * 16);
                for u in &self.service_uuids128 {
                    data.extend_from_slice(&u.to_le_bytes());
                }
                push_ad(&mut out, TYPE_UUID128_COMPLETE, &data)?;
            }
        }
        if mask.contains(EirDataType::SOLICIT_UUID) && !self.solicit_uuids16.is_empty() {
            let mut data = Vec::with_capacity(self.solicit_uuids16.len() * 2);
            for u in &self.solicit_uuids16 {
                data.extend_from_slice(&u.to_le_bytes());
            }
            push_ad(&mut out, TYPE_SOLICIT_UUID16, &data)?;
        }
        if mask.contains(EirDataType::SERVICE_DATA) {
            for (uuid, payload) in &self.service_data16 {
                let mut data = Vec::with_capacity(2 + payload.len());
                data.extend_from_slice(&uuid.to_le_bytes());
                data.extend_from_slice(payload);
                push_ad(&mut out, TYPE_SERVICE_DATA_16, &data)?;
            }
        }
        if out.len() > MAX_AD_LEN {
            return Err(Error::new(ErrorKind::Overflow));
        }
        Ok(out)
    }
}

fn push_ad(out: &mut Vec<u8>, ad_type: u8, data: &[u8]) -> Result<()> {
    let len = data.len() + 1;
    if len > 255 {
        return Err(Error::new(ErrorKind::Overflow));
    }
    if out.len() + 1 + len > MAX_AD_LEN {
        return Err(Error::new(ErrorKind::Overflow));
    }
    out.push(len as u8);
    out.push(ad_type);
    out.extend_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Eir {
        Eir {
            flags: Some(0x06), // LE General Discoverable + BR/EDR Not Supported
            local_name: Some(("TestTempDev01".to_string(), true)),
            manufacturer_specific_data: Some((0x0001, vec![0x01, 0x02])),
            service_uuids16: vec![0x1234, 0x0a0b],
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_single_chunk() {
        let input = sample();
        let encoded = input.emit(EirDataType::ALL).unwrap();
        assert!(encoded.len() <= MAX_AD_LEN);
        let decoded = Eir::decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn split_across_adv_and_scan_response() {
        let mut input = sample();
        input.service_uuids32 = vec![0xabcd1234];
        input.service_uuids128 = vec![0x0000_1234_5678_100a_8000_0080_5f9b_34fb];

        let adv = input
            .emit(EirDataType::FLAGS | EirDataType::NAME | EirDataType::MANUF_DATA)
            .unwrap();
        let scan_rsp = input.emit(EirDataType::SERVICE_UUID).unwrap();

        let mut combined = Eir::decode(&adv).unwrap();
        combined.merge(&Eir::decode(&scan_rsp).unwrap());
        assert_eq!(combined, input);
    }

    #[test]
    fn emission_at_cap_succeeds_one_past_fails() {
        // 29 bytes of name + 2-byte header == exactly 31.
        let eir = Eir {
            local_name: Some(("a".repeat(29), true)),
            ..Default::default()
        };
        assert_eq!(eir.emit(EirDataType::NAME).unwrap().len(), MAX_AD_LEN);

        let too_big = Eir {
            local_name: Some(("a".repeat(30), true)),
            ..Default::default()
        };
        assert_eq!(
            too_big.emit(EirDataType::NAME).unwrap_err().kind,
            ErrorKind::Overflow
        );
    }
}
