//! Pure byte-layout encode/decode for the key file format in `spec.md`
//! §6. The actual file I/O (write-to-temp + rename, directory scanning)
//! lives in `btdevice::registry`; this module only turns a
//! [`KeyFile`] into bytes and back, so it is unit-testable without a
//! filesystem.

use super::keys::{IdentityResolvingKey, KeyProperties, LinkKey, LinkKeyType, LongTermKey, SignatureResolvingKey};
use crate::error::{Error, ErrorKind, Result};
use btshared::addr::{BdAddressAndType, BdAddressType, Eui48};

const MAGIC: &[u8; 4] = b"DBT1";
const CURRENT_VERSION: u16 = 1;

const FLAG_HAS_LTK: u16 = 1 << 0;
const FLAG_HAS_IRK: u16 = 1 << 1;
const FLAG_HAS_CSRK: u16 = 1 << 2;
const FLAG_HAS_LINK_KEY: u16 = 1 << 3;

#[derive(Clone, Debug, Default)]
pub struct KeyFile {
    pub version: u16,
    pub local_addr: Option<BdAddressAndType>,
    pub remote_addr: Option<BdAddressAndType>,
    pub ltk: Option<LongTermKey>,
    pub irk: Option<IdentityResolvingKey>,
    pub csrk: Option<SignatureResolvingKey>,
    pub link_key: Option<LinkKey>,
}

fn encode_addr(out: &mut Vec<u8>, addr: &BdAddressAndType) {
    out.extend_from_slice(&addr.address.0);
    out.push(addr.address_type.to_wire());
}

fn decode_addr(buf: &[u8]) -> Result<BdAddressAndType> {
    if buf.len() < 7 {
        return Err(Error::new(ErrorKind::Malformed));
    }
    let mut a = [0u8; 6];
    a.copy_from_slice(&buf[0..6]);
    Ok(BdAddressAndType::new(Eui48(a), BdAddressType::from_wire(buf[6])))
}

impl KeyFile {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());

        let mut flags = 0u16;
        if self.ltk.is_some() {
            flags |= FLAG_HAS_LTK;
        }
        if self.irk.is_some() {
            flags |= FLAG_HAS_IRK;
        }
        if self.csrk.is_some() {
            flags |= FLAG_HAS_CSRK;
        }
        if self.link_key.is_some() {
            flags |= FLAG_HAS_LINK_KEY;
        }
        out.extend_from_slice(&flags.to_le_bytes());

        encode_addr(&mut out, self.local_addr.as_ref().unwrap_or(&BdAddressAndType::any()));
        encode_addr(&mut out, self.remote_addr.as_ref().unwrap_or(&BdAddressAndType::any()));

        if let Some(ltk) = &self.ltk {
            out.push(ltk.properties.bits());
            out.push(ltk.enc_size);
            out.extend_from_slice(&ltk.ediv.to_le_bytes());
            out.extend_from_slice(&ltk.rand.to_le_bytes());
            out.extend_from_slice(&ltk.ltk.to_le_bytes());
        }
        if let Some(irk) = &self.irk {
            out.push(irk.properties.bits());
            out.extend_from_slice(&irk.irk.to_le_bytes());
        }
        if let Some(csrk) = &self.csrk {
            out.push(csrk.properties.bits());
            out.extend_from_slice(&csrk.csrk.to_le_bytes());
        }
        if let Some(lk) = &self.link_key {
            out.push(lk.responder as u8);
            out.push(lk.key_type as u8);
            out.extend_from_slice(&lk.key.to_le_bytes());
            out.push(lk.pin_length);
        }

        let crc = crc32(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 + 2 + 2 + 7 + 7 + 4 {
            return Err(Error::new(ErrorKind::Malformed));
        }
        if &buf[0..4] != MAGIC {
            return Err(Error::with_message(ErrorKind::Malformed, "bad key file magic"));
        }
        let (body, crc_bytes) = buf.split_at(buf.len() - 4);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32(body) != stored_crc {
            return Err(Error::with_message(ErrorKind::Malformed, "key file crc mismatch"));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != CURRENT_VERSION {
            return Err(Error::with_message(ErrorKind::Malformed, "key file version mismatch"));
        }
        let flags = u16::from_le_bytes([buf[6], buf[7]]);

        let mut cursor = 8;
        let local_addr = decode_addr(&buf[cursor..])?;
        cursor += 7;
        let remote_addr = decode_addr(&buf[cursor..])?;
        cursor += 7;

        let need = |cursor: usize, n: usize| -> Result<()> {
            if body.len() < cursor + n {
                Err(Error::new(ErrorKind::Malformed))
            } else {
                Ok(())
            }
        };

        let mut ltk = None;
        if flags & FLAG_HAS_LTK != 0 {
            need(cursor, 20)?;
            ltk = Some(LongTermKey {
                properties: KeyProperties::from_bits_truncate(buf[cursor]),
                enc_size: buf[cursor + 1],
                ediv: u16::from_le_bytes([buf[cursor + 2], buf[cursor + 3]]),
                rand: u64::from_le_bytes(buf[cursor + 4..cursor + 12].try_into().unwrap()),
                ltk: u128::from_le_bytes(buf[cursor + 12..cursor + 28].try_into().unwrap()),
            });
            cursor += 28;
        }
        let mut irk = None;
        if flags & FLAG_HAS_IRK != 0 {
            need(cursor, 17)?;
            irk = Some(IdentityResolvingKey {
                properties: KeyProperties::from_bits_truncate(buf[cursor]),
                irk: u128::from_le_bytes(buf[cursor + 1..cursor + 17].try_into().unwrap()),
            });
            cursor += 17;
        }
        let mut csrk = None;
        if flags & FLAG_HAS_CSRK != 0 {
            need(cursor, 17)?;
            csrk = Some(SignatureResolvingKey {
                properties: KeyProperties::from_bits_truncate(buf[cursor]),
                csrk: u128::from_le_bytes(buf[cursor + 1..cursor + 17].try_into().unwrap()),
            });
            cursor += 17;
        }
        let mut link_key = None;
        if flags & FLAG_HAS_LINK_KEY != 0 {
            need(cursor, 19)?;
            link_key = Some(LinkKey {
                responder: buf[cursor] != 0,
                key_type: LinkKeyType::from_u8(buf[cursor + 1])
                    .ok_or_else(|| Error::with_message(ErrorKind::Malformed, "unknown link key type"))?,
                key: u128::from_le_bytes(buf[cursor + 2..cursor + 18].try_into().unwrap()),
                pin_length: buf[cursor + 18],
            });
        }

        Ok(Self { version, local_addr: Some(local_addr), remote_addr: Some(remote_addr), ltk, irk, csrk, link_key })
    }
}

/// CRC-32 (IEEE 802.3 polynomial, reflected), computed directly since
/// none of the example pack reaches for a CRC crate for this kind of
/// small on-disk checksum.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn key_file_round_trips_with_all_keys_present() {
        let file = KeyFile {
            version: CURRENT_VERSION,
            local_addr: Some(BdAddressAndType::new(Eui48([1, 2, 3, 4, 5, 6]), BdAddressType::LePublic)),
            remote_addr: Some(BdAddressAndType::new(Eui48([6, 5, 4, 3, 2, 1]), BdAddressType::LeRandom)),
            ltk: Some(LongTermKey { properties: KeyProperties::AUTH, enc_size: 16, ediv: 0x1234, rand: 0xdead_beef, ltk: 0x1111 }),
            irk: Some(IdentityResolvingKey { properties: KeyProperties::empty(), irk: 0x2222 }),
            csrk: Some(SignatureResolvingKey { properties: KeyProperties::empty(), csrk: 0x3333 }),
            link_key: Some(LinkKey { responder: true, key_type: LinkKeyType::AuthCombiP256, key: 0x4444, pin_length: 4 }),
        };
        let decoded = KeyFile::decode(&file.encode()).unwrap();
        assert_eq!(decoded.ltk, file.ltk);
        assert_eq!(decoded.irk, file.irk);
        assert_eq!(decoded.csrk, file.csrk);
        assert_eq!(decoded.link_key, file.link_key);
        assert_eq!(decoded.local_addr.unwrap(), file.local_addr.unwrap());
    }

    #[test]
    fn corrupt_crc_is_rejected() {
        let file = KeyFile::default();
        let mut bytes = file.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(KeyFile::decode(&bytes).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = KeyFile::default().encode();
        bytes[0] = b'X';
        assert!(KeyFile::decode(&bytes).is_err());
    }
}
