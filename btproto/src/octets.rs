//! Owned byte buffer with range-checked, absolute-offset put/get for every
//! scalar width the wire formats use. No implicit cursor: callers track
//! their own offset and pass it explicitly, mirroring how every PDU
//! encoder/decoder below lays out a packet field by field.

use crate::error::{Error, ErrorKind, Result};
use btshared::Eui48;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OctetBuffer {
    data: Vec<u8>,
}

fn range_check(buf: &[u8], offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > buf.len()) {
        return Err(Error::with_message(
            ErrorKind::RangeError,
            format!(
                "offset {offset} + len {len} exceeds buffer length {}",
                buf.len()
            ),
        ));
    }
    Ok(())
}

impl OctetBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn resize(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8> {
        range_check(&self.data, offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn put_u8(&mut self, offset: usize, v: u8) -> Result<()> {
        range_check(&self.data, offset, 1)?;
        self.data[offset] = v;
        Ok(())
    }

    pub fn get_u16_le(&self, offset: usize) -> Result<u16> {
        range_check(&self.data, offset, 2)?;
        Ok(u16::from_le_bytes(self.data[offset..offset + 2].try_into().unwrap()))
    }

    pub fn put_u16_le(&mut self, offset: usize, v: u16) -> Result<()> {
        range_check(&self.data, offset, 2)?;
        self.data[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn get_u32_le(&self, offset: usize) -> Result<u32> {
        range_check(&self.data, offset, 4)?;
        Ok(u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap()))
    }

    pub fn put_u32_le(&mut self, offset: usize, v: u32) -> Result<()> {
        range_check(&self.data, offset, 4)?;
        self.data[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn get_u64_le(&self, offset: usize) -> Result<u64> {
        range_check(&self.data, offset, 8)?;
        Ok(u64::from_le_bytes(self.data[offset..offset + 8].try_into().unwrap()))
    }

    pub fn put_u64_le(&mut self, offset: usize, v: u64) -> Result<()> {
        range_check(&self.data, offset, 8)?;
        self.data[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn get_u128_le(&self, offset: usize) -> Result<u128> {
        range_check(&self.data, offset, 16)?;
        Ok(u128::from_le_bytes(self.data[offset..offset + 16].try_into().unwrap()))
    }

    pub fn put_u128_le(&mut self, offset: usize, v: u128) -> Result<()> {
        range_check(&self.data, offset, 16)?;
        self.data[offset..offset + 16].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// A 256-bit bag (e.g. an LE-SC DHKey) has no scalar arithmetic
    /// meaning on the wire; it is carried as two little-endian u128 limbs.
    pub fn get_u256_le(&self, offset: usize) -> Result<[u8; 32]> {
        range_check(&self.data, offset, 32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.data[offset..offset + 32]);
        Ok(out)
    }

    pub fn put_u256_le(&mut self, offset: usize, v: &[u8; 32]) -> Result<()> {
        range_check(&self.data, offset, 32)?;
        self.data[offset..offset + 32].copy_from_slice(v);
        Ok(())
    }

    pub fn get_eui48(&self, offset: usize) -> Result<Eui48> {
        range_check(&self.data, offset, 6)?;
        let mut out = [0u8; 6];
        out.copy_from_slice(&self.data[offset..offset + 6]);
        Ok(Eui48(out))
    }

    pub fn put_eui48(&mut self, offset: usize, v: &Eui48) -> Result<()> {
        range_check(&self.data, offset, 6)?;
        self.data[offset..offset + 6].copy_from_slice(&v.0);
        Ok(())
    }

    pub fn get_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        range_check(&self.data, offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    pub fn put_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        range_check(&self.data, offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_put_get_round_trip() {
        let mut buf = OctetBuffer::new(16);
        buf.put_u16_le(0, 0x1234).unwrap();
        buf.put_u32_le(2, 0xdead_beef).unwrap();
        assert_eq!(buf.get_u16_le(0).unwrap(), 0x1234);
        assert_eq!(buf.get_u32_le(2).unwrap(), 0xdead_beef);
    }

    #[test]
    fn out_of_range_access_fails_without_panicking() {
        let buf = OctetBuffer::new(4);
        assert_eq!(buf.get_u32_le(2).unwrap_err().kind, ErrorKind::RangeError);
        assert_eq!(buf.get_u8(4).unwrap_err().kind, ErrorKind::RangeError);
    }

    #[test]
    fn eui48_put_get() {
        let mut buf = OctetBuffer::new(6);
        let addr = Eui48([1, 2, 3, 4, 5, 6]);
        buf.put_eui48(0, &addr).unwrap();
        assert_eq!(buf.get_eui48(0).unwrap(), addr);
    }
}
