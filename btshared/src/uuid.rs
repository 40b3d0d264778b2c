//! Bluetooth UUIDs: a tagged union of 16-, 32-, and 128-bit forms with a
//! defined little-endian wire layout and a canonical 128-bit expansion.
//! Equality compares the 128-bit expansion, so a 16-bit UUID equals its
//! 128-bit form.

use std::fmt;

/// `00000000-0000-1000-8000-00805F9B34FB`, the Bluetooth SIG base UUID.
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;
const SHIFT_96: u32 = 96;

#[derive(Clone, Copy, Debug)]
pub enum Uuid {
    U16(u16),
    U32(u32),
    U128(u128),
}

impl Uuid {
    pub fn from_u16(v: u16) -> Self {
        Self::U16(v)
    }

    pub fn from_u32(v: u32) -> Self {
        Self::U32(v)
    }

    pub fn from_u128(v: u128) -> Self {
        Self::U128(v)
    }

    /// Canonical 128-bit expansion: `value << 96 | BASE_UUID` for the
    /// short forms, identity for the 128-bit form.
    pub fn to_128bit(self) -> u128 {
        match self {
            Self::U16(v) => ((v as u128) << SHIFT_96) | BASE_UUID,
            Self::U32(v) => ((v as u128) << SHIFT_96) | BASE_UUID,
            Self::U128(v) => v,
        }
    }

    /// Narrows a 128-bit value back to 16 bits if it is exactly the base
    /// UUID with a 16-bit value shifted in, else `None`.
    pub fn as_u16(self) -> Option<u16> {
        let v = self.to_128bit();
        if v & !(0xffffu128 << SHIFT_96) == BASE_UUID {
            Some((v >> SHIFT_96) as u16)
        } else {
            None
        }
    }

    pub fn as_u32(self) -> Option<u32> {
        let v = self.to_128bit();
        if v & !(0xffff_ffffu128 << SHIFT_96) == BASE_UUID {
            Some((v >> SHIFT_96) as u32)
        } else {
            None
        }
    }

    /// Little-endian wire bytes at native width (2, 4, or 16 octets).
    pub fn to_le_bytes(self) -> Vec<u8> {
        match self {
            Self::U16(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::U128(v) => v.to_le_bytes().to_vec(),
        }
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::U16(u16::from_le_bytes(bytes.try_into().ok()?))),
            4 => Some(Self::U32(u32::from_le_bytes(bytes.try_into().ok()?))),
            16 => Some(Self::U128(u128::from_le_bytes(bytes.try_into().ok()?))),
            _ => None,
        }
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_128bit() == other.to_128bit()
    }
}
impl Eq for Uuid {}

impl std::hash::Hash for Uuid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_128bit().hash(state);
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let v = self.to_128bit();
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_equals_its_128_bit_expansion() {
        let short = Uuid::from_u16(0x1234);
        let long = Uuid::from_u128(short.to_128bit());
        assert_eq!(short, long);
    }

    #[test]
    fn narrowing_round_trips() {
        let u = Uuid::from_u16(0xabcd);
        assert_eq!(u.as_u16(), Some(0xabcd));
        let u32v = Uuid::from_u32(0xdead_beef);
        assert_eq!(u32v.as_u32(), Some(0xdead_beef));
    }

    #[test]
    fn non_base_128_uuid_does_not_narrow() {
        let custom = Uuid::from_u128(0x1234_5678_90ab_cdef_1234_5678_90ab_cdef);
        assert_eq!(custom.as_u16(), None);
        assert_eq!(custom.as_u32(), None);
    }

    #[test]
    fn wire_round_trip() {
        let u = Uuid::from_u32(0x0000_1234);
        let bytes = u.to_le_bytes();
        assert_eq!(Uuid::from_le_bytes(&bytes), Some(Uuid::U32(0x0000_1234)));
    }
}
