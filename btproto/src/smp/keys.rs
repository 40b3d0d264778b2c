//! Key material structs, `spec.md` §3 "Keys" plus the `enc_size==0`
//! sentinel and `LinkKeyType::is_combi_key()` helper `original_source/`
//! carries but the distilled spec only states in passing.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct KeyProperties: u8 {
        const RESPONDER = 0b0000_0001;
        const AUTH      = 0b0000_0010;
        const SC        = 0b0000_0100;
    }
}

/// `enc_size == 0` marks an absent/invalid key; a present key's
/// `enc_size` must fall in `7..=16`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LongTermKey {
    pub properties: KeyProperties,
    pub enc_size: u8,
    pub ediv: u16,
    pub rand: u64,
    pub ltk: u128,
}

impl LongTermKey {
    pub fn is_valid(&self) -> bool {
        self.enc_size != 0 && (7..=16).contains(&self.enc_size)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdentityResolvingKey {
    pub properties: KeyProperties,
    pub irk: u128,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureResolvingKey {
    pub properties: KeyProperties,
    pub csrk: u128,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinkKeyType {
    Combi = 0x00,
    DbgCombi = 0x01,
    UnauthCombiP192 = 0x02,
    AuthCombiP192 = 0x03,
    ChangedCombi = 0x04,
    UnauthCombiP256 = 0x05,
    AuthCombiP256 = 0x06,
    LocalUnit = 0x07,
    RemoteUnit = 0x08,
    None = 0xff,
}

impl LinkKeyType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::Combi,
            0x01 => Self::DbgCombi,
            0x02 => Self::UnauthCombiP192,
            0x03 => Self::AuthCombiP192,
            0x04 => Self::ChangedCombi,
            0x05 => Self::UnauthCombiP256,
            0x06 => Self::AuthCombiP256,
            0x07 => Self::LocalUnit,
            0x08 => Self::RemoteUnit,
            0xff => Self::None,
            _ => return None,
        })
    }

    /// Distinguishes the seven "Combi" variants (derived jointly by both
    /// devices) from the two "Unit" variants (derived once from a single
    /// device's unit key) -- key-file policy uses this to decide whether
    /// a stored link key survives a local unit-key reset.
    pub fn is_combi_key(self) -> bool {
        matches!(
            self,
            Self::Combi
                | Self::DbgCombi
                | Self::UnauthCombiP192
                | Self::AuthCombiP192
                | Self::ChangedCombi
                | Self::UnauthCombiP256
                | Self::AuthCombiP256
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkKey {
    pub responder: bool,
    pub key_type: LinkKeyType,
    pub key: u128,
    pub pin_length: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enc_size_zero_is_invalid_even_in_range_looking_values() {
        let ltk = LongTermKey { properties: KeyProperties::empty(), enc_size: 0, ediv: 0, rand: 0, ltk: 0 };
        assert!(!ltk.is_valid());
    }

    #[test]
    fn combi_vs_unit_classification() {
        assert!(LinkKeyType::Combi.is_combi_key());
        assert!(LinkKeyType::DbgCombi.is_combi_key());
        assert!(LinkKeyType::UnauthCombiP192.is_combi_key());
        assert!(LinkKeyType::AuthCombiP192.is_combi_key());
        assert!(LinkKeyType::ChangedCombi.is_combi_key());
        assert!(LinkKeyType::UnauthCombiP256.is_combi_key());
        assert!(LinkKeyType::AuthCombiP256.is_combi_key());
        assert!(!LinkKeyType::LocalUnit.is_combi_key());
        assert!(!LinkKeyType::RemoteUnit.is_combi_key());
    }
}
