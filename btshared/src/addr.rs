use crate::ordered_atomic::RelaxedAtomic;
use macaddr::MacAddr6;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum AddressError {
    #[error("invalid address string: {0}")]
    InvalidAddress(String),
}

/// A bare EUI-48, no type tag. `Display`/`FromStr` use the usual
/// colon-separated uppercase hex form.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Eui48(pub [u8; 6]);

impl fmt::Display for Eui48 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Eui48 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Eui48 {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(AddressError::InvalidAddress(s.to_string()));
        }
        let mut out = [0u8; 6];
        for (i, p) in parts.iter().enumerate() {
            out[i] = u8::from_str_radix(p, 16)
                .map_err(|_| AddressError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(out))
    }
}

impl From<MacAddr6> for Eui48 {
    fn from(m: MacAddr6) -> Self {
        Self(m.into_array())
    }
}

impl From<Eui48> for MacAddr6 {
    fn from(a: Eui48) -> Self {
        MacAddr6::from(a.0)
    }
}

/// Address-type discriminator. `Undefined` is the wildcard used by
/// [`BdAddressAndType::matches`].
#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BdAddressType {
    BrEdr,
    LePublic,
    LeRandom,
    #[default]
    Undefined,
}

impl BdAddressType {
    /// Clamps any out-of-range on-wire value to `Undefined` rather than
    /// failing decode, matching the original's `to_BDAddressType`.
    pub fn from_wire(v: u8) -> Self {
        match v {
            0x00 => Self::BrEdr,
            0x01 => Self::LePublic,
            0x02 => Self::LeRandom,
            _ => Self::Undefined,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::BrEdr => 0x00,
            Self::LePublic => 0x01,
            Self::LeRandom => 0x02,
            Self::Undefined => 0xff,
        }
    }
}

/// Sub-type of a `LeRandom` address, derived from its two most
/// significant bits.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum BleRandomAddressType {
    UnresolvablePrivate,
    ResolvablePrivate,
    Reserved,
    StaticPublic,
    Undefined,
}

impl BleRandomAddressType {
    pub fn of(addr: &Eui48) -> Self {
        match addr.0[5] >> 6 {
            0b00 => Self::UnresolvablePrivate,
            0b01 => Self::ResolvablePrivate,
            0b10 => Self::Reserved,
            0b11 => Self::StaticPublic,
            _ => Self::Undefined,
        }
    }
}

/// Address-type encoding used by the LE Create Connection command's
/// "peer address type" field — a distinct 2-bit enumeration from
/// [`BdAddressType`], per the Core Spec's HCI command tables.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum HciLePeerAddressType {
    Public,
    Random,
    PublicIdentity,
    RandomStaticIdentity,
    Undefined,
}

impl HciLePeerAddressType {
    pub fn from_wire(v: u8) -> Self {
        match v {
            0x00 => Self::Public,
            0x01 => Self::Random,
            0x02 => Self::PublicIdentity,
            0x03 => Self::RandomStaticIdentity,
            _ => Self::Undefined,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Public => 0x00,
            Self::Random => 0x01,
            Self::PublicIdentity => 0x02,
            Self::RandomStaticIdentity => 0x03,
            Self::Undefined => 0xff,
        }
    }
}

/// Address-type encoding used by the LE Create Connection command's
/// "own address type" field.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum HciLeOwnAddressType {
    Public,
    Random,
    ResolvableOrPublic,
    ResolvableOrRandom,
    Undefined,
}

impl HciLeOwnAddressType {
    pub fn from_wire(v: u8) -> Self {
        match v {
            0x00 => Self::Public,
            0x01 => Self::Random,
            0x02 => Self::ResolvableOrPublic,
            0x03 => Self::ResolvableOrRandom,
            _ => Self::Undefined,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Public => 0x00,
            Self::Random => 0x01,
            Self::ResolvableOrPublic => 0x02,
            Self::ResolvableOrRandom => 0x03,
            Self::Undefined => 0xff,
        }
    }
}

/// `(address, type)` pair with wildcard matching and a lazily-computed,
/// relaxed-atomic-cached hash. `PartialEq`/`Hash` are strict; use
/// [`matches`](Self::matches) wherever `spec.md`'s wildcard semantics apply
/// (registry lookups, reconnection matching).
#[derive(Clone, Debug, Default)]
pub struct BdAddressAndType {
    pub address: Eui48,
    pub address_type: BdAddressType,
    hash: RelaxedAtomic,
}

impl BdAddressAndType {
    pub fn new(address: Eui48, address_type: BdAddressType) -> Self {
        Self {
            address,
            address_type,
            hash: RelaxedAtomic::new(0),
        }
    }

    pub fn any_bredr() -> Self {
        Self::new(Eui48::default(), BdAddressType::BrEdr)
    }

    pub fn any() -> Self {
        Self::new(Eui48::default(), BdAddressType::Undefined)
    }

    /// Equality that treats `Undefined` on either side's type as a
    /// wildcard: `matches((a, t), (a, Undefined)) == true` for any `t`.
    pub fn matches(&self, other: &Self) -> bool {
        if self.address != other.address {
            return false;
        }
        self.address_type == BdAddressType::Undefined
            || other.address_type == BdAddressType::Undefined
            || self.address_type == other.address_type
    }

    fn compute_hash(&self) -> i64 {
        let mut h: u64 = 31;
        let mut addr_hash = std::collections::hash_map::DefaultHasher::new();
        self.address.hash(&mut addr_hash);
        h = h.wrapping_mul(1).wrapping_add(addr_hash.finish());
        let h = (h << 5).wrapping_sub(h).wrapping_add(self.address_type as u64);
        h as i64
    }

    /// Lock-free lazy cache: recomputing concurrently from multiple
    /// threads is harmless, it always converges to the same value.
    pub fn hash_code(&self) -> i64 {
        let cached = self.hash.load();
        if cached != 0 {
            return cached;
        }
        let computed = self.compute_hash();
        self.hash.store(computed);
        computed
    }

    pub fn clear_hash(&self) {
        self.hash.store(0);
    }
}

impl PartialEq for BdAddressAndType {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.address_type == other.address_type
    }
}
impl Eq for BdAddressAndType {}

impl Hash for BdAddressAndType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.address_type.hash(state);
    }
}

impl fmt::Display for BdAddressAndType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.address_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eui48_round_trips_through_string() {
        let a = Eui48([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let s = a.to_string();
        assert_eq!(s, "11:22:33:44:55:66");
        assert_eq!(Eui48::from_str(&s).unwrap(), a);
    }

    #[test]
    fn undefined_type_is_wildcard_on_either_side() {
        let a = BdAddressAndType::new(Eui48([1, 2, 3, 4, 5, 6]), BdAddressType::LePublic);
        let wildcard = BdAddressAndType::new(Eui48([1, 2, 3, 4, 5, 6]), BdAddressType::Undefined);
        assert!(a.matches(&wildcard));
        assert!(wildcard.matches(&a));
        assert_eq!(a, a.clone());
        assert_ne!(a, wildcard);
    }

    #[test]
    fn matches_requires_same_address() {
        let a = BdAddressAndType::new(Eui48([1, 0, 0, 0, 0, 0]), BdAddressType::Undefined);
        let b = BdAddressAndType::new(Eui48([2, 0, 0, 0, 0, 0]), BdAddressType::Undefined);
        assert!(!a.matches(&b));
    }

    #[test]
    fn ble_random_address_subtype_from_top_bits() {
        let resolvable = Eui48([0, 0, 0, 0, 0, 0b01_000000]);
        assert_eq!(
            BleRandomAddressType::of(&resolvable),
            BleRandomAddressType::ResolvablePrivate
        );
        let static_pub = Eui48([0, 0, 0, 0, 0, 0b11_000000]);
        assert_eq!(
            BleRandomAddressType::of(&static_pub),
            BleRandomAddressType::StaticPublic
        );
    }
}
