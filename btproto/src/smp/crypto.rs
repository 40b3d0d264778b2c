//! LE Secure Connections key derivation (`f5`) and IRK→RPA resolution
//! (`ah`), per Core Spec Vol 3 Part H §2.2. Grounded on `SMPCrypto.cpp`'s
//! salt constant and 53-byte message-bag layout; unlike the original
//! (which ships `f5` permanently disabled behind `USE_SMP_CRYPTO`), this
//! performs the AES-CMAC calls for real.

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use cmac::{Cmac, Mac};

/// Salt random number, MSB first, fixed by the Core Spec's `f5` function.
const SALT: [u8; 16] = [
    0x6c, 0x88, 0x83, 0x91, 0xaa, 0xf5, 0xa5, 0x38, 0x60, 0x37, 0x0b, 0xdb, 0x5a, 0x60, 0x83, 0xbe,
];

fn aes_cmac(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut mac = Cmac::<Aes128>::new_from_slice(key).expect("16-byte key");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

fn swap_bytes(b: &[u8]) -> Vec<u8> {
    b.iter().rev().copied().collect()
}

/// `f5(w, n1, n2, a1, a2) -> (mac_key, ltk)`. `w` is the 256-bit DHKey in
/// little-endian; `n1`/`n2` are the 128-bit nonces in little-endian;
/// `a1`/`a2` are `(address_type, address_bytes)` with `address_bytes` in
/// the little-endian order `btshared::addr::Eui48` stores. Returns both
/// keys in little-endian.
pub fn f5(
    w: &[u8; 32],
    n1: &[u8; 16],
    n2: &[u8; 16],
    a1: (u8, &[u8; 6]),
    a2: (u8, &[u8; 6]),
) -> ([u8; 16], [u8; 16]) {
    let ws = swap_bytes(w); // little -> big
    let t = aes_cmac(&SALT, &ws);

    let mut m = [0u8; 53];
    m[1..5].copy_from_slice(b"btle");
    m[5..21].copy_from_slice(&swap_bytes(n1));
    m[21..37].copy_from_slice(&swap_bytes(n2));
    m[37] = a1.0;
    m[38..44].copy_from_slice(&swap_bytes(a1.1));
    m[44] = a2.0;
    m[45..51].copy_from_slice(&swap_bytes(a2.1));
    m[51] = 0x01;
    m[52] = 0x00;

    m[0] = 0x00;
    let mac_key_be = aes_cmac(&t, &m);
    let mac_key: [u8; 16] = swap_bytes(&mac_key_be).try_into().unwrap();

    m[0] = 0x01;
    let ltk_be = aes_cmac(&t, &m);
    let ltk: [u8; 16] = swap_bytes(&ltk_be).try_into().unwrap();

    (mac_key, ltk)
}

/// `ah(irk, prand) -> hash24`, per Core Spec 2.2.3: `e(irk, 0^104 || r)`
/// truncated to the low 24 bits. `irk` is big-endian per the Core Spec's
/// `e()` convention; `prand` is the low 24 bits of a resolvable private
/// address.
pub fn ah(irk: &[u8; 16], prand: u32) -> u32 {
    let cipher = Aes128::new(GenericArray::from_slice(irk));
    let mut block = GenericArray::from([0u8; 16]);
    block[13] = (prand >> 16) as u8;
    block[14] = (prand >> 8) as u8;
    block[15] = prand as u8;
    cipher.encrypt_block(&mut block);
    ((block[13] as u32) << 16) | ((block[14] as u32) << 8) | (block[15] as u32)
}

/// True when an inbound resolvable-private address's hash matches the
/// given IRK, per `spec.md` §4.6's `ah(IRK, prand) == hash24(rpa)`.
pub fn resolves(irk: &[u8; 16], prand: u32, hash24: u32) -> bool {
    ah(irk, prand) == hash24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f5_is_deterministic_and_mackey_ltk_differ() {
        let w = [0x11u8; 32];
        let n1 = [0x22u8; 16];
        let n2 = [0x33u8; 16];
        let a1 = (0x00u8, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let a2 = (0x01u8, &[0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f]);
        let (mac1, ltk1) = f5(&w, &n1, &n2, a1, a2);
        let (mac2, ltk2) = f5(&w, &n1, &n2, a1, a2);
        assert_eq!(mac1, mac2);
        assert_eq!(ltk1, ltk2);
        assert_ne!(mac1, ltk1);
    }

    #[test]
    fn f5_changes_with_nonces() {
        let w = [0x11u8; 32];
        let a1 = (0x00u8, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let a2 = (0x01u8, &[0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f]);
        let (_, ltk_a) = f5(&w, &[0x22u8; 16], &[0x33u8; 16], a1, a2);
        let (_, ltk_b) = f5(&w, &[0x44u8; 16], &[0x33u8; 16], a1, a2);
        assert_ne!(ltk_a, ltk_b);
    }

    #[test]
    fn ah_is_deterministic_and_resolves_matching_irk() {
        let irk = [0x5au8; 16];
        let prand = 0x00_ab_cd;
        let hash = ah(&irk, prand);
        assert!(resolves(&irk, prand, hash));
        let other_irk = [0x5bu8; 16];
        assert!(!resolves(&other_irk, prand, hash));
    }
}
