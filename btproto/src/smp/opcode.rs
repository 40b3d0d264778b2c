use num_derive::{FromPrimitive, ToPrimitive};
use strum::Display;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum SmpOpcode {
    PairingRequest = 0x01,
    PairingResponse = 0x02,
    PairingConfirm = 0x03,
    PairingRandom = 0x04,
    PairingFailed = 0x05,
    EncryptionInformation = 0x06,
    MasterIdentification = 0x07,
    IdentityInformation = 0x08,
    IdentityAddressInformation = 0x09,
    SigningInformation = 0x0a,
    SecurityRequest = 0x0b,
    PairingPublicKey = 0x0c,
    PairingDhkeyCheck = 0x0d,
    PairingKeypressNotification = 0x0e,
}
