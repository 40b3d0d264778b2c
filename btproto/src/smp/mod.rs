pub mod crypto;
pub mod keyfile;
pub mod keys;
pub mod opcode;
pub mod pdu;
pub mod state;

pub use keyfile::KeyFile;
pub use keys::{IdentityResolvingKey, KeyProperties, LinkKey, LinkKeyType, LongTermKey, SignatureResolvingKey};
pub use opcode::SmpOpcode;
pub use pdu::{AuthReq, IoCapability, KeyDistribution, OobDataFlag, PairingFailedReason, SmpPdu};
pub use state::{select_pairing_mode, PairingMethod, PairingStateMachine, SmpPairingState};
