pub mod opcode;
pub mod pdu;

pub use opcode::AttOpcode;
pub use pdu::AttPdu;
