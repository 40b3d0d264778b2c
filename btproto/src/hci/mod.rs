pub mod packet;
pub mod types;

pub use packet::{acl_to_l2cap, le_supervisor_timeout_10ms, HciCommand, HciEvent, L2capFrameHeader};
pub use types::{HciLeMetaEventType, HciPacketType, PbFlag};
