pub mod client;
pub mod ieee11073;
pub mod server;

pub use client::{BlobRead, DiscoveredCharacteristic, DiscoveredService, ServiceDiscovery};
pub use ieee11073::{decode_float32, Ieee11073Time};
pub use server::{AttributeDatabase, CharacteristicBuilder};
