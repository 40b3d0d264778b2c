pub mod addr;
pub mod event;
pub mod ordered_atomic;
pub mod shutdown;
pub mod uuid;

pub use addr::{
    BdAddressAndType, BdAddressType, BleRandomAddressType, Eui48, HciLeOwnAddressType,
    HciLePeerAddressType,
};
pub use uuid::Uuid;
