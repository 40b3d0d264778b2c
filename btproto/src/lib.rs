//! Wire codecs and protocol state machines: EIR/AD, HCI, L2CAP, SMP, and
//! ATT/GATT. No sockets and no tokio I/O live here -- every public entry
//! point is `encode`/`decode` over byte slices or a synchronous
//! state-machine step, so it is unit-testable without a kernel Bluetooth
//! stack. The I/O layer is `btdevice`.

pub mod att;
pub mod eir;
pub mod error;
pub mod gatt;
pub mod hci;
pub mod l2cap;
pub mod octets;
pub mod smp;

pub use error::{Error, ErrorKind, Result};
