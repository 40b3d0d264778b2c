//! HCI command/event correlation (spec.md §4.8): owns the raw HCI socket
//! for one controller, turns `send_command` into a future that resolves
//! when the matching `Command Complete`/`Command Status`/LE-Meta
//! sub-event arrives, and fans out every event to subscribed listeners.
//!
//! Grounded on `nxzr_device::transport::TransportInner`'s reader-task +
//! `watch`-channel shape, generalized from a single fixed filter pair
//! into an arbitrary command/response queue.
use crate::config::HciConfig;
use crate::error::HciError;
use crate::sock::hci::{self, Filter, SocketAddr};
use btproto::hci::{HciCommand, HciEvent, HciLeMetaEventType};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, warn};

/// What kind of event resolves a pending command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Awaiting {
    CommandComplete,
    CommandStatus,
    LeMetaSubevent(HciLeMetaEventType),
}

impl Awaiting {
    fn matches(self, opcode: u16, event: &HciEvent) -> bool {
        match self {
            Self::CommandComplete | Self::CommandStatus => event.resolves_opcode(opcode).is_some(),
            Self::LeMetaSubevent(expected) => event.le_meta_subevent() == Some(expected),
        }
    }
}

struct PendingCommand {
    id: u64,
    opcode: u16,
    awaiting: Awaiting,
    resolve: oneshot::Sender<HciEvent>,
}

/// What a caller wants to wait for when issuing a command; mirrors
/// spec.md §4.8's multi-stage LE command support (e.g. LE Create
/// Connection resolves via Command Status, then later an LE-Meta
/// Connection Complete sub-event completes the operation).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandResponse {
    Complete,
    Status,
    LeMetaSubevent(HciLeMetaEventType),
}

impl From<CommandResponse> for Awaiting {
    fn from(r: CommandResponse) -> Self {
        match r {
            CommandResponse::Complete => Awaiting::CommandComplete,
            CommandResponse::Status => Awaiting::CommandStatus,
            CommandResponse::LeMetaSubevent(s) => Awaiting::LeMetaSubevent(s),
        }
    }
}

struct Shared {
    datagram: hci::Datagram,
    pending: Mutex<VecDeque<PendingCommand>>,
    listeners: Mutex<Vec<mpsc::Sender<HciEvent>>>,
    next_id: AtomicU64,
    ringsize: usize,
}

/// Owns one controller's raw HCI socket. Cloned handles share the same
/// reader task and command queue; dropping the last handle closes the
/// socket, which unblocks the reader with a `Disconnected`-shaped error
/// and drains every pending command with `HciError::Closed`.
#[derive(Clone)]
pub struct HciHandler {
    shared: Arc<Shared>,
}

impl HciHandler {
    #[tracing::instrument(target = "hci_handler")]
    pub async fn open(dev_id: u16, config: &HciConfig) -> Result<Self, HciError> {
        let datagram = hci::Datagram::bind(SocketAddr::new(dev_id)).await?;
        // Capture every HCI event; command correlation filters further in userspace.
        datagram.as_ref().set_filter(Filter { type_mask: 1 << 0x04, event_mask: [0xffff_ffff, 0xffff_ffff], opcode: 0 })?;
        let shared = Arc::new(Shared {
            datagram,
            pending: Mutex::new(VecDeque::new()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            ringsize: config.ringsize(),
        });
        let handler = Self { shared };
        handler.spawn_reader();
        Ok(handler)
    }

    fn spawn_reader(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 260];
            loop {
                match shared.datagram.recv(&mut buf).await {
                    Ok(0) => {
                        debug!("hci socket closed by peer, draining pending commands");
                        break;
                    }
                    Ok(n) => {
                        if let Ok(event) = HciEvent::decode(&buf[..n]) {
                            shared.dispatch(event);
                        }
                    }
                    Err(err) => {
                        warn!("hci socket read failed: {}", err);
                        break;
                    }
                }
            }
            shared.close_pending();
        });
    }

    /// Sends a command and awaits the event that resolves it, per
    /// spec.md §4.8's default timeouts (command-complete 10s,
    /// command-status 3s, configurable via [`HciConfig`]).
    #[tracing::instrument(target = "hci_handler", skip(self, params))]
    pub async fn send_command(&self, opcode: u16, params: Vec<u8>, expect: CommandResponse, timeout: Duration) -> Result<HciEvent, HciError> {
        let command = HciCommand::new(opcode, params)?;
        let (tx, rx) = oneshot::channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.len() >= self.shared.ringsize {
                pending.pop_front();
                warn!("hci pending-command queue overflowed, dropping oldest entry");
            }
            pending.push_back(PendingCommand { id, opcode, awaiting: expect.into(), resolve: tx });
        }
        self.shared.datagram.send(&command.encode()).await?;
        match time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(HciError::Closed),
            Err(_) => {
                self.shared.pending.lock().unwrap().retain(|p| p.id != id);
                Err(HciError::CommandTimeout)
            }
        }
    }

    /// Subscribes to every event this handler receives, for adapter-
    /// level status fan-out (§4.8). Delivery is cooperative: a slow
    /// listener drops events rather than blocking the reader task.
    pub fn subscribe(&self) -> mpsc::Receiver<HciEvent> {
        let (tx, rx) = mpsc::channel(self.shared.ringsize);
        self.shared.listeners.lock().unwrap().push(tx);
        rx
    }
}

impl Shared {
    fn dispatch(&self, event: HciEvent) {
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(pos) = pending.iter().position(|p| p.awaiting.matches(p.opcode, &event)) {
                let record = pending.remove(pos).unwrap();
                let _ = record.resolve.send(event.clone());
            }
        }
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("hci status listener lagging, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn close_pending(&self) {
        self.pending.lock().unwrap().clear();
        self.listeners.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_complete(opcode: u16, status: u8) -> HciEvent {
        let mut params = vec![1u8];
        params.extend_from_slice(&opcode.to_le_bytes());
        params.push(status);
        HciEvent { event_code: 0x0e, params }
    }

    #[test]
    fn awaiting_complete_matches_same_opcode_only() {
        let event = command_complete(0x0c03, 0);
        assert!(Awaiting::CommandComplete.matches(0x0c03, &event));
        assert!(!Awaiting::CommandComplete.matches(0x0c04, &event));
    }

    #[test]
    fn awaiting_le_meta_subevent_matches_by_subevent_code() {
        let event = HciEvent { event_code: 0x3e, params: vec![0x01, 0, 0] };
        assert!(Awaiting::LeMetaSubevent(HciLeMetaEventType::ConnectionComplete).matches(0, &event));
        assert!(!Awaiting::LeMetaSubevent(HciLeMetaEventType::AdvertisingReport).matches(0, &event));
    }
}
