//! Adapter (spec.md §4.9): owns one controller's [`HciHandler`] and its
//! L2CAP listener socket; exposes power management, discovery,
//! advertising, and connection-lifecycle status fan-out.
//!
//! Grounded on `nxzr_device::connection`'s `#[tracing::instrument]` +
//! `thiserror`-enum-wrapping-sub-errors orchestration style, and on
//! `transport.rs`'s `watch`-channel state signaling.
use crate::config::Config;
use crate::error::AdapterError;
use crate::hci_handler::{CommandResponse, HciHandler};
use crate::sock::l2cap;
use btproto::eir::{Eir, EirDataType};
use btproto::hci::{HciEvent, HciLeMetaEventType};
use btshared::addr::{BdAddressAndType, BdAddressType, Eui48, HciLePeerAddressType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const OP_SET_EVENT_MASK: u16 = 0x0c01;
const OP_RESET: u16 = 0x0c03;
const OP_WRITE_LOCAL_NAME: u16 = 0x0c13;
const OP_WRITE_SCAN_ENABLE: u16 = 0x0c1a;
const OP_READ_BD_ADDR: u16 = 0x1009;
const OP_LE_SET_ADVERTISING_PARAMETERS: u16 = 0x2006;
const OP_LE_SET_ADVERTISING_DATA: u16 = 0x2008;
const OP_LE_SET_SCAN_RESPONSE_DATA: u16 = 0x2009;
const OP_LE_SET_ADVERTISE_ENABLE: u16 = 0x200a;
const OP_LE_SET_SCAN_PARAMETERS: u16 = 0x200b;
const OP_LE_SET_SCAN_ENABLE: u16 = 0x200c;
const OP_LE_CREATE_CONNECTION: u16 = 0x200d;
const OP_LE_CREATE_CONNECTION_CANCEL: u16 = 0x200e;

/// Governs what happens to an in-progress discovery scan across a
/// connect event, per spec.md §4.9.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscoveryPolicy {
    PauseOnConnect,
    PauseUntilReady,
    PauseUntilDisconnect,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanParams {
    pub active: bool,
    pub interval_ms: u16,
    pub window_ms: u16,
    pub filter_policy: u8,
    pub filter_duplicates: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self { active: true, interval_ms: 100, window_ms: 100, filter_policy: 0, filter_duplicates: true }
    }
}

#[derive(Clone, Debug)]
pub struct AdvertisingParams {
    pub interval_min_ms: u16,
    pub interval_max_ms: u16,
    pub pdu_type: u8,
    pub channel_map: u8,
    pub filter_policy: u8,
    pub initial_adv: Eir,
    pub initial_adv_mask: EirDataType,
    pub scan_response: Option<Eir>,
    pub scan_response_mask: EirDataType,
}

impl Default for AdvertisingParams {
    fn default() -> Self {
        Self {
            interval_min_ms: 100,
            interval_max_ms: 150,
            pdu_type: 0x00, // ADV_IND
            channel_map: 0x07,
            filter_policy: 0x00,
            initial_adv: Eir::default(),
            initial_adv_mask: EirDataType::FLAGS | EirDataType::NAME,
            scan_response: None,
            scan_response_mask: EirDataType::empty(),
        }
    }
}

/// Central (default) or Peripheral, per spec.md §4.9's role selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Central,
    Peripheral,
}

/// Higher-level status events fanned out to adapter listeners, distinct
/// from the raw [`HciEvent`] stream the [`HciHandler`] itself carries.
#[derive(Clone, Debug)]
pub enum AdapterEvent {
    DiscoveryStarted,
    DiscoveryStopped,
    DeviceFound { addr: BdAddressAndType, eir: Eir },
    DeviceConnected { addr: BdAddressAndType, handle: u16 },
    DeviceDisconnected { addr: BdAddressAndType },
    SettingsChanged,
}

fn advertising_interval_units(ms: u16) -> u16 {
    ((ms as u32 * 1000) / 625) as u16
}

fn scan_interval_units(ms: u16) -> u16 {
    ((ms as u32 * 1000) / 625) as u16
}

/// Bluetooth address type doesn't carry a BR/EDR concept in LE Create
/// Connection's "Peer Address Type" field, so `BdAddressType::to_wire`
/// (which reserves 0 for BR/EDR) would misencode every LE peer by one.
/// `HciLePeerAddressType` is the field's own {Public=0, Random=1} scheme.
fn le_peer_address_type_wire(t: BdAddressType) -> u8 {
    match t {
        BdAddressType::LeRandom => HciLePeerAddressType::Random.to_wire(),
        _ => HciLePeerAddressType::Public.to_wire(),
    }
}

/// Owns the HCI handler and L2CAP listener for one controller.
#[derive(Clone)]
pub struct Adapter {
    dev_id: u16,
    hci: HciHandler,
    config: Arc<Config>,
    powered: Arc<AtomicBool>,
    role_tx: Arc<watch::Sender<Role>>,
    events_tx: Arc<broadcast::Sender<AdapterEvent>>,
    discovery_policy: Arc<std::sync::Mutex<DiscoveryPolicy>>,
}

impl Adapter {
    #[tracing::instrument(target = "adapter")]
    pub async fn open(dev_id: u16, config: Arc<Config>) -> Result<Self, AdapterError> {
        let hci = HciHandler::open(dev_id, &config.hci).await?;
        let (role_tx, _) = watch::channel(Role::Central);
        let (events_tx, _) = broadcast::channel(64);
        let adapter = Self {
            dev_id,
            hci,
            config,
            powered: Arc::new(AtomicBool::new(false)),
            role_tx: Arc::new(role_tx),
            events_tx: Arc::new(events_tx),
            discovery_policy: Arc::new(std::sync::Mutex::new(DiscoveryPolicy::PauseOnConnect)),
        };
        adapter.spawn_event_pump();
        Ok(adapter)
    }

    pub fn dev_id(&self) -> u16 {
        self.dev_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    pub fn role(&self) -> Role {
        *self.role_tx.borrow()
    }

    /// Resets the controller and applies the default event mask,
    /// per spec.md §4.9's `initialize`.
    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn initialize(&self) -> Result<(), AdapterError> {
        self.hci
            .send_command(OP_RESET, vec![], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        // Enable all standard events relevant to connection/discovery lifecycle.
        let mask = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x3f];
        self.hci
            .send_command(OP_SET_EVENT_MASK, mask.to_vec(), CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        self.set_powered(true).await
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn set_powered(&self, on: bool) -> Result<(), AdapterError> {
        self.powered.store(on, Ordering::Release);
        let _ = self.events_tx.send(AdapterEvent::SettingsChanged);
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn reset(&self) -> Result<(), AdapterError> {
        self.hci
            .send_command(OP_RESET, vec![], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn set_name(&self, name: &str) -> Result<(), AdapterError> {
        if !self.is_powered() {
            return Err(AdapterError::NotPowered);
        }
        let mut params = vec![0u8; 248];
        let bytes = name.as_bytes();
        let n = bytes.len().min(247);
        params[..n].copy_from_slice(&bytes[..n]);
        self.hci
            .send_command(OP_WRITE_LOCAL_NAME, params, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        let _ = self.events_tx.send(AdapterEvent::SettingsChanged);
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn local_address(&self) -> Result<BdAddressAndType, AdapterError> {
        let event = self
            .hci
            .send_command(OP_READ_BD_ADDR, vec![], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        // Command Complete: [num_packets, opcode_lo, opcode_hi, status, addr(6)]
        if event.params.len() < 10 {
            return Err(AdapterError::Hci(crate::error::HciError::NoPendingCommand));
        }
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&event.params[4..10]);
        addr.reverse();
        Ok(BdAddressAndType::new(Eui48(addr), BdAddressType::BrEdr))
    }

    /// Starts LE active/passive scanning. `policy` only governs
    /// behavior across a subsequent connect; it is not applied here.
    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn start_discovery(&self, scan: ScanParams, policy: DiscoveryPolicy) -> Result<(), AdapterError> {
        if !self.is_powered() {
            return Err(AdapterError::NotPowered);
        }
        *self.discovery_policy.lock().unwrap() = policy;
        let mut params = Vec::with_capacity(7);
        params.push(if scan.active { 0x01 } else { 0x00 });
        params.extend_from_slice(&scan_interval_units(scan.interval_ms).to_le_bytes());
        params.extend_from_slice(&scan_interval_units(scan.window_ms).to_le_bytes());
        params.push(0x00); // own address type: public
        params.push(scan.filter_policy);
        self.hci
            .send_command(OP_LE_SET_SCAN_PARAMETERS, params, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        let enable = vec![0x01, if scan.filter_duplicates { 0x01 } else { 0x00 }];
        self.hci
            .send_command(OP_LE_SET_SCAN_ENABLE, enable, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        let _ = self.events_tx.send(AdapterEvent::DiscoveryStarted);
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn stop_discovery(&self) -> Result<(), AdapterError> {
        self.hci
            .send_command(OP_LE_SET_SCAN_ENABLE, vec![0x00, 0x00], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        let _ = self.events_tx.send(AdapterEvent::DiscoveryStopped);
        Ok(())
    }

    /// Starts advertising with the given parameters, selecting the
    /// Peripheral role (spec.md §4.9: "Slave is selected by starting
    /// advertising with a GATT server attached").
    #[tracing::instrument(target = "adapter", skip(self, adv))]
    pub async fn start_advertising(&self, adv: AdvertisingParams) -> Result<(), AdapterError> {
        if !self.is_powered() {
            return Err(AdapterError::NotPowered);
        }
        let mut params = Vec::with_capacity(15);
        params.extend_from_slice(&advertising_interval_units(adv.interval_min_ms).to_le_bytes());
        params.extend_from_slice(&advertising_interval_units(adv.interval_max_ms).to_le_bytes());
        params.push(adv.pdu_type);
        params.push(0x00); // own address type: public
        params.push(0x00); // direct address type
        params.extend_from_slice(&[0u8; 6]); // direct address
        params.push(adv.channel_map);
        params.push(adv.filter_policy);
        self.hci
            .send_command(OP_LE_SET_ADVERTISING_PARAMETERS, params, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;

        let mut adv_data = vec![0u8; 32];
        let emitted = adv.initial_adv.emit(adv.initial_adv_mask).map_err(|_| AdapterError::NotSupported)?;
        adv_data[0] = emitted.len() as u8;
        adv_data[1..1 + emitted.len()].copy_from_slice(&emitted);
        self.hci
            .send_command(OP_LE_SET_ADVERTISING_DATA, adv_data, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;

        if let Some(scan_rsp) = &adv.scan_response {
            let mut rsp_data = vec![0u8; 32];
            let emitted = scan_rsp.emit(adv.scan_response_mask).map_err(|_| AdapterError::NotSupported)?;
            rsp_data[0] = emitted.len() as u8;
            rsp_data[1..1 + emitted.len()].copy_from_slice(&emitted);
            self.hci
                .send_command(OP_LE_SET_SCAN_RESPONSE_DATA, rsp_data, CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
                .await?;
        }

        self.hci
            .send_command(OP_LE_SET_ADVERTISE_ENABLE, vec![0x01], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        self.role_tx.send_replace(Role::Peripheral);
        let _ = self.events_tx.send(AdapterEvent::SettingsChanged);
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn stop_advertising(&self) -> Result<(), AdapterError> {
        self.hci
            .send_command(OP_LE_SET_ADVERTISE_ENABLE, vec![0x00], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        self.role_tx.send_replace(Role::Central);
        Ok(())
    }

    /// Enables or disables BR/EDR page/inquiry scan, governing whether
    /// this controller is connectable/discoverable over classic.
    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn set_classic_scan_enable(&self, page_scan: bool, inquiry_scan: bool) -> Result<(), AdapterError> {
        let mut value = 0u8;
        if page_scan {
            value |= 0x02;
        }
        if inquiry_scan {
            value |= 0x01;
        }
        self.hci
            .send_command(OP_WRITE_SCAN_ENABLE, vec![value], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        Ok(())
    }

    /// Initiates an LE connection (Central role). Resolves once the
    /// controller accepts the request (Command Status); the connection
    /// itself completes asynchronously and is surfaced through
    /// [`Adapter::subscribe`] as [`AdapterEvent::DeviceConnected`].
    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn connect(&self, peer: BdAddressAndType) -> Result<(), AdapterError> {
        if !self.is_powered() {
            return Err(AdapterError::NotPowered);
        }
        let mut params = Vec::with_capacity(25);
        params.extend_from_slice(&scan_interval_units(60).to_le_bytes()); // scan interval
        params.extend_from_slice(&scan_interval_units(30).to_le_bytes()); // scan window
        params.push(0x00); // initiator filter policy: use peer address
        params.push(le_peer_address_type_wire(peer.address_type));
        let mut addr = peer.address.0;
        addr.reverse();
        params.extend_from_slice(&addr);
        params.push(0x00); // own address type
        params.extend_from_slice(&advertising_interval_units(30).to_le_bytes()); // conn interval min
        params.extend_from_slice(&advertising_interval_units(50).to_le_bytes()); // conn interval max
        params.extend_from_slice(&0u16.to_le_bytes()); // conn latency
        params.extend_from_slice(&btproto::hci::le_supervisor_timeout_10ms(0, 50, 2).to_le_bytes()[..2]);
        params.extend_from_slice(&0u16.to_le_bytes()); // min ce len
        params.extend_from_slice(&0u16.to_le_bytes()); // max ce len
        self.hci
            .send_command(OP_LE_CREATE_CONNECTION, params, CommandResponse::Status, self.config.hci.cmd_status_timeout())
            .await?;
        Ok(())
    }

    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn cancel_connect(&self) -> Result<(), AdapterError> {
        self.hci
            .send_command(OP_LE_CREATE_CONNECTION_CANCEL, vec![], CommandResponse::Complete, self.config.hci.cmd_complete_timeout())
            .await?;
        Ok(())
    }

    /// Opens the L2CAP listener socket for incoming ATT/GATT or custom
    /// PSM connections, bound to this controller's own address.
    #[tracing::instrument(target = "adapter", skip(self))]
    pub async fn l2cap_listen(&self, local: BdAddressAndType, psm: u16) -> Result<l2cap::SeqPacketListener, AdapterError> {
        let addr = l2cap::SocketAddr::new(local, psm);
        l2cap::SeqPacketListener::bind(addr).await.map_err(|e| AdapterError::Hci(e.into()))
    }

    fn spawn_event_pump(&self) {
        let mut rx = self.hci.subscribe();
        let events_tx = self.events_tx.clone();
        let dev_id = self.dev_id;
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(adapter_event) = translate(&event) {
                    debug!(dev_id, "dispatching adapter event {:?}", adapter_event);
                    let _ = events_tx.send(adapter_event);
                }
            }
            info!(dev_id, "adapter event pump terminated, hci handler closed");
        });
    }
}

/// Turns a raw LE-Meta Connection Complete event into a higher-level
/// [`AdapterEvent`]. Other event kinds (discovery results, disconnects)
/// would extend this match; only connection-complete is modeled here
/// since that's the event this crate's Device objects bind to.
fn translate(event: &HciEvent) -> Option<AdapterEvent> {
    if event.le_meta_subevent() != Some(HciLeMetaEventType::ConnectionComplete) {
        return None;
    }
    // LE Connection Complete: [subevent, status, handle(2), role, peer_addr_type, peer_addr(6), ...]
    if event.params.len() < 12 || event.params[1] != 0 {
        return None;
    }
    let handle = u16::from_le_bytes([event.params[2], event.params[3]]);
    let peer_addr_type = event.params[5];
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&event.params[6..12]);
    addr.reverse();
    let address_type = if peer_addr_type == 0 { BdAddressType::LePublic } else { BdAddressType::LeRandom };
    warn_on_unassigned(handle);
    Some(AdapterEvent::DeviceConnected { addr: BdAddressAndType::new(Eui48(addr), address_type), handle })
}

fn warn_on_unassigned(handle: u16) {
    if handle == 0 {
        warn!("le connection complete reported handle 0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertising_interval_converts_ms_to_0_625ms_units() {
        assert_eq!(advertising_interval_units(100), 160);
    }

    #[test]
    fn le_peer_address_type_never_emits_bredr_zero_for_random() {
        assert_eq!(le_peer_address_type_wire(BdAddressType::LePublic), 0x00);
        assert_eq!(le_peer_address_type_wire(BdAddressType::LeRandom), 0x01);
    }

    #[test]
    fn translate_ignores_non_connection_complete_events() {
        let event = HciEvent { event_code: 0x3e, params: vec![0x02, 0, 0] };
        assert!(translate(&event).is_none());
    }

    #[test]
    fn translate_extracts_handle_and_peer_address() {
        let mut params = vec![0x01u8, 0x00, 0x01, 0x00, 0x00, 0x00];
        params.extend_from_slice(&[6, 5, 4, 3, 2, 1]);
        params.extend_from_slice(&[0u8; 7]);
        let event = HciEvent { event_code: 0x3e, params };
        match translate(&event).unwrap() {
            AdapterEvent::DeviceConnected { handle, addr } => {
                assert_eq!(handle, 1);
                assert_eq!(addr.address.0, [1, 2, 3, 4, 5, 6]);
            }
            _ => panic!("expected DeviceConnected"),
        }
    }
}
