//! The SMP pairing state machine (`spec.md` §4.6) and pairing-mode
//! selection (Core Spec tables 2.6/2.7/2.8, reproduced in §4.6's table).

use super::pdu::{IoCapability, OobDataFlag};
use crate::error::{Error, ErrorKind, Result};

/// Discriminants match `SMPTypes.hpp`'s `SMPPairingState` exactly, since
/// the key-file format and listener contracts elsewhere in the original
/// source key off these numeric values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SmpPairingState {
    None = 0,
    Failed = 1,
    RequestedByResponder = 2,
    FeatureExchangeStarted = 3,
    FeatureExchangeCompleted = 4,
    PasskeyExpected = 5,
    NumericCompareExpected = 6,
    OobExpected = 7,
    KeyDistribution = 8,
    Completed = 9,
}

impl SmpPairingState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// True if `next` is a legal successor of `self` per the ordered
    /// chain in §4.6 (`Failed` is always reachable from any non-terminal
    /// state, regardless of this table).
    fn allows(self, next: Self) -> bool {
        use SmpPairingState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (None, RequestedByResponder) => true,
            (None, FeatureExchangeStarted) => true,
            (RequestedByResponder, FeatureExchangeStarted) => true,
            (FeatureExchangeStarted, FeatureExchangeCompleted) => true,
            (FeatureExchangeCompleted, PasskeyExpected) => true,
            (FeatureExchangeCompleted, NumericCompareExpected) => true,
            (FeatureExchangeCompleted, OobExpected) => true,
            (FeatureExchangeCompleted, KeyDistribution) => true,
            (PasskeyExpected, KeyDistribution) => true,
            (NumericCompareExpected, KeyDistribution) => true,
            (OobExpected, KeyDistribution) => true,
            (KeyDistribution, Completed) => true,
            _ => false,
        }
    }
}

/// Drives one SMP session's pairing state forward. Holds only the state
/// enum; the caller owns PDU buffering and nonce/key storage.
pub struct PairingStateMachine {
    state: SmpPairingState,
}

impl PairingStateMachine {
    pub fn new() -> Self {
        Self { state: SmpPairingState::None }
    }

    pub fn state(&self) -> SmpPairingState {
        self.state
    }

    /// Advances to `next`, rejecting illegal or repeated transitions
    /// with `ProtocolError` (the state machine must advance monotonically
    /// and never re-enter a state within one session).
    pub fn advance(&mut self, next: SmpPairingState) -> Result<()> {
        if !self.state.allows(next) {
            return Err(Error::with_message(
                ErrorKind::ProtocolError,
                format!("illegal SMP transition {:?} -> {:?}", self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }
}

impl Default for PairingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Key-generation method selected for a pairing session, per Core Spec
/// tables 2.6/2.7/2.8.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PairingMethod {
    JustWorks,
    /// Initiator displays the passkey; responder enters it.
    PasskeyEntryDisplayInitiator,
    /// Responder displays the passkey; initiator enters it.
    PasskeyEntryDisplayResponder,
    /// Neither side has a display; both enter the same passkey.
    PasskeyEntryBothInput,
    NumericComparison,
    OutOfBand,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TableCell {
    JustWorks,
    PasskeyIni,
    PasskeyRes,
    PasskeyAll,
    NumCompOrJustWorks,
    NumCompOrPasskeyIni,
    NumCompOrPasskeyRes,
}

impl TableCell {
    fn resolve(self, secure_connections: bool) -> PairingMethod {
        match self {
            Self::JustWorks => PairingMethod::JustWorks,
            Self::PasskeyIni => PairingMethod::PasskeyEntryDisplayInitiator,
            Self::PasskeyRes => PairingMethod::PasskeyEntryDisplayResponder,
            Self::PasskeyAll => PairingMethod::PasskeyEntryBothInput,
            Self::NumCompOrJustWorks => {
                if secure_connections {
                    PairingMethod::NumericComparison
                } else {
                    PairingMethod::JustWorks
                }
            }
            Self::NumCompOrPasskeyIni => {
                if secure_connections {
                    PairingMethod::NumericComparison
                } else {
                    PairingMethod::PasskeyEntryDisplayInitiator
                }
            }
            Self::NumCompOrPasskeyRes => {
                if secure_connections {
                    PairingMethod::NumericComparison
                } else {
                    PairingMethod::PasskeyEntryDisplayResponder
                }
            }
        }
    }
}

fn table_cell(responder: IoCapability, initiator: IoCapability) -> TableCell {
    use IoCapability::*;
    use TableCell::*;
    match (responder, initiator) {
        (DisplayOnly, DisplayOnly) => JustWorks,
        (DisplayOnly, DisplayYesNo) => JustWorks,
        (DisplayOnly, KeyboardOnly) => PasskeyIni,
        (DisplayOnly, NoInputNoOutput) => JustWorks,
        (DisplayOnly, KeyboardDisplay) => PasskeyIni,

        (DisplayYesNo, DisplayOnly) => JustWorks,
        (DisplayYesNo, DisplayYesNo) => NumCompOrJustWorks,
        (DisplayYesNo, KeyboardOnly) => PasskeyIni,
        (DisplayYesNo, NoInputNoOutput) => JustWorks,
        (DisplayYesNo, KeyboardDisplay) => NumCompOrPasskeyIni,

        (KeyboardOnly, DisplayOnly) => PasskeyRes,
        (KeyboardOnly, DisplayYesNo) => PasskeyRes,
        (KeyboardOnly, KeyboardOnly) => PasskeyAll,
        (KeyboardOnly, NoInputNoOutput) => JustWorks,
        (KeyboardOnly, KeyboardDisplay) => PasskeyRes,

        (NoInputNoOutput, _) => JustWorks,

        (KeyboardDisplay, DisplayOnly) => PasskeyRes,
        (KeyboardDisplay, DisplayYesNo) => NumCompOrPasskeyRes,
        (KeyboardDisplay, KeyboardOnly) => PasskeyIni,
        (KeyboardDisplay, NoInputNoOutput) => JustWorks,
        (KeyboardDisplay, KeyboardDisplay) => NumCompOrPasskeyRes,
    }
}

/// Selects the pairing method for a session. `secure_connections` is the
/// negotiated SC bit (both sides' `AuthReq::SC` set); MITM and OOB flags
/// come from each side's `AuthReq`/`OOBDataFlag` as exchanged in the
/// Pairing Request/Response.
#[allow(clippy::too_many_arguments)]
pub fn select_pairing_mode(
    responder_mitm: bool,
    responder_io: IoCapability,
    responder_oob: OobDataFlag,
    initiator_mitm: bool,
    initiator_io: IoCapability,
    initiator_oob: OobDataFlag,
    secure_connections: bool,
) -> PairingMethod {
    let oob_present = if secure_connections {
        responder_oob == OobDataFlag::Present || initiator_oob == OobDataFlag::Present
    } else {
        responder_oob == OobDataFlag::Present && initiator_oob == OobDataFlag::Present
    };
    if oob_present {
        return PairingMethod::OutOfBand;
    }
    if !(responder_mitm || initiator_mitm) {
        return PairingMethod::JustWorks;
    }
    table_cell(responder_io, initiator_io).resolve(secure_connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_numeric_compare_under_sc_passkey_under_legacy() {
        let sc_mode = select_pairing_mode(
            true,
            IoCapability::DisplayYesNo,
            OobDataFlag::NotPresent,
            true,
            IoCapability::KeyboardDisplay,
            OobDataFlag::NotPresent,
            true,
        );
        assert_eq!(sc_mode, PairingMethod::NumericComparison);

        let legacy_mode = select_pairing_mode(
            true,
            IoCapability::DisplayYesNo,
            OobDataFlag::NotPresent,
            true,
            IoCapability::KeyboardDisplay,
            OobDataFlag::NotPresent,
            false,
        );
        assert_eq!(legacy_mode, PairingMethod::PasskeyEntryDisplayInitiator);
    }

    #[test]
    fn no_mitm_requested_is_always_just_works() {
        let mode = select_pairing_mode(
            false,
            IoCapability::KeyboardOnly,
            OobDataFlag::NotPresent,
            false,
            IoCapability::KeyboardOnly,
            OobDataFlag::NotPresent,
            true,
        );
        assert_eq!(mode, PairingMethod::JustWorks);
    }

    #[test]
    fn oob_supersedes_the_table() {
        let mode = select_pairing_mode(
            true,
            IoCapability::NoInputNoOutput,
            OobDataFlag::Present,
            true,
            IoCapability::NoInputNoOutput,
            OobDataFlag::NotPresent,
            true,
        );
        assert_eq!(mode, PairingMethod::OutOfBand);
    }

    #[test]
    fn state_machine_rejects_skipping_ahead() {
        let mut sm = PairingStateMachine::new();
        assert!(sm.advance(SmpPairingState::KeyDistribution).is_err());
        sm.advance(SmpPairingState::FeatureExchangeStarted).unwrap();
        sm.advance(SmpPairingState::FeatureExchangeCompleted).unwrap();
        sm.advance(SmpPairingState::NumericCompareExpected).unwrap();
        sm.advance(SmpPairingState::KeyDistribution).unwrap();
        sm.advance(SmpPairingState::Completed).unwrap();
        assert!(sm.advance(SmpPairingState::Failed).is_err());
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_state() {
        let mut sm = PairingStateMachine::new();
        sm.advance(SmpPairingState::FeatureExchangeStarted).unwrap();
        sm.advance(SmpPairingState::Failed).unwrap();
    }
}
