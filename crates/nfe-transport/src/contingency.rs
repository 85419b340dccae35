//! # Contingency State
//!
//! When the primary authorizer is unreachable, the issuer may switch to an
//! alternate channel. [`ContingencyManager`] holds the single process-wide
//! flag recording whether that switch is in effect.
//!
//! ## Concurrency
//!
//! The manager is a cloneable handle over one mutex-guarded
//! [`ContingencyState`]. Activate and deactivate check and mutate under the
//! same lock, so two racing activations cannot both succeed: the loser
//! observes [`ContingencyError::AlreadyActive`]. Nothing here expires the
//! state; resuming normal operation is an explicit operator decision.

use std::fmt;
use std::sync::Arc;

use chrono::{Offset, Utc};
use nfe_core::{
    offset_from_minutes, EmissionType, EventTimestamp, Region, DEFAULT_UTC_OFFSET_MINUTES,
};
use nfe_events::sanitize::validated_text;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::endpoint::Channel;
use crate::error::ContingencyError;

const REASON_MIN: usize = 15;
const REASON_MAX: usize = 255;

/// Alternate emission modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyMode {
    /// Virtual contingency authorizer, national.
    SvcAn,
    /// Virtual contingency authorizer, Rio Grande do Sul.
    SvcRs,
    /// Prior electronic registration of the issuance (EPEC).
    Epec,
    /// Security form for auxiliary document printing (FS-DA).
    FsDa,
    /// Offline issuance of consumer invoices.
    Offline,
}

impl ContingencyMode {
    /// Emission type stamped into keys issued under this mode.
    pub fn emission_type(self) -> EmissionType {
        match self {
            Self::SvcAn => EmissionType::ContingencySvcAn,
            Self::SvcRs => EmissionType::ContingencySvcRs,
            Self::Epec => EmissionType::ContingencyEpec,
            Self::FsDa => EmissionType::ContingencyFsDa,
            Self::Offline => EmissionType::ContingencyOffline,
        }
    }

    /// Virtual authorizer assigned to `region`.
    pub fn svc_for(region: Region) -> Self {
        match region {
            Region::Amazonas
            | Region::Bahia
            | Region::Ceara
            | Region::Goias
            | Region::Maranhao
            | Region::MatoGrossoDoSul
            | Region::MatoGrosso
            | Region::Para
            | Region::Pernambuco
            | Region::Piaui
            | Region::Parana => Self::SvcRs,
            _ => Self::SvcAn,
        }
    }

    /// Whether calls are routed to a different authorizer.
    pub fn is_virtual_authorizer(self) -> bool {
        matches!(self, Self::SvcAn | Self::SvcRs)
    }
}

impl fmt::Display for ContingencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SvcAn => "SVC-AN",
            Self::SvcRs => "SVC-RS",
            Self::Epec => "EPEC",
            Self::FsDa => "FS-DA",
            Self::Offline => "OFFLINE",
        };
        f.write_str(name)
    }
}

/// Snapshot of the contingency flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyState {
    /// Whether a mode is in effect.
    pub active: bool,
    /// The mode in effect.
    pub mode: Option<ContingencyMode>,
    /// Sanitized activation reason.
    pub reason: Option<String>,
    /// When the mode took effect.
    pub activated_at: Option<EventTimestamp>,
}

impl ContingencyState {
    /// Serialize for persistence across restarts.
    pub fn to_json(&self) -> Result<String, ContingencyError> {
        serde_json::to_string(self).map_err(|e| ContingencyError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Handle to the process-wide contingency flag.
#[derive(Debug, Clone, Default)]
pub struct ContingencyManager {
    state: Arc<Mutex<ContingencyState>>,
}

impl ContingencyManager {
    /// Inactive manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager resumed from [`ContingencyState::to_json`] output.
    ///
    /// # Errors
    ///
    /// [`ContingencyError::Serialization`] on malformed input or an
    /// inconsistent snapshot (active without a mode).
    pub fn restore(json: &str) -> Result<Self, ContingencyError> {
        let state: ContingencyState =
            serde_json::from_str(json).map_err(|e| ContingencyError::Serialization {
                reason: e.to_string(),
            })?;
        if state.active != state.mode.is_some() {
            return Err(ContingencyError::Serialization {
                reason: "active flag and mode disagree".into(),
            });
        }
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Activate `mode` now, in the default offset.
    pub fn activate(
        &self,
        reason: &str,
        mode: ContingencyMode,
    ) -> Result<ContingencyState, ContingencyError> {
        let offset = offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES).unwrap_or_else(|_| Utc.fix());
        self.activate_at(reason, mode, EventTimestamp::now_in(offset))
    }

    /// Activate `mode` effective `at`.
    ///
    /// # Errors
    ///
    /// - [`ContingencyError::InvalidReason`] unless the sanitized reason is
    ///   15..=255 printable characters.
    /// - [`ContingencyError::AlreadyActive`] when a mode is in effect.
    pub fn activate_at(
        &self,
        reason: &str,
        mode: ContingencyMode,
        at: EventTimestamp,
    ) -> Result<ContingencyState, ContingencyError> {
        let reason = validated_text("xJust", reason, REASON_MIN, REASON_MAX)?;
        let mut state = self.state.lock();
        if let Some(current) = state.mode.filter(|_| state.active) {
            return Err(ContingencyError::AlreadyActive { mode: current });
        }
        *state = ContingencyState {
            active: true,
            mode: Some(mode),
            reason: Some(reason),
            activated_at: Some(at),
        };
        tracing::info!(%mode, activated_at = %at, "contingency activated");
        Ok(state.clone())
    }

    /// Return to the primary channel.
    ///
    /// # Errors
    ///
    /// [`ContingencyError::NotActive`] when no mode is in effect.
    pub fn deactivate(&self) -> Result<ContingencyState, ContingencyError> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(ContingencyError::NotActive);
        }
        let previous = std::mem::take(&mut *state);
        tracing::info!(
            mode = ?previous.mode,
            "contingency deactivated"
        );
        Ok(previous)
    }

    /// Whether a mode is in effect.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Current snapshot.
    pub fn state(&self) -> ContingencyState {
        self.state.lock().clone()
    }

    /// Emission type for new documents.
    pub fn emission_type(&self) -> EmissionType {
        self.active_mode()
            .map_or(EmissionType::Normal, ContingencyMode::emission_type)
    }

    /// Channel for the next call.
    pub fn channel(&self) -> Channel {
        self.active_mode()
            .map_or(Channel::Primary, Channel::Contingency)
    }

    fn active_mode(&self) -> Option<ContingencyMode> {
        let state = self.state.lock();
        state.mode.filter(|_| state.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const REASON: &str = "Servico da SEFAZ indisponivel desde as 10h";

    #[test]
    fn activate_then_deactivate() {
        let manager = ContingencyManager::new();
        assert!(!manager.is_active());
        assert_eq!(manager.channel(), Channel::Primary);

        let state = manager.activate(REASON, ContingencyMode::SvcAn).unwrap();
        assert!(state.active);
        assert!(manager.is_active());
        assert_eq!(manager.emission_type(), EmissionType::ContingencySvcAn);
        assert_eq!(manager.channel(), Channel::Contingency(ContingencyMode::SvcAn));

        let previous = manager.deactivate().unwrap();
        assert_eq!(previous.mode, Some(ContingencyMode::SvcAn));
        assert!(!manager.is_active());
        assert_eq!(manager.emission_type(), EmissionType::Normal);
    }

    #[test]
    fn double_deactivation_is_an_error() {
        let manager = ContingencyManager::new();
        assert_eq!(manager.deactivate(), Err(ContingencyError::NotActive));
        manager.activate(REASON, ContingencyMode::Epec).unwrap();
        manager.deactivate().unwrap();
        assert_eq!(manager.deactivate(), Err(ContingencyError::NotActive));
    }

    #[test]
    fn second_activation_does_not_overwrite() {
        let manager = ContingencyManager::new();
        manager.activate(REASON, ContingencyMode::SvcRs).unwrap();
        assert_eq!(
            manager.activate(REASON, ContingencyMode::SvcAn),
            Err(ContingencyError::AlreadyActive {
                mode: ContingencyMode::SvcRs
            })
        );
        assert_eq!(manager.state().mode, Some(ContingencyMode::SvcRs));
    }

    #[test]
    fn short_reason_is_rejected() {
        let manager = ContingencyManager::new();
        assert!(matches!(
            manager.activate("queda", ContingencyMode::SvcAn),
            Err(ContingencyError::InvalidReason(_))
        ));
        assert!(!manager.is_active());
    }

    #[test]
    fn racing_activations_have_one_winner() {
        let manager = ContingencyManager::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = manager.clone();
                thread::spawn(move || m.activate(REASON, ContingencyMode::SvcAn).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn state_survives_restart() {
        let manager = ContingencyManager::new();
        let at = EventTimestamp::parse("2024-10-03T10:15:00-03:00").unwrap();
        manager.activate_at(REASON, ContingencyMode::FsDa, at).unwrap();
        let json = manager.state().to_json().unwrap();

        let restored = ContingencyManager::restore(&json).unwrap();
        assert_eq!(restored.state(), manager.state());
        assert_eq!(restored.state().activated_at, Some(at));
        let inconsistent = r#"{"active":true,"mode":null,"reason":null,"activated_at":null}"#;
        assert!(ContingencyManager::restore(inconsistent).is_err());
    }

    #[test]
    fn svc_assignment() {
        assert_eq!(ContingencyMode::svc_for(Region::SaoPaulo), ContingencyMode::SvcAn);
        assert_eq!(ContingencyMode::svc_for(Region::Parana), ContingencyMode::SvcRs);
        assert_eq!(ContingencyMode::svc_for(Region::Bahia), ContingencyMode::SvcRs);
        for region in [Region::Ceara, Region::Para, Region::Piaui] {
            assert_eq!(ContingencyMode::svc_for(region), ContingencyMode::SvcRs, "{region}");
        }
        for region in [Region::RioGrandeDoSul, Region::MinasGerais, Region::Paraiba] {
            assert_eq!(ContingencyMode::svc_for(region), ContingencyMode::SvcAn, "{region}");
        }
    }
}
