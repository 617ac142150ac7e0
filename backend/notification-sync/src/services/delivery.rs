/// Delivery effect trigger: audible alert per newly observed notification
///
/// Novelty is decided upstream by the reconciliation store; this only applies
/// the sound preference and contains playback failures.
use crate::metrics;
use crate::models::{NotificationId, Preferences};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("playback blocked: {0}")]
    Blocked(String),

    #[error("audio device unavailable: {0}")]
    Unavailable(String),
}

/// Audio primitive
#[cfg_attr(test, mockall::automock)]
pub trait AudioAlert: Send + Sync {
    fn play(&self) -> Result<(), AlertError>;
}

/// Rings the terminal bell on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AudioAlert for TerminalBell {
    fn play(&self) -> Result<(), AlertError> {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .map_err(|e| AlertError::Unavailable(e.to_string()))
    }
}

pub struct DeliveryEffectTrigger {
    audio: Arc<dyn AudioAlert>,
    // None until the preference load resolves
    preferences: Option<Preferences>,
    pending: Vec<NotificationId>,
}

impl DeliveryEffectTrigger {
    /// Alerts observed before preferences resolve are held, not dropped.
    pub fn new(audio: Arc<dyn AudioAlert>) -> Self {
        Self {
            audio,
            preferences: None,
            pending: Vec::new(),
        }
    }

    /// Resolve preferences and flush held alerts under them.
    /// Returns the number of held alerts played.
    pub fn set_preferences(&mut self, preferences: Preferences) -> usize {
        self.preferences = Some(preferences);
        let held = std::mem::take(&mut self.pending);
        if !held.is_empty() {
            debug!("Flushing {} alert(s) held while preferences loaded", held.len());
        }
        self.on_newly_observed(&held)
    }

    pub fn alerts_enabled(&self) -> bool {
        self.preferences.map_or(false, |p| p.sound_enabled)
    }

    /// Returns the number of alerts actually played.
    pub fn on_newly_observed(&mut self, ids: &[NotificationId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let Some(preferences) = self.preferences else {
            self.pending.extend_from_slice(ids);
            return 0;
        };
        if !preferences.sound_enabled {
            debug!("Sound disabled, skipping {} alert(s)", ids.len());
            metrics::record_alerts("muted", ids.len());
            return 0;
        }

        let mut played = 0;
        for id in ids {
            match self.audio.play() {
                Ok(()) => {
                    played += 1;
                    metrics::record_alerts("played", 1);
                }
                Err(e) => {
                    warn!("Alert for notification {} failed: {}", id, e);
                    metrics::record_alerts("failed", 1);
                }
            }
        }
        played
    }
}
