//! Shared control state
//!
//! The coordinator is the only writer of the control targets; the attitude
//! loop reads a snapshot once per iteration. Everything goes through one
//! mutex, so the sub-mode and both setpoints always change together.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, info};

/// Observable operating mode of the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// No acquisition loops running
    Idle,
    /// Running, PID-driven tracking of the slider targets
    ManualAngle,
    /// Running, direct table lookup on the measured attitude
    AutoLevel,
}

/// Actuation policy selected by the operator
///
/// Kept across `stop`/`start`; it only takes effect while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMode {
    ManualAngle,
    AutoLevel,
}

impl SubMode {
    /// Mode reported while the acquisition loops are running
    pub fn running_mode(self) -> ControlMode {
        match self {
            SubMode::ManualAngle => ControlMode::ManualAngle,
            SubMode::AutoLevel => ControlMode::AutoLevel,
        }
    }
}

/// Setpoints and slider targets for both axes [deg]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlTargets {
    pub sub_mode: SubMode,
    pub pitch_setpoint: f64,
    pub roll_setpoint: f64,
    pub pitch_slider: f64,
    pub roll_slider: f64,
    /// Incremented whenever ManualAngle is entered from AutoLevel; the
    /// attitude loop resets its PID state when this changes
    pub manual_entries: u64,
}

impl Default for ControlTargets {
    fn default() -> Self {
        Self {
            sub_mode: SubMode::AutoLevel,
            pitch_setpoint: 0.0,
            roll_setpoint: 0.0,
            pitch_slider: 0.0,
            roll_slider: 0.0,
            manual_entries: 0,
        }
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Like [`lock`], but `None` if another holder has the mutex
pub fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Control targets shared between the coordinator and the attitude loop
#[derive(Debug, Default)]
pub struct SharedTargets {
    inner: Mutex<ControlTargets>,
}

impl SharedTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current targets
    pub fn snapshot(&self) -> ControlTargets {
        *lock(&self.inner)
    }

    /// Switch to AutoLevel and zero both setpoints
    pub fn enter_autolevel(&self) {
        let mut targets = lock(&self.inner);
        targets.sub_mode = SubMode::AutoLevel;
        targets.pitch_setpoint = 0.0;
        targets.roll_setpoint = 0.0;
        info!("Sub-mode: AutoLevel (setpoints reset to zero)");
    }

    /// Switch to ManualAngle with the setpoints taken from the last slider
    /// targets
    pub fn enter_manual(&self) {
        let mut targets = lock(&self.inner);
        if targets.sub_mode != SubMode::ManualAngle {
            targets.manual_entries += 1;
        }
        targets.sub_mode = SubMode::ManualAngle;
        targets.pitch_setpoint = targets.pitch_slider;
        targets.roll_setpoint = targets.roll_slider;
        info!(
            "Sub-mode: ManualAngle (pitch={}°, roll={}°)",
            targets.pitch_setpoint, targets.roll_setpoint
        );
    }

    /// Store new slider targets; the setpoints follow only in ManualAngle
    pub fn update_sliders(&self, pitch: f64, roll: f64) {
        let mut targets = lock(&self.inner);
        targets.pitch_slider = pitch;
        targets.roll_slider = roll;
        if targets.sub_mode == SubMode::ManualAngle {
            targets.pitch_setpoint = pitch;
            targets.roll_setpoint = roll;
        }
        debug!("Slider targets: pitch={}°, roll={}°", pitch, roll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_autolevel() {
        let targets = SharedTargets::new().snapshot();
        assert_eq!(targets.sub_mode, SubMode::AutoLevel);
        assert_eq!(targets.manual_entries, 0);
    }

    #[test]
    fn test_sliders_only_drive_setpoints_in_manual() {
        let shared = SharedTargets::new();
        shared.update_sliders(4.0, -2.0);
        let targets = shared.snapshot();
        assert_eq!((targets.pitch_setpoint, targets.roll_setpoint), (0.0, 0.0));
        assert_eq!((targets.pitch_slider, targets.roll_slider), (4.0, -2.0));

        shared.enter_manual();
        shared.update_sliders(6.0, 1.0);
        let targets = shared.snapshot();
        assert_eq!((targets.pitch_setpoint, targets.roll_setpoint), (6.0, 1.0));
    }

    #[test]
    fn test_autolevel_resets_setpoints_every_entry() {
        let shared = SharedTargets::new();
        shared.update_sliders(10.0, 5.0);

        shared.enter_autolevel();
        assert_eq!(shared.snapshot().pitch_setpoint, 0.0);

        shared.enter_manual();
        assert_eq!(shared.snapshot().pitch_setpoint, 10.0);
        assert_eq!(shared.snapshot().roll_setpoint, 5.0);

        shared.enter_autolevel();
        let targets = shared.snapshot();
        assert_eq!(targets.sub_mode, SubMode::AutoLevel);
        assert_eq!((targets.pitch_setpoint, targets.roll_setpoint), (0.0, 0.0));
        // slider targets survive so the next `angle` can restore them
        assert_eq!((targets.pitch_slider, targets.roll_slider), (10.0, 5.0));
    }

    #[test]
    fn test_manual_entry_counted_only_from_autolevel() {
        let shared = SharedTargets::new();
        shared.enter_manual();
        shared.enter_manual();
        assert_eq!(shared.snapshot().manual_entries, 1);
        shared.enter_autolevel();
        shared.enter_manual();
        assert_eq!(shared.snapshot().manual_entries, 2);
    }

    #[test]
    fn test_try_lock_reports_busy_mutex() {
        let mutex = Mutex::new(1);
        let guard = lock(&mutex);
        assert!(try_lock(&mutex).is_none());
        drop(guard);
        assert_eq!(try_lock(&mutex).map(|value| *value), Some(1));
    }
}
