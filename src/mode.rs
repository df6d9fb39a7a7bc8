//! Operating mode and its observers.
//!
//! The mode is changed only by external input events. Every change is pushed
//! synchronously to the registered observers, in registration order, on the
//! thread that delivered the event.

use crate::{Error, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What the head is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Nothing is shown and nothing is tracked
    #[default]
    Stopped,
    /// Frames are shown, detection is off
    DisplayOnly,
    /// Frames are shown and faces are tracked
    TrackingActive,
}

impl OperatingMode {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::DisplayOnly => 1,
            Self::TrackingActive => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::DisplayOnly,
            2 => Self::TrackingActive,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::DisplayOnly => "display",
            Self::TrackingActive => "tracking",
        };
        f.write_str(name)
    }
}

impl FromStr for OperatingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stop" | "stopped" | "off" | "0" => Ok(Self::Stopped),
            "display" | "display_only" | "displayonly" | "1" => Ok(Self::DisplayOnly),
            "track" | "tracking" | "tracking_active" | "trackingactive" | "2" => Ok(Self::TrackingActive),
            other => Err(Error::InvalidInput(format!("Unknown operating mode: {other}"))),
        }
    }
}

type Callback = Box<dyn Fn(OperatingMode) + Send + Sync>;

struct Observer {
    tag: String,
    callback: Callback,
}

/// Holder of the current mode and the list of observers
///
/// Callbacks run while the observer list is locked: they must only flip
/// local flags and must not call back into the controller.
pub struct ModeController {
    mode: AtomicU8,
    observers: Mutex<Vec<Observer>>,
}

impl ModeController {
    #[must_use]
    pub fn new(initial: OperatingMode) -> Self {
        Self {
            mode: AtomicU8::new(initial.as_u8()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Register an observer at the end of the notification order
    pub fn attach<F>(&self, tag: impl Into<String>, callback: F)
    where
        F: Fn(OperatingMode) + Send + Sync + 'static,
    {
        let tag = tag.into();
        debug!("Attaching mode observer '{tag}'");
        self.lock_observers().push(Observer {
            tag,
            callback: Box::new(callback),
        });
    }

    /// Remove every observer registered under `tag`
    pub fn detach(&self, tag: &str) -> bool {
        let mut observers = self.lock_observers();
        let before = observers.len();
        observers.retain(|o| o.tag != tag);
        before != observers.len()
    }

    pub fn detach_all(&self) {
        self.lock_observers().clear();
    }

    /// Tags of the registered observers in notification order
    #[must_use]
    pub fn observer_tags(&self) -> Vec<String> {
        self.lock_observers().iter().map(|o| o.tag.clone()).collect()
    }

    /// Apply a mode change event and notify every observer once
    ///
    /// Every event notifies, including one that repeats the current mode, so
    /// observers can reset per-activation state.
    ///
    /// The observer lock is held across the store and the notifications, so
    /// concurrent events reach observers in the order they were applied.
    pub fn set_mode(&self, mode: OperatingMode) {
        let observers = self.lock_observers();
        let previous = OperatingMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::AcqRel));
        info!("Mode {previous} -> {mode}");

        for observer in observers.iter() {
            (observer.callback)(mode);
        }
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(OperatingMode::default())
    }
}

/// Stage-local on/off flag kept in sync with the mode controller
#[derive(Debug, Clone)]
pub struct ModeSwitch {
    on: Arc<AtomicBool>,
}

impl ModeSwitch {
    /// Register a flag that is on whenever `active(mode)` holds
    pub fn attach(controller: &ModeController, tag: &str, active: fn(OperatingMode) -> bool) -> Self {
        let on = Arc::new(AtomicBool::new(active(controller.mode())));
        let flag = Arc::clone(&on);
        let name = tag.to_string();
        controller.attach(tag, move |mode| {
            let value = active(mode);
            flag.store(value, Ordering::Release);
            debug!("{name}: {}", if value { "ON" } else { "OFF" });
        });
        Self { on }
    }

    /// A switch not connected to any controller
    #[must_use]
    pub fn fixed(on: bool) -> Self {
        Self {
            on: Arc::new(AtomicBool::new(on)),
        }
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    pub fn set(&self, on: bool) {
        self.on.store(on, Ordering::Release);
    }
}

/// Tracking runs only in [`OperatingMode::TrackingActive`]
#[must_use]
pub fn tracking_enabled(mode: OperatingMode) -> bool {
    mode == OperatingMode::TrackingActive
}

/// Frames are shown in every mode except [`OperatingMode::Stopped`]
#[must_use]
pub fn display_enabled(mode: OperatingMode) -> bool {
    mode != OperatingMode::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("track".parse::<OperatingMode>().unwrap(), OperatingMode::TrackingActive);
        assert_eq!("Display".parse::<OperatingMode>().unwrap(), OperatingMode::DisplayOnly);
        assert_eq!("0".parse::<OperatingMode>().unwrap(), OperatingMode::Stopped);
        assert!("fly".parse::<OperatingMode>().is_err());
    }

    #[test]
    fn test_switch_follows_mode() {
        let controller = ModeController::new(OperatingMode::Stopped);
        let tracking = ModeSwitch::attach(&controller, "tracking", tracking_enabled);
        let display = ModeSwitch::attach(&controller, "display", display_enabled);
        assert!(!tracking.is_on());
        assert!(!display.is_on());

        controller.set_mode(OperatingMode::DisplayOnly);
        assert!(!tracking.is_on());
        assert!(display.is_on());

        controller.set_mode(OperatingMode::TrackingActive);
        assert!(tracking.is_on());
        assert!(display.is_on());

        // Fully connected: straight back to stopped
        controller.set_mode(OperatingMode::Stopped);
        assert!(!tracking.is_on());
        assert!(!display.is_on());
    }

    #[test]
    fn test_detach() {
        let controller = ModeController::default();
        controller.attach("a", |_| {});
        controller.attach("b", |_| {});
        assert!(controller.detach("a"));
        assert!(!controller.detach("a"));
        assert_eq!(controller.observer_tags(), vec!["b".to_string()]);
        controller.detach_all();
        assert!(controller.observer_tags().is_empty());
    }
}
