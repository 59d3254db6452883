//! Sticky fault slot. Panics anywhere in the process (frame thread or image
//! workers) land here so the frame loop can report them once.

use std::fmt;
use std::panic;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::logging;

const TARGET: &str = "fault";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    /// Thread or subsystem that raised it.
    pub origin: String,
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.origin, self.message)
    }
}

fn slot() -> MutexGuard<'static, Option<Fault>> {
    static SLOT: OnceLock<Mutex<Option<Fault>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Logs the fault and keeps it until taken. A newer fault replaces an older one.
pub fn set_sticky_error(origin: impl Into<String>, message: impl Into<String>) {
    let fault = Fault {
        origin: origin.into(),
        message: message.into(),
    };
    logging::error(TARGET, fault.to_string());
    *slot() = Some(fault);
}

pub fn take_sticky_error() -> Option<Fault> {
    slot().take()
}

/// Chains onto the existing hook; installing twice is a no-op.
pub fn install_panic_hook() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    if INSTALLED.set(()).is_err() {
        return;
    }
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        let origin = thread.name().unwrap_or("unnamed thread");
        let message = match info.location() {
            Some(at) => format!(
                "panic at {}:{}: {}",
                at.file(),
                at.line(),
                panic_message(info.payload())
            ),
            None => format!("panic: {}", panic_message(info.payload())),
        };
        set_sticky_error(origin, message);
        previous(info);
    }));
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
