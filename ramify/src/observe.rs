//! The process-wide logging registry.
//!
//! Installing a typed action under the name `"ramify"` makes every
//! subsequent job log its lifecycle through it:
//!
//! ```
//! use ramify_communication::HubEvent;
//!
//! ramify::observe::with_registry(|registry| {
//!     registry.insert::<HubEvent>("ramify".to_owned(), |batch| {
//!         for (elapsed, event) in batch {
//!             eprintln!("{elapsed:?} {event:?}");
//!         }
//!     });
//! });
//! ```

use std::sync::{Mutex, OnceLock};

use ramify_communication::HubEvent;
use ramify_logging::{Logger, Registry};

/// The name under which jobs look for their lifecycle logger.
const JOB_LOG: &str = "ramify";

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

/// Grants access to the process-wide logging registry.
pub fn with_registry<R>(action: impl FnOnce(&mut Registry) -> R) -> R {
    let registry = REGISTRY.get_or_init(|| Mutex::new(Registry::new()));
    action(&mut registry.lock().expect("logging registry poisoned"))
}

/// The job lifecycle logger, if one is installed.
pub(crate) fn hub_logger() -> Option<Logger<HubEvent>> {
    REGISTRY
        .get()
        .and_then(|registry| registry.lock().ok())
        .and_then(|registry| registry.get::<HubEvent>(JOB_LOG))
}
