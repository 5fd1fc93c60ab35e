//! Thread-to-core pinning for the hot pipeline stages.
//!
//! The feed, strategy, and execution threads each run on a dedicated CPU
//! core to avoid scheduler migration and cross-core cache traffic on the
//! ring buffers. Wraps the `core_affinity` crate with a small API; on hosts
//! without the requested core the pin is skipped with a warning and the
//! stage runs unpinned.

use tracing::{info, warn};

/// Bind the current thread to the specified CPU core.
///
/// Returns `true` if the binding succeeded, `false` if the core id is
/// invalid or the OS rejected the request.
pub fn pin_to_core(core_id: usize) -> bool {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    if let Some(core) = core_ids.get(core_id) {
        let ok = core_affinity::set_for_current(*core);
        if ok {
            info!("pinned thread to CPU core {core_id}");
        } else {
            warn!("failed to pin thread to CPU core {core_id}");
        }
        ok
    } else {
        warn!(
            "CPU core {core_id} not available (system has {} cores)",
            core_ids.len()
        );
        false
    }
}

/// Pin the current thread if a core is configured; no-op for `None` or a
/// negative id.
pub fn maybe_pin(core_id: Option<i32>) {
    if let Some(id) = core_id
        && id >= 0
    {
        pin_to_core(id as usize);
    }
}
