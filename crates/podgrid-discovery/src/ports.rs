//! Host port allocation.
//!
//! One port per pod name, first writer wins. A pod keeps its port across
//! remove/apply cycles so clients keep reaching it at the same address.

use std::ops::RangeInclusive;

use podgrid_state::{KvStore, SharedStore, keys};
use rand::Rng;
use tracing::{debug, info, warn};

/// IANA dynamic/private port range.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Handed out when the store cannot record an allocation.
///
/// Every degraded allocation gets this same value, so two pods allocated
/// during an outage will collide on the host.
pub const FALLBACK_PORT: u16 = 9191;

/// Allocate (or look up) the host port for `pod_name`.
pub(crate) async fn allocate(store: &SharedStore, pod_name: &str) -> u16 {
    let key = keys::pod_port(pod_name);
    let candidate: u16 = rand::thread_rng().gen_range(EPHEMERAL_PORTS);

    match store.set_if_absent(&key, &candidate.to_string()).await {
        Ok(true) => {
            info!(pod = %pod_name, port = candidate, "port allocated");
            candidate
        }
        Ok(false) => match store.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<u16>() {
                Ok(port) => {
                    debug!(pod = %pod_name, port, "port already allocated");
                    port
                }
                Err(e) => {
                    warn!(
                        pod = %pod_name,
                        %raw,
                        error = %e,
                        fallback = FALLBACK_PORT,
                        "stored port is corrupt, degraded allocation"
                    );
                    FALLBACK_PORT
                }
            },
            Ok(None) => {
                warn!(
                    pod = %pod_name,
                    fallback = FALLBACK_PORT,
                    "port key vanished during allocation, degraded allocation"
                );
                FALLBACK_PORT
            }
            Err(e) => {
                warn!(
                    pod = %pod_name,
                    error = %e,
                    fallback = FALLBACK_PORT,
                    "port lookup failed, degraded allocation"
                );
                FALLBACK_PORT
            }
        },
        Err(e) => {
            warn!(
                pod = %pod_name,
                error = %e,
                fallback = FALLBACK_PORT,
                "port allocation failed, degraded allocation"
            );
            FALLBACK_PORT
        }
    }
}
