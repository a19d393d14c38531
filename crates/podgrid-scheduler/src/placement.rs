//! Placement policy.
//!
//! A pod goes to the lexicographically smallest registered host. The
//! choice depends only on the membership snapshot, so two controllers
//! looking at the same fleet always agree. Resource-aware scheduling is
//! out of scope; the pod argument is there so a smarter policy can slot in
//! without changing callers.

use podgrid_state::PodSpec;

/// Pick a host for `pod` from `hosts`, falling back to `default_host`
/// when the snapshot is empty.
pub fn pick<'a>(_pod: &PodSpec, hosts: &'a [String], default_host: &'a str) -> &'a str {
    hosts
        .iter()
        .map(String::as_str)
        .min()
        .unwrap_or(default_host)
}
