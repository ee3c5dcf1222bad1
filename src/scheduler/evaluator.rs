//! Pool Candidate Evaluator (C1).
//!
//! Stateless: given a job's resource requirements and a set of
//! (pool, utilization) pairs, produce the candidates whose pools can
//! actually host the job. Utilization itself is always pulled fresh from a
//! [`super::monitor::ResourceMonitor`] collaborator — this module never
//! caches it.

use crate::model::{Job, PoolCandidate, ResourcePool, ResourceUtilization};

/// Parses a Kubernetes-style resource quantity string into bytes.
///
/// Binary suffixes (`Ki`, `Mi`, `Gi`) are powers of 1024; decimal suffixes
/// (`K`, `M`, `G`) are powers of 1000. No suffix means the value is already
/// in bytes. Anything that fails to parse returns `0` (spec.md §4.1, P7).
pub fn parse_memory(raw: &str) -> u64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    const BINARY_SUFFIXES: &[(&str, u64)] = &[
        ("Ki", 1024),
        ("Mi", 1024 * 1024),
        ("Gi", 1024 * 1024 * 1024),
    ];
    const DECIMAL_SUFFIXES: &[(&str, u64)] = &[("K", 1_000), ("M", 1_000_000), ("G", 1_000_000_000)];

    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_f64_as_bytes(number, *multiplier);
        }
    }
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return parse_f64_as_bytes(number, *multiplier);
        }
    }

    raw.parse::<u64>().unwrap_or(0)
}

fn parse_f64_as_bytes(number: &str, multiplier: u64) -> u64 {
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier as f64) as u64,
        _ => 0,
    }
}

/// Parses a CPU quantity string (plain decimal cores, e.g. `"1"`, `"0.5"`).
/// Parse failures are treated as `0.0`, mirroring `parse_memory`'s failure
/// behavior.
pub fn parse_cpu(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Capacity predicate: can `pool`, at `utilization`, host a job that needs
/// `requested_cpu` cores and `requested_memory_bytes` bytes?
fn fits(pool: &ResourcePool, utilization: &ResourceUtilization, requested_cpu: f64, requested_memory_bytes: u64) -> bool {
    if requested_cpu > utilization.available_cpu() {
        return false;
    }
    if requested_memory_bytes > utilization.available_memory_bytes() {
        return false;
    }
    if let Some(max_jobs) = pool.max_concurrent_jobs {
        if utilization.running_jobs >= max_jobs {
            return false;
        }
    }
    true
}

/// Produces the list of [`PoolCandidate`]s that can host `job`, given the
/// pools and their current utilization snapshots.
///
/// Pools without a corresponding utilization snapshot are skipped — the
/// evaluator never fabricates a reading.
pub fn candidates_for(
    job: &Job,
    pools: &[ResourcePool],
    utilizations: &[ResourceUtilization],
) -> Vec<PoolCandidate> {
    let requested_cpu = job
        .resource_requirements
        .get("cpu")
        .map(|s| parse_cpu(s))
        .unwrap_or(0.0);
    let requested_memory = job
        .resource_requirements
        .get("memory")
        .map(|s| parse_memory(s))
        .unwrap_or(0);

    pools
        .iter()
        .filter_map(|pool| {
            let utilization = utilizations.iter().find(|u| u.pool_id == pool.id)?;
            if fits(pool, utilization, requested_cpu, requested_memory) {
                Some(PoolCandidate::new(pool.clone(), utilization.clone()))
            } else {
                None
            }
        })
        .collect()
}
