//! Deterministic work partitioning across independent workers.
//!
//! Workers share no state and take no locks. Each fetches the same
//! globally visible image list, sorts it identically, and keeps every
//! `worker_count`-th entry starting at its own index. That listing order
//! being identical everywhere is the partition's only correctness
//! requirement; see [`crate::store::BlobStore::list`].

use crate::error::{ChipError, ChipResult};

/// Check worker parameters once at startup.
pub fn validate_shard(worker_index: usize, worker_count: usize) -> ChipResult<()> {
    if worker_count == 0 {
        return Err(ChipError::InvalidConfiguration(
            "worker count must be positive".into(),
        ));
    }
    if worker_index >= worker_count {
        return Err(ChipError::InvalidConfiguration(format!(
            "worker index {worker_index} out of range for {worker_count} workers"
        )));
    }
    Ok(())
}

/// True when item `index` of the globally ordered list belongs to this worker.
#[inline]
pub fn assigned_to_worker(index: usize, worker_index: usize, worker_count: usize) -> bool {
    index % worker_count == worker_index
}

/// The subset of `items` owned by one worker, in global order.
pub fn shard<T>(items: &[T], worker_index: usize, worker_count: usize) -> Vec<&T> {
    items
        .iter()
        .enumerate()
        .filter(|(index, _)| assigned_to_worker(*index, worker_index, worker_count))
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_complete_and_disjoint() {
        let items: Vec<usize> = (0..97).collect();

        for worker_count in 1..=6 {
            let mut seen = vec![0usize; items.len()];
            for worker_index in 0..worker_count {
                for item in shard(&items, worker_index, worker_count) {
                    seen[*item] += 1;
                }
            }
            assert!(
                seen.iter().all(|&n| n == 1),
                "each item must be owned by exactly one of {worker_count} workers"
            );
        }
    }

    #[test]
    fn shard_preserves_global_order() {
        let items: Vec<usize> = (0..20).collect();
        let owned = shard(&items, 1, 3);
        assert_eq!(owned, vec![&1, &4, &7, &10, &13, &16, &19]);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(validate_shard(0, 0).is_err());
        assert!(validate_shard(3, 3).is_err());
        assert!(validate_shard(2, 3).is_ok());
    }
}
