use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::BoxError;

/// Source of primary keys for rows inserted without one.
///
/// Implementations must return non-zero ids; a zero id is rejected by the caller.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, table: &str) -> Result<u64, BoxError>;
}

impl<F> IdGenerator for F
where
    F: Fn(&str) -> Result<u64, BoxError> + Send + Sync,
{
    fn next_id(&self, table: &str) -> Result<u64, BoxError> {
        self(table)
    }
}

/// Process-local monotonic sequence shared by every table of one middleware.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    pub const fn starting_at(first: u64) -> Self {
        Self { next: AtomicU64::new(if first == 0 { 1 } else { first }) }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequenceGenerator {
    fn next_id(&self, _table: &str) -> Result<u64, BoxError> {
        // 0 marks an exhausted sequence and is never advanced past
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                (id != 0).then(|| id.checked_add(1).unwrap_or(0))
            })
            .map_err(|_| "id sequence exhausted".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_is_monotonic_and_non_zero() {
        let generator = SequenceGenerator::new();
        assert_eq!(generator.next_id("orders").unwrap(), 1);
        assert_eq!(generator.next_id("orders").unwrap(), 2);
        assert_eq!(SequenceGenerator::starting_at(0).next_id("t").unwrap(), 1);
    }

    #[test]
    fn test_sequence_stays_exhausted() {
        let generator = SequenceGenerator::starting_at(u64::MAX);
        assert_eq!(generator.next_id("t").unwrap(), u64::MAX);
        assert!(generator.next_id("t").is_err());
        assert!(generator.next_id("t").is_err());
        assert!(generator.next_id("t").is_err());
    }

    #[test]
    fn test_sequence_unique_across_threads() {
        let generator = Arc::new(SequenceGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..250).map(|_| generator.next_id("t").unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let ids: HashSet<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_closure_generator() {
        let generator = |table: &str| -> Result<u64, BoxError> { Ok(table.len() as u64 * 100) };
        assert_eq!(generator.next_id("orders").unwrap(), 600);
    }
}
