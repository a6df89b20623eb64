//! Fleet-wide registry of in-flight waypoint sequences
//!
//! A sequence number may be held by at most one device at a time. The
//! check-and-insert runs under a single lock so two controllers racing for
//! the same sequence cannot both win.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Outcome of [`AssignmentRegistry::try_register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    /// The same device already holds it
    AlreadyHeld,
    /// Another device holds it
    Conflict { holder: String },
}

#[derive(Debug, Default)]
pub struct AssignmentRegistry {
    in_flight: Mutex<HashMap<u64, String>>,
}

impl AssignmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_register(&self, sequence: u64, device_id: &str) -> Registration {
        let mut in_flight = self.lock();
        match in_flight.get(&sequence) {
            Some(holder) if holder == device_id => Registration::AlreadyHeld,
            Some(holder) => Registration::Conflict {
                holder: holder.clone(),
            },
            None => {
                in_flight.insert(sequence, device_id.to_string());
                Registration::Accepted
            }
        }
    }

    /// Release a sequence held by `device_id`
    ///
    /// Returns `false` (and leaves the entry alone) if the device does not
    /// hold it.
    pub fn release(&self, sequence: u64, device_id: &str) -> bool {
        let mut in_flight = self.lock();
        match in_flight.get(&sequence) {
            Some(holder) if holder == device_id => {
                in_flight.remove(&sequence);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn holder(&self, sequence: u64) -> Option<String> {
        self.lock().get(&sequence).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_register_and_release() {
        let registry = AssignmentRegistry::new();

        assert_eq!(registry.try_register(7, "d1"), Registration::Accepted);
        assert_eq!(registry.try_register(7, "d1"), Registration::AlreadyHeld);
        assert_eq!(
            registry.try_register(7, "d2"),
            Registration::Conflict {
                holder: "d1".into()
            }
        );

        // Only the holder can release
        assert!(!registry.release(7, "d2"));
        assert_eq!(registry.holder(7).as_deref(), Some("d1"));

        assert!(registry.release(7, "d1"));
        assert!(registry.is_empty());
        assert_eq!(registry.try_register(7, "d2"), Registration::Accepted);
    }

    proptest! {
        #[test]
        fn concurrent_registration_has_single_winner(
            devices in 2usize..8,
            sequences in prop::collection::vec(0u64..16, 1..32),
        ) {
            let registry = Arc::new(AssignmentRegistry::new());

            let handles: Vec<_> = (0..devices)
                .map(|d| {
                    let registry = registry.clone();
                    let sequences = sequences.clone();
                    std::thread::spawn(move || {
                        let device_id = format!("d{}", d);
                        sequences
                            .iter()
                            .filter(|seq| registry.try_register(**seq, &device_id) == Registration::Accepted)
                            .count()
                    })
                })
                .collect();

            let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

            let mut distinct = sequences.clone();
            distinct.sort_unstable();
            distinct.dedup();

            prop_assert_eq!(accepted, distinct.len());
            prop_assert_eq!(registry.len(), distinct.len());
        }
    }
}
