use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::config::settings::DEFAULT_NAME_LENGTH;
use crate::error::NameExhaustedError;

pub const DEFAULT_NAMESPACE: &str = "";
pub const DEFAULT_MAX_ROUNDS: u64 = 99_999_999;

/// Hands out random alphanumeric names that are unique within a namespace
/// until released.
#[derive(Debug)]
pub struct NameRegistry {
    name_length: usize,
    max_rounds: u64,
    records: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for NameRegistry {
    fn default() -> Self {
        NameRegistry::new(DEFAULT_NAME_LENGTH)
    }
}

impl NameRegistry {
    pub fn new(name_length: usize) -> Self {
        NameRegistry {
            name_length: name_length.max(1),
            max_rounds: DEFAULT_MAX_ROUNDS,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Caps how many candidates are drawn before giving up.
    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn name_length(&self) -> usize {
        self.name_length
    }

    /// Returns a fresh name, prefixed with `namespace.` unless the namespace
    /// is empty.
    pub fn unique_name(&self, namespace: &str) -> Result<String, NameExhaustedError> {
        let mut records = self.lock();
        let taken = records.entry(namespace.to_string()).or_default();
        let mut rng = rand::thread_rng();

        for _ in 0..self.max_rounds {
            let candidate: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(self.name_length)
                .map(char::from)
                .collect();
            if taken.insert(candidate.clone()) {
                debug!(namespace, name = %candidate, "allocated name");
                return Ok(qualify(namespace, &candidate));
            }
        }

        Err(NameExhaustedError {
            namespace: namespace.to_string(),
            rounds: self.max_rounds,
        })
    }

    /// Makes a name returned by [`NameRegistry::unique_name`] available again.
    /// Accepts either the qualified or the bare name.
    pub fn release(&self, namespace: &str, name: &str) -> bool {
        let bare = unqualify(namespace, name);
        let mut records = self.lock();
        match records.get_mut(namespace) {
            Some(taken) => taken.remove(bare),
            None => false,
        }
    }

    pub fn is_taken(&self, namespace: &str, name: &str) -> bool {
        let bare = unqualify(namespace, name);
        self.lock()
            .get(namespace)
            .map_or(false, |taken| taken.contains(bare))
    }

    /// Number of names currently held in `namespace`.
    pub fn count(&self, namespace: &str) -> usize {
        self.lock().get(namespace).map_or(0, HashSet::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

fn unqualify<'a>(namespace: &str, name: &'a str) -> &'a str {
    if namespace == DEFAULT_NAMESPACE {
        return name;
    }
    name.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name)
}
