//! Entity query registry.
//!
//! Maps `(entity, query)` to its definition. The map is built from the
//! configured sources on first use, exactly once, and is read-only
//! afterwards. A failed build publishes nothing. Callers that were
//! waiting on the failed attempt receive its error; the next call after
//! that rebuilds from scratch.

use crate::error::{LurryError, LurryResult};
use crate::model::{QueryDefinition, QueryKey};
use crate::source::{Decoder, DefinitionReader};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

type Entries = HashMap<QueryKey, QueryDefinition>;

/// Outcome of the most recent failed load.
#[derive(Debug, Default)]
struct LastFailure {
    /// Incremented on every failed load.
    generation: u64,
    error: Option<LurryError>,
}

pub struct Registry {
    reader: Box<dyn DefinitionReader>,
    decoder: Box<dyn Decoder>,
    entries: OnceCell<Entries>,
    failure: Mutex<LastFailure>,
}

impl Registry {
    pub fn new(reader: impl DefinitionReader + 'static, decoder: impl Decoder + 'static) -> Self {
        Self::from_boxed(Box::new(reader), Box::new(decoder))
    }

    pub fn from_boxed(reader: Box<dyn DefinitionReader>, decoder: Box<dyn Decoder>) -> Self {
        Self {
            reader,
            decoder,
            entries: OnceCell::new(),
            failure: Mutex::new(LastFailure::default()),
        }
    }

    /// Look up a definition, loading the sources on first use.
    ///
    /// Returns `Ok(None)` for an unknown pair; errors only come from the
    /// load itself.
    pub fn resolve(&self, entity: &str, query: &str) -> LurryResult<Option<&QueryDefinition>> {
        let entries = self.entries()?;
        Ok(entries.get(&QueryKey::new(entity, query)))
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> LurryResult<Vec<&QueryKey>> {
        let mut keys: Vec<_> = self.entries()?.keys().collect();
        keys.sort();
        Ok(keys)
    }

    /// Whether the sources have been loaded successfully.
    pub fn is_loaded(&self) -> bool {
        self.entries.get().is_some()
    }

    /// Number of load attempts that have failed so far.
    pub fn failed_loads(&self) -> u64 {
        self.last_failure().generation
    }

    fn entries(&self) -> LurryResult<&Entries> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }

        // Concurrent initializers block inside the cell. A caller that
        // arrived before an attempt failed shares that failure instead of
        // loading again.
        let seen = self.last_failure().generation;
        self.entries.get_or_try_init(|| {
            {
                let last = self.last_failure();
                if last.generation != seen {
                    if let Some(err) = &last.error {
                        return Err(err.clone());
                    }
                }
            }

            self.load().inspect_err(|e| {
                let mut last = self.last_failure();
                last.generation += 1;
                last.error = Some(e.clone());
            })
        })
    }

    fn last_failure(&self) -> std::sync::MutexGuard<'_, LastFailure> {
        // only plain data is guarded, so a poisoned lock is still usable
        self.failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> LurryResult<Entries> {
        tracing::debug!("Loading query definitions");
        let mut entries = Entries::new();
        let mut sources = 0usize;

        for stream in self.reader.streams() {
            let stream = stream.inspect_err(|e| tracing::error!("Definition load failed: {}", e))?;
            let name = stream.name.clone();
            tracing::debug!("Reading definitions from {}", name);

            let entities = self
                .decoder
                .decode(stream)
                .inspect_err(|e| tracing::error!("Definition load failed: {}", e))?;

            for entity in entities {
                tracing::trace!("Entity {} ({} queries)", entity.name, entity.queries.len());
                for query in entity.queries {
                    let key = QueryKey::new(entity.name.as_str(), query.name.as_str());
                    if entries.insert(key.clone(), query).is_some() {
                        tracing::debug!("{} overridden by {}", key, name);
                    }
                }
            }
            sources += 1;
        }

        tracing::debug!("Loaded {} queries from {} sources", entries.len(), sources);
        Ok(entries)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("loaded", &self.is_loaded())
            .field("failed_loads", &self.failed_loads())
            .finish()
    }
}
