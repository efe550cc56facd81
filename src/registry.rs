//! Schema processor registry
//!
//! Process-wide cache of compiled schemas keyed by schema key. Entries are
//! built lazily on first request, shared by every later request, and evicted
//! when a change notification arrives for their key.
//!
//! ## Entry states
//!
//! ```text
//! absent ──(first request)──▶ building ──(compiled)──▶ ready
//!    ▲                            │                      │
//!    └──────(build failed)────────┘                      │
//!    └───────────────(change notification)───────────────┘
//! ```
//!
//! Only one build runs per key. Concurrent requests for a key that is being
//! built wait for that build and receive its result. Callers that already
//! hold a compiled schema keep using it after an eviction.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::changes::{SchemaChange, SchemaChangeListener};
use crate::compiled::CompiledSchema;
use crate::compiler::RuleCompiler;
use crate::config::EngineConfig;
use crate::error::{Result, SchemaError};
use crate::schema::{SchemaDefinition, SchemaKey};

/// One cache entry; `ready` is set exactly once, by the build holding `build`
struct Slot {
    generation: u64,
    ready: OnceLock<Arc<CompiledSchema>>,
    build: Mutex<()>,
}

impl Slot {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            ready: OnceLock::new(),
            build: Mutex::new(()),
        }
    }
}

/// Counters exposed by `SchemaProcessorRegistry::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries with a ready compiled schema
    pub cached: usize,
    pub builds: u64,
    pub hits: u64,
    pub evictions: u64,
    pub failed_builds: u64,
}

/// Result of a batch pre-build
#[derive(Debug, Default)]
pub struct PrewarmReport {
    pub compiled: Vec<SchemaKey>,
    pub failed: Vec<(SchemaKey, SchemaError)>,
}

impl PrewarmReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Holds one schema key's exclusive-use lock until dropped
pub struct ExclusiveGuard {
    key: SchemaKey,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl ExclusiveGuard {
    pub fn key(&self) -> &SchemaKey {
        &self.key
    }
}

impl std::fmt::Debug for ExclusiveGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveGuard").field("key", &self.key).finish()
    }
}

/// Lazily built, change-invalidated cache of compiled schemas
pub struct SchemaProcessorRegistry {
    compiler: RuleCompiler,
    entries: RwLock<HashMap<SchemaKey, Arc<Slot>>>,
    aliases: RwLock<HashMap<String, SchemaKey>>,
    guards: Mutex<HashMap<SchemaKey, Arc<Mutex<()>>>>,
    generation: AtomicU64,
    builds: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
    failed_builds: AtomicU64,
}

impl Default for SchemaProcessorRegistry {
    fn default() -> Self {
        Self::new(RuleCompiler::default())
    }
}

impl SchemaProcessorRegistry {
    pub fn new(compiler: RuleCompiler) -> Self {
        Self {
            compiler,
            entries: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            failed_builds: AtomicU64::new(0),
        }
    }

    /// Registry using the compiler settings from `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(RuleCompiler::from_settings(&config.compiler)?))
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    fn slot_for(&self, key: &SchemaKey) -> Arc<Slot> {
        if let Some(slot) = self.entries.read().get(key) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write();
        let slot = entries.entry(key.clone()).or_insert_with(|| {
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            Arc::new(Slot::new(generation))
        });
        Arc::clone(slot)
    }

    fn serve(&self, definition: &SchemaDefinition, compiled: &Arc<CompiledSchema>) -> Arc<CompiledSchema> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let fingerprint = definition.fingerprint();
        if fingerprint != compiled.info().fingerprint {
            warn!(
                schema = %compiled.key(),
                cached = compiled.info().fingerprint.short(),
                requested = fingerprint.short(),
                "Definition differs from the cached compiled schema; serving cached entry until a change notification arrives"
            );
        }
        Arc::clone(compiled)
    }

    /// Whether `slot` is still the entry for `key`
    fn is_current(&self, key: &SchemaKey, slot: &Arc<Slot>) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Remove a slot whose build failed, so a retry starts a new generation
    fn discard(&self, key: &SchemaKey, slot: &Arc<Slot>) {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            entries.remove(key);
        }
        drop(entries);
        self.compiler.binder().invalidate(key);
    }

    /// Compiled schema for a definition, building it on first use
    pub fn processor(&self, definition: &SchemaDefinition) -> Result<Arc<CompiledSchema>> {
        let key = definition.key();

        loop {
            let slot = self.slot_for(&key);

            if let Some(compiled) = slot.ready.get() {
                debug!(schema = %key, "Compiled schema cache hit");
                return Ok(self.serve(definition, compiled));
            }

            let _building = slot.build.lock();
            if let Some(compiled) = slot.ready.get() {
                return Ok(self.serve(definition, compiled));
            }
            // Evicted or discarded while this caller waited
            if !self.is_current(&key, &slot) {
                continue;
            }

            let compiled = match self.compiler.compile(definition, slot.generation) {
                Ok(compiled) => Arc::new(compiled),
                Err(e) => {
                    self.failed_builds.fetch_add(1, Ordering::Relaxed);
                    self.discard(&key, &slot);
                    warn!(schema = %key, error = %e, "Schema build failed");
                    return Err(e);
                }
            };

            // The build lock is held, so nothing else can have set it
            let _ = slot.ready.set(Arc::clone(&compiled));
            self.builds.fetch_add(1, Ordering::Relaxed);

            if let Some(alias) = &definition.alias {
                self.aliases.write().insert(alias.clone(), key.clone());
            }

            info!(schema = %key, generation = slot.generation, "Schema processor built");
            return Ok(compiled);
        }
    }

    /// Ready compiled schema for a key, without building
    pub fn cached(&self, key: &SchemaKey) -> Option<Arc<CompiledSchema>> {
        self.entries
            .read()
            .get(key)
            .and_then(|slot| slot.ready.get().cloned())
    }

    /// Ready compiled schema by its alternate name
    pub fn by_alias(&self, alias: &str) -> Option<Arc<CompiledSchema>> {
        let key = self.aliases.read().get(alias).cloned()?;
        self.cached(&key)
    }

    /// Drop the entry for a key; the next request rebuilds it
    pub fn evict(&self, key: &SchemaKey) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        self.aliases.write().retain(|_, target| target != key);
        self.compiler.binder().invalidate(key);

        let mut guards = self.guards.lock();
        if guards.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            guards.remove(key);
        }
        drop(guards);

        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            info!(schema = %key, "Schema processor evicted");
        }
        removed
    }

    /// Build a batch of definitions, collecting failures instead of stopping
    pub fn prewarm<'a, I>(&self, definitions: I) -> PrewarmReport
    where
        I: IntoIterator<Item = &'a SchemaDefinition>,
    {
        let mut report = PrewarmReport::default();
        for definition in definitions {
            match self.processor(definition) {
                Ok(compiled) => report.compiled.push(compiled.key().clone()),
                Err(e) => report.failed.push((definition.key(), e)),
            }
        }
        info!(
            compiled = report.compiled.len(),
            failed = report.failed.len(),
            "Prewarm finished"
        );
        report
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            cached: self
                .entries
                .read()
                .values()
                .filter(|slot| slot.ready.get().is_some())
                .count(),
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            failed_builds: self.failed_builds.load(Ordering::Relaxed),
        }
    }

    /// Keys with a ready compiled schema, sorted
    pub fn keys(&self) -> Vec<SchemaKey> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, slot)| slot.ready.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.stats().cached
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn guard_lock(&self, key: &SchemaKey) -> Arc<Mutex<()>> {
        Arc::clone(self.guards.lock().entry(key.clone()).or_default())
    }

    /// Block until this caller has exclusive use of a schema key.
    ///
    /// Released when the guard drops, including during unwinding. Acquiring
    /// the same key twice on one thread deadlocks.
    pub fn exclusive(&self, key: &SchemaKey) -> ExclusiveGuard {
        ExclusiveGuard {
            key: key.clone(),
            _guard: self.guard_lock(key).lock_arc(),
        }
    }

    /// Non-blocking `exclusive`
    pub fn try_exclusive(&self, key: &SchemaKey) -> Option<ExclusiveGuard> {
        let guard = self.guard_lock(key).try_lock_arc()?;
        Some(ExclusiveGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Run `f` while holding exclusive use of `key`
    pub fn run_exclusive<T>(&self, key: &SchemaKey, f: impl FnOnce() -> T) -> T {
        let _guard = self.exclusive(key);
        f()
    }
}

impl SchemaChangeListener for SchemaProcessorRegistry {
    fn schema_changed(&self, change: &SchemaChange) {
        debug!(schema = %change.key, kind = ?change.kind, "Schema change received");
        self.evict(&change.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::SchemaChangeBus;
    use crate::schema::{FieldDefinition, ValidationRule};
    use crate::value::FieldValue;
    use crate::version::TypeVersion;
    use std::thread;

    fn person() -> SchemaDefinition {
        SchemaDefinition::new("Person", TypeVersion::new(1, 0, 0))
            .with_alias("person")
            .with_field(FieldDefinition::new("txtProp", "string"))
            .with_rule(ValidationRule::new("R1", "text required", "{ size(d.txtProp) > 0 }"))
    }

    #[test]
    fn test_repeated_requests_share_one_instance() {
        let registry = SchemaProcessorRegistry::default();
        let first = registry.processor(&person()).unwrap();
        let second = registry.processor(&person()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = registry.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_concurrent_first_requests_build_once() {
        let registry = SchemaProcessorRegistry::default();
        let definition = person();

        let results: Vec<Arc<CompiledSchema>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.processor(&definition).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.stats().builds, 1);
    }

    #[test]
    fn test_eviction_forces_rebuild() {
        let registry = SchemaProcessorRegistry::default();
        let before = registry.processor(&person()).unwrap();

        assert!(registry.evict(&person().key()));
        assert!(registry.cached(&person().key()).is_none());

        let after = registry.processor(&person()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_ne!(before.value_type().name(), after.value_type().name());
        assert!(after.info().generation > before.info().generation);
        // old holders keep a working snapshot
        assert!(before.validate(&before.new_body(), &Default::default()).is_ok());
    }

    #[test]
    fn test_change_bus_evicts() {
        let registry = Arc::new(SchemaProcessorRegistry::default());
        let bus = SchemaChangeBus::new();
        bus.subscribe(&registry);

        let before = registry.processor(&person()).unwrap();
        assert_eq!(bus.deleted(person().key()), 1);
        assert_eq!(registry.stats().evictions, 1);

        let after = registry.processor(&person()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_failed_builds_are_not_cached() {
        let registry = SchemaProcessorRegistry::default();
        let broken = person().with_rule(ValidationRule::new("R2", "", "no braces"));

        assert!(registry.processor(&broken).is_err());
        assert!(registry.processor(&broken).is_err());
        let stats = registry.stats();
        assert_eq!(stats.failed_builds, 2);
        assert_eq!(stats.cached, 0);
    }

    #[test]
    fn test_corrected_definition_builds_after_failure() {
        let registry = SchemaProcessorRegistry::default();
        let broken = SchemaDefinition::new("Doc", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("a", "string"))
            .with_rule(ValidationRule::new("R1", "", "no braces"));
        assert!(registry.processor(&broken).is_err());

        let fixed = SchemaDefinition::new("Doc", TypeVersion::new(1, 0, 0))
            .with_field(FieldDefinition::new("a", "string"))
            .with_field(FieldDefinition::new("b", "string").with_formula("d.a + '!'"))
            .with_rule(ValidationRule::new("R1", "", "{ true }"));
        let compiled = registry.processor(&fixed).unwrap();

        assert!(compiled.value_type().member("b").is_some());
        assert_eq!(compiled.info().formula_count, 1);
        assert_eq!(compiled.info().fingerprint, fixed.fingerprint());

        let mut body = compiled.new_body();
        body.set("a", "hi").unwrap();
        compiled.compute_fields(&mut body, &Default::default()).unwrap();
        assert_eq!(body.get("b"), Some(&FieldValue::Text("hi!".into())));
    }

    #[test]
    fn test_eviction_drops_idle_guards() {
        let registry = SchemaProcessorRegistry::default();
        let key = person().key();

        let held = registry.exclusive(&key);
        registry.evict(&key);
        assert_eq!(registry.guards.lock().len(), 1);

        drop(held);
        registry.evict(&key);
        assert!(registry.guards.lock().is_empty());
    }

    #[test]
    fn test_alias_lookup() {
        let registry = SchemaProcessorRegistry::default();
        assert!(registry.by_alias("person").is_none());
        let compiled = registry.processor(&person()).unwrap();
        assert!(Arc::ptr_eq(&registry.by_alias("person").unwrap(), &compiled));

        registry.evict(&person().key());
        assert!(registry.by_alias("person").is_none());
    }

    #[test]
    fn test_changed_definition_serves_cached_entry() {
        let registry = SchemaProcessorRegistry::default();
        let original = registry.processor(&person()).unwrap();

        let edited = person().with_rule(ValidationRule::new("R2", "", "{ true }"));
        let served = registry.processor(&edited).unwrap();
        assert!(Arc::ptr_eq(&original, &served));
        assert_eq!(served.info().rule_count, 1);
    }

    #[test]
    fn test_prewarm_reports_failures() {
        let registry = SchemaProcessorRegistry::default();
        let empty = SchemaDefinition::new("Empty", TypeVersion::new(1, 0, 0));
        let report = registry.prewarm([&person(), &empty]);

        assert_eq!(report.compiled, vec![person().key()]);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_clean());
        assert_eq!(registry.keys(), vec![person().key()]);
    }

    #[test]
    fn test_exclusive_guard_is_released_on_every_path() {
        let registry = SchemaProcessorRegistry::default();
        let key = person().key();

        let guard = registry.exclusive(&key);
        assert!(registry.try_exclusive(&key).is_none());
        drop(guard);

        let result: std::result::Result<(), &str> = registry.run_exclusive(&key, || Err("failed"));
        assert!(result.is_err());
        assert!(registry.try_exclusive(&key).is_some());

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.run_exclusive(&key, || panic!("boom"))
        }));
        assert!(panicked.is_err());
        assert!(registry.try_exclusive(&key).is_some());
    }
}
