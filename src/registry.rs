//! Lazy component registry
//!
//! Maps `(capability, name)` to a deferred factory ([`LazyInit`]). Nothing is
//! constructed at registration; the first `resolve` runs the factory with its
//! bound parameters and caches the instance for the rest of the registry's
//! lifetime.
//!
//! ## Single construction
//!
//! Each entry owns a mutex around its instance slot. `resolve` clones the entry
//! out of the `DashMap` (so no shard lock is held while a model loads) and then
//! constructs under the entry's own mutex: concurrent callers for one name wait
//! for the first construction, callers for other names proceed in parallel.
//! A failed construction is not cached.
//!
//! ## Overrides
//!
//! Registering an existing name replaces the entry with a `warn!`. Instances
//! already handed out keep living in the trials that hold them; only later
//! resolutions see the new factory.

use crate::component::{
    Capability, Component, ComponentResult, EmbeddingModel, Generator, ModuleContract, Params,
    Splitter, StageModule,
};
use crate::{Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Factory = Box<dyn Fn(&Params) -> ComponentResult<Component> + Send + Sync>;

/// Deferred constructor with bound parameters.
///
/// # Example
///
/// ```rust
/// use trueno_eval::component::Splitter;
/// use trueno_eval::registry::{LazyInit, ModuleRegistry};
///
/// struct Sentences;
/// impl Splitter for Sentences {
///     fn split(&self, text: &str) -> Vec<String> {
///         text.split('.').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
///     }
/// }
///
/// let registry = ModuleRegistry::new();
/// registry.register("custom_splitter", LazyInit::splitter(|_| Ok(Sentences)));
/// let splitter = registry.resolve_splitter("custom_splitter")?;
/// assert_eq!(splitter.split("a. b."), vec!["a", "b"]);
/// # Ok::<(), trueno_eval::Error>(())
/// ```
pub struct LazyInit {
    capability: Capability,
    params: Params,
    contract: Option<ModuleContract>,
    factory: Factory,
}

impl LazyInit {
    /// Deferred splitter.
    pub fn splitter<S, F>(factory: F) -> Self
    where
        S: Splitter + 'static,
        F: Fn(&Params) -> ComponentResult<S> + Send + Sync + 'static,
    {
        Self::with_factory(
            Capability::Splitter,
            None,
            Box::new(move |params| factory(params).map(|s| Component::Splitter(Arc::new(s)))),
        )
    }

    /// Deferred embedding model.
    pub fn embedding<E, F>(factory: F) -> Self
    where
        E: EmbeddingModel + 'static,
        F: Fn(&Params) -> ComponentResult<E> + Send + Sync + 'static,
    {
        Self::with_factory(
            Capability::Embedding,
            None,
            Box::new(move |params| factory(params).map(|e| Component::Embedding(Arc::new(e)))),
        )
    }

    /// Deferred generator (language model).
    pub fn generator<G, F>(factory: F) -> Self
    where
        G: Generator + 'static,
        F: Fn(&Params) -> ComponentResult<G> + Send + Sync + 'static,
    {
        Self::with_factory(
            Capability::Generator,
            None,
            Box::new(move |params| factory(params).map(|g| Component::Generator(Arc::new(g)))),
        )
    }

    /// Deferred stage module with its declared contract.
    pub fn module<M, F>(contract: ModuleContract, factory: F) -> Self
    where
        M: StageModule + 'static,
        F: Fn(&Params) -> ComponentResult<M> + Send + Sync + 'static,
    {
        Self::with_factory(
            Capability::Module,
            Some(contract),
            Box::new(move |params| factory(params).map(|m| Component::Module(Arc::new(m)))),
        )
    }

    fn with_factory(capability: Capability, contract: Option<ModuleContract>, factory: Factory) -> Self {
        Self {
            capability,
            params: Params::new(),
            contract,
            factory,
        }
    }

    /// Bind a constructor parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Capability of the deferred component.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }

    /// Bound constructor parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }
}

impl fmt::Debug for LazyInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInit")
            .field("capability", &self.capability)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ComponentKey {
    capability: Capability,
    name: String,
}

struct Entry {
    init: LazyInit,
    instance: Mutex<Option<Component>>,
}

/// Registry of lazily constructed components.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: DashMap<ComponentKey, Arc<Entry>>,
    constructions: AtomicUsize,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in splitters and stage modules.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::modules::register_builtins(&registry);
        registry
    }

    /// Register `init` under `name`, replacing (with a warning) any previous entry.
    ///
    /// Returns `true` when an entry was replaced.
    pub fn register(&self, name: impl Into<String>, init: LazyInit) -> bool {
        let key = ComponentKey {
            capability: init.capability,
            name: name.into(),
        };
        let entry = Arc::new(Entry {
            init,
            instance: Mutex::new(None),
        });
        let replaced = self.entries.insert(key.clone(), entry).is_some();
        if replaced {
            tracing::warn!(
                capability = %key.capability,
                name = %key.name,
                "Component re-registered, later resolutions use the new factory"
            );
        }
        replaced
    }

    /// Whether `name` is registered for `capability`.
    #[must_use]
    pub fn contains(&self, capability: Capability, name: &str) -> bool {
        self.entries.contains_key(&ComponentKey {
            capability,
            name: name.to_string(),
        })
    }

    /// Registered names for `capability`, sorted.
    #[must_use]
    pub fn names(&self, capability: Capability) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().capability == capability)
            .map(|entry| entry.key().name.clone())
            .collect();
        names.sort();
        names
    }

    /// Declared contract of a module, without constructing it.
    #[must_use]
    pub fn contract(&self, module: &str) -> Option<ModuleContract> {
        self.entry(Capability::Module, module)
            .and_then(|entry| entry.init.contract.clone())
    }

    /// Whether the component has already been constructed.
    #[must_use]
    pub fn is_constructed(&self, capability: Capability, name: &str) -> bool {
        self.entry(capability, name).is_some_and(|entry| {
            entry
                .instance
                .lock()
                .map(|slot| slot.is_some())
                .unwrap_or(false)
        })
    }

    /// Total number of factory invocations that succeeded.
    #[must_use]
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    fn entry(&self, capability: Capability, name: &str) -> Option<Arc<Entry>> {
        self.entries
            .get(&ComponentKey {
                capability,
                name: name.to_string(),
            })
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve a component, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns `ComponentNotFound` for unregistered names and `ComponentInit`
    /// when the factory fails.
    pub fn resolve(&self, capability: Capability, name: &str) -> Result<Component> {
        let entry = self
            .entry(capability, name)
            .ok_or_else(|| Error::ComponentNotFound {
                capability,
                name: name.to_string(),
                known: self.names(capability),
            })?;

        let mut slot = entry
            .instance
            .lock()
            .map_err(|_| Error::Other(format!("registry lock poisoned for {capability} '{name}'")))?;
        if let Some(component) = slot.as_ref() {
            return Ok(component.clone());
        }

        tracing::debug!(capability = %capability, name, "Constructing component");
        let component = (entry.init.factory)(&entry.init.params).map_err(|source| {
            Error::ComponentInit {
                capability,
                name: name.to_string(),
                source,
            }
        })?;
        self.constructions.fetch_add(1, Ordering::SeqCst);
        *slot = Some(component.clone());
        Ok(component)
    }

    /// Resolve a splitter.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_splitter(&self, name: &str) -> Result<Arc<dyn Splitter>> {
        match self.resolve(Capability::Splitter, name)? {
            Component::Splitter(splitter) => Ok(splitter),
            other => Err(capability_defect(name, &other)),
        }
    }

    /// Resolve an embedding model.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_embedding(&self, name: &str) -> Result<Arc<dyn EmbeddingModel>> {
        match self.resolve(Capability::Embedding, name)? {
            Component::Embedding(model) => Ok(model),
            other => Err(capability_defect(name, &other)),
        }
    }

    /// Resolve a generator.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_generator(&self, name: &str) -> Result<Arc<dyn Generator>> {
        match self.resolve(Capability::Generator, name)? {
            Component::Generator(generator) => Ok(generator),
            other => Err(capability_defect(name, &other)),
        }
    }

    /// Resolve a stage module.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_module(&self, name: &str) -> Result<Arc<dyn StageModule>> {
        match self.resolve(Capability::Module, name)? {
            Component::Module(module) => Ok(module),
            other => Err(capability_defect(name, &other)),
        }
    }
}

fn capability_defect(name: &str, component: &Component) -> Error {
    Error::Other(format!(
        "registry entry '{name}' produced a {} component",
        component.capability()
    ))
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("entries", &self.entries.len())
            .field("constructions", &self.construction_count())
            .finish()
    }
}
