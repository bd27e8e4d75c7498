//! # Dependency Container
//!
//! Maps types to [`DependencyEntry`]s and builds the object graph the director hosts.
//!
//! ## Bindings
//!
//! - **Singletons** are values constructed outside the container and handed over with
//!   [`Container::register_singleton`]. They can be given extra [`Alias`]es, typically
//!   trait objects, which resolve to the same value.
//! - **Discovered components** are registered with [`Container::register_discovered`] and
//!   constructed lazily. Manual registration always wins over discovery.
//! - **Transitive components** are created on demand the first time something declares a
//!   dependency on them.
//!
//! ## Building
//!
//! [`Container::build`] walks the declared dependencies of every entry depth-first with an
//! explicit stack, so a deep graph cannot overflow the call stack and a cycle is reported
//! as [`ContainerError::CircularDependency`] with the offending path.
//!
//! ## Locking
//!
//! The whole registry sits behind one mutex and constructors run while it is held. A
//! constructor must use the [`Resolver`] it is given, never the container itself.
//!
//! [`DependencyEntry`]: entry::DependencyEntry

pub mod component;
pub mod entry;
pub mod error;

pub use component::{Component, ComponentDescriptor, ComponentList, ComponentModule, Dependency, Scope};
pub use entry::{Alias, TypeKey};
pub use error::ContainerError;

use crate::framework::Actor;
use entry::{Cast, DependencyEntry, Erased, Mark};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<DependencyEntry>,
    index: HashMap<TypeKey, usize>,
    construction_path: Vec<usize>,
}

impl Registry {
    fn insert(&mut self, entry: DependencyEntry) -> usize {
        let id = self.entries.len();
        self.index.insert(entry.key, id);
        self.entries.push(entry);
        id
    }

    fn entry_for(&mut self, dependency: &Dependency) -> Result<usize, ContainerError> {
        if let Some(&id) = self.index.get(&dependency.key()) {
            return Ok(id);
        }
        match dependency {
            Dependency::Component(descriptor) => {
                debug!(component = descriptor.type_name(), "Created transitive entry");
                Ok(self.insert(DependencyEntry::lazy(*descriptor, false)))
            }
            Dependency::Bound(key) => Err(ContainerError::UnknownDependency {
                type_name: key.name(),
            }),
        }
    }

    fn dependencies_of(&self, id: usize) -> Vec<Dependency> {
        self.entries[id]
            .recipe
            .map(|recipe| recipe.dependencies())
            .unwrap_or_default()
    }

    /// Iterative depth-first walk from `start`, creating on-demand entries and marking
    /// each entry in-progress while it is on the current path.
    fn build_from(&mut self, start: usize) -> Result<(), ContainerError> {
        if self.entries[start].mark == Mark::Done {
            return Ok(());
        }

        self.entries[start].mark = Mark::InProgress;
        let mut stack: Vec<(usize, Vec<Dependency>, usize)> =
            vec![(start, self.dependencies_of(start), 0)];

        while let Some((id, dependencies, next)) = stack.last_mut() {
            let Some(dependency) = dependencies.get(*next).copied() else {
                let finished = *id;
                self.entries[finished].mark = Mark::Done;
                stack.pop();
                continue;
            };
            *next += 1;

            let child = match self.entry_for(&dependency) {
                Ok(child) => child,
                Err(e) => {
                    self.unwind(&stack);
                    return Err(e);
                }
            };

            match self.entries[child].mark {
                Mark::Done => {}
                Mark::InProgress => {
                    let mut path: Vec<&'static str> = stack
                        .iter()
                        .skip_while(|(id, _, _)| *id != child)
                        .map(|(id, _, _)| self.entries[*id].key.name())
                        .collect();
                    path.push(self.entries[child].key.name());
                    self.unwind(&stack);
                    return Err(ContainerError::CircularDependency { path });
                }
                Mark::Unvisited => {
                    self.entries[child].mark = Mark::InProgress;
                    let dependencies = self.dependencies_of(child);
                    stack.push((child, dependencies, 0));
                }
            }
        }
        Ok(())
    }

    fn unwind(&mut self, stack: &[(usize, Vec<Dependency>, usize)]) {
        for (id, _, _) in stack {
            self.entries[*id].mark = Mark::Unvisited;
        }
    }

    fn build_all(&mut self) -> Result<(), ContainerError> {
        // Entries created on demand are pushed onto the arena and visited by the walk
        // that created them, so iterating the initial range covers the whole graph.
        let registered = self.entries.len();
        for id in 0..registered {
            self.build_from(id)?;
        }
        Ok(())
    }

    fn resolve_entry(
        &mut self,
        id: usize,
        spawned: &mut Vec<Arc<dyn Actor>>,
    ) -> Result<Erased, ContainerError> {
        if let Some(instance) = &self.entries[id].instance {
            return Ok(Arc::clone(instance));
        }
        self.build_from(id)?;

        let entry = &self.entries[id];
        let Some(recipe) = entry.recipe else {
            return Err(ContainerError::UnknownDependency {
                type_name: entry.key.name(),
            });
        };
        if entry.under_construction {
            let mut path: Vec<&'static str> = self
                .construction_path
                .iter()
                .skip_while(|&&on_path| on_path != id)
                .map(|&on_path| self.entries[on_path].key.name())
                .collect();
            path.push(entry.key.name());
            return Err(ContainerError::CircularDependency { path });
        }

        self.entries[id].under_construction = true;
        self.construction_path.push(id);
        let constructed = {
            let mut resolver = Resolver {
                registry: &mut *self,
                spawned: &mut *spawned,
            };
            recipe.construct(&mut resolver)
        };
        self.construction_path.pop();
        self.entries[id].under_construction = false;

        let constructed = constructed?;
        debug!(component = recipe.type_name(), scope = ?recipe.scope(), "Constructed");
        if let Some(actor) = constructed.actor {
            spawned.push(actor);
        }
        if recipe.scope() == Scope::Singleton {
            self.entries[id].instance = Some(Arc::clone(&constructed.instance));
        }
        Ok(constructed.instance)
    }

    fn resolve_typed<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        spawned: &mut Vec<Arc<dyn Actor>>,
    ) -> Result<Arc<T>, ContainerError> {
        let key = TypeKey::of::<T>();
        let id = *self
            .index
            .get(&key)
            .ok_or(ContainerError::UnknownDependency { type_name: key.name() })?;
        let instance = self.resolve_entry(id, spawned)?;
        self.entries[id]
            .view(key, &instance)
            .and_then(|view| view.downcast_ref::<Arc<T>>().cloned())
            .ok_or(ContainerError::UnknownDependency { type_name: key.name() })
    }

    fn existing<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let key = TypeKey::of::<T>();
        let entry = &self.entries[*self.index.get(&key)?];
        let instance = entry.instance.as_ref()?;
        entry
            .view(key, instance)
            .and_then(|view| view.downcast_ref::<Arc<T>>().cloned())
    }
}

/// Access to the graph from inside a [`Component::construct`] call.
pub struct Resolver<'a> {
    registry: &'a mut Registry,
    spawned: &'a mut Vec<Arc<dyn Actor>>,
}

impl Resolver<'_> {
    /// Resolves a dependency, constructing it first if needed.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>, ContainerError> {
        self.registry.resolve_typed::<T>(self.spawned)
    }

    /// Hands an actor created by the component under construction to the director.
    pub fn spawn_actor(&mut self, actor: Arc<dyn Actor>) {
        self.spawned.push(actor);
    }
}

/// Thread-safe dependency container.
#[derive(Default)]
pub struct Container {
    registry: Mutex<Registry>,
    spawned: Mutex<Vec<Arc<dyn Actor>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stash(&self, actors: Vec<Arc<dyn Actor>>) {
        if !actors.is_empty() {
            self.spawned
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(actors);
        }
    }

    /// Binds an already constructed value under `T` and each of `aliases`.
    ///
    /// Nothing is bound if any part of the registration fails.
    pub fn register_singleton<T: ?Sized + Send + Sync + 'static>(
        &self,
        value: Arc<T>,
        aliases: Vec<Alias<T>>,
    ) -> Result<(), ContainerError> {
        let key = TypeKey::of::<T>();
        let mut registry = self.registry();
        if registry.index.contains_key(&key) {
            return Err(ContainerError::DuplicateBinding { type_name: key.name() });
        }
        for alias in &aliases {
            if let Some(&owner) = registry.index.get(&alias.key()) {
                return Err(ContainerError::AliasConflict {
                    alias: alias.type_name(),
                    target: key.name(),
                    owner: registry.entries[owner].key.name(),
                });
            }
        }

        let instance: Erased = Arc::new(value);
        let id = registry.insert(DependencyEntry::provided(key, instance));
        for alias in aliases {
            registry.index.insert(alias.key(), id);
            registry.entries[id].add_alias(alias.key(), Arc::clone(alias.cast()));
        }
        debug!(singleton = key.name(), "Registered singleton");
        Ok(())
    }

    /// Binds `aliases` to whatever entry `T` resolves to.
    ///
    /// With `check_conflicts` off, an alias that is already claimed is repointed.
    pub fn add_singleton_alias<T: ?Sized + Send + Sync + 'static>(
        &self,
        aliases: Vec<Alias<T>>,
        check_conflicts: bool,
    ) -> Result<(), ContainerError> {
        if aliases.is_empty() {
            return Ok(());
        }
        let target = TypeKey::of::<T>();
        let mut registry = self.registry();
        let id = *registry
            .index
            .get(&target)
            .ok_or(ContainerError::UnknownSingletonAliasTarget {
                type_name: target.name(),
            })?;

        if check_conflicts {
            for alias in &aliases {
                if let Some(&owner) = registry.index.get(&alias.key()) {
                    return Err(ContainerError::AliasConflict {
                        alias: alias.type_name(),
                        target: target.name(),
                        owner: registry.entries[owner].key.name(),
                    });
                }
            }
        }

        let through = registry.entries[id].cast_to(target);
        for alias in aliases {
            let cast: Cast = match &through {
                None => Arc::clone(alias.cast()),
                Some(first) => {
                    let first = Arc::clone(first);
                    let second = Arc::clone(alias.cast());
                    Arc::new(move |value: &Erased| first(value).and_then(|view| second(&view)))
                }
            };
            if let Some(previous) = registry.index.insert(alias.key(), id) {
                if previous != id {
                    registry.entries[previous].drop_alias(alias.key());
                }
            }
            registry.entries[id].add_alias(alias.key(), cast);
        }
        Ok(())
    }

    /// Binds a discovered component for lazy construction.
    ///
    /// Returns `false` without touching anything when the type is already bound.
    pub fn register_discovered(&self, descriptor: ComponentDescriptor) -> bool {
        let mut registry = self.registry();
        if registry.index.contains_key(&descriptor.key()) {
            return false;
        }
        let root = descriptor.scope() == Scope::Singleton;
        registry.insert(DependencyEntry::lazy(descriptor, root));
        true
    }

    /// Ensures every declared dependency of every entry has an entry, failing on cycles.
    pub fn build(&self) -> Result<(), ContainerError> {
        self.registry().build_all()
    }

    /// Resolves `T`, constructing it and its dependencies on first access.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let mut spawned = Vec::new();
        let resolved = self.registry().resolve_typed::<T>(&mut spawned);
        self.stash(spawned);
        resolved
    }

    /// `T` if it is bound and has already been constructed.
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.registry().existing::<T>()
    }

    /// Constructs every root singleton that has not been constructed yet.
    pub fn resolve_root_singletons(&self) -> Result<usize, ContainerError> {
        let mut spawned = Vec::new();
        let resolved = {
            let mut registry = self.registry();
            let roots: Vec<usize> = registry
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.root_singleton && entry.scope == Scope::Singleton)
                .map(|(id, _)| id)
                .collect();
            let count = roots.len();
            roots
                .into_iter()
                .try_for_each(|id| registry.resolve_entry(id, &mut spawned).map(|_| ()))
                .map(|_| count)
        };
        self.stash(spawned);
        resolved
    }

    /// Drains actors produced by construction since the last call.
    pub fn take_spawned_actors(&self) -> Vec<Arc<dyn Actor>> {
        std::mem::take(&mut *self.spawned.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.registry().index.contains_key(&TypeKey::of::<T>())
    }

    /// Number of distinct entries, aliases not counted.
    pub fn len(&self) -> usize {
        self.registry().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the aliases bound to `T`'s entry.
    pub fn aliases_of<T: ?Sized + 'static>(&self) -> Vec<&'static str> {
        let registry = self.registry();
        registry
            .index
            .get(&TypeKey::of::<T>())
            .map(|&id| registry.entries[id].aliases.iter().map(TypeKey::name).collect())
            .unwrap_or_default()
    }

    pub fn is_root_singleton<T: ?Sized + 'static>(&self) -> bool {
        let registry = self.registry();
        registry
            .index
            .get(&TypeKey::of::<T>())
            .is_some_and(|&id| registry.entries[id].root_singleton)
    }
}
