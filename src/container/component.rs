//! # Components
//!
//! A [`Component`] is a type the container knows how to build: it declares its scope,
//! the types it depends on and a constructor that pulls those dependencies out of a
//! [`Resolver`]. Components are discovered through [`ComponentModule`]s, which replace
//! scanning loaded code for marker attributes with an explicit list.
//!
//! ```rust
//! use actor_director::container::{Component, ComponentList, Container, ContainerError, Dependency, Resolver};
//! use std::sync::Arc;
//!
//! struct Config { retries: u32 }
//!
//! struct Worker { config: Arc<Config> }
//!
//! impl Component for Worker {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::bound::<Config>()]
//!     }
//!
//!     fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
//!         Ok(Self { config: resolver.get::<Config>()? })
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_singleton(Arc::new(Config { retries: 3 }), Vec::new()).unwrap();
//! container.register_discovered(ComponentList::descriptor::<Worker>());
//! container.build().unwrap();
//!
//! let worker = container.resolve::<Worker>().unwrap();
//! assert_eq!(worker.config.retries, 3);
//! ```

use crate::container::entry::{Erased, TypeKey};
use crate::container::{ContainerError, Resolver};
use crate::framework::{Actor, BoxError};
use std::sync::Arc;

/// How many instances of a component exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One shared instance, constructed on first demand and cached.
    Singleton,
    /// A fresh instance for every dependent.
    Instance,
}

/// A type the container can construct.
pub trait Component: Send + Sync + Sized + 'static {
    const SCOPE: Scope = Scope::Singleton;

    /// Types `construct` will ask the resolver for.
    ///
    /// Undeclared dependencies still resolve if they are already bound, but only declared
    /// ones are created on demand and checked for cycles before construction starts.
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError>;

    /// Hands the constructed value to the director's pool when the component is itself an
    /// actor. Implementations return `Some(this.clone())`.
    fn as_actor(_this: &Arc<Self>) -> Option<Arc<dyn Actor>> {
        None
    }
}

pub(crate) struct Constructed {
    pub(crate) instance: Erased,
    pub(crate) actor: Option<Arc<dyn Actor>>,
}

type ConstructFn = fn(&mut Resolver<'_>) -> Result<Constructed, ContainerError>;

/// Type-erased recipe for a [`Component`].
#[derive(Clone, Copy)]
pub struct ComponentDescriptor {
    key: TypeKey,
    scope: Scope,
    dependencies: fn() -> Vec<Dependency>,
    construct: ConstructFn,
}

impl ComponentDescriptor {
    pub fn of<T: Component>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            scope: T::SCOPE,
            dependencies: T::dependencies,
            construct: construct_component::<T>,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        (self.dependencies)()
    }

    pub(crate) fn construct(&self, resolver: &mut Resolver<'_>) -> Result<Constructed, ContainerError> {
        (self.construct)(resolver)
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("type", &self.key.name())
            .field("scope", &self.scope)
            .finish()
    }
}

fn construct_component<T: Component>(resolver: &mut Resolver<'_>) -> Result<Constructed, ContainerError> {
    let value = Arc::new(T::construct(resolver)?);
    let actor = T::as_actor(&value);
    Ok(Constructed {
        instance: Arc::new(value),
        actor,
    })
}

/// A declared dependency edge.
#[derive(Debug, Clone, Copy)]
pub enum Dependency {
    /// A component; an entry is created on demand if nothing is bound yet.
    Component(ComponentDescriptor),
    /// A type that must already be bound, typically a trait object alias.
    Bound(TypeKey),
}

impl Dependency {
    pub fn component<T: Component>() -> Self {
        Dependency::Component(ComponentDescriptor::of::<T>())
    }

    pub fn bound<T: ?Sized + 'static>() -> Self {
        Dependency::Bound(TypeKey::of::<T>())
    }

    pub fn key(&self) -> TypeKey {
        match self {
            Dependency::Component(descriptor) => descriptor.key(),
            Dependency::Bound(key) => *key,
        }
    }
}

/// A named source of discoverable components.
pub trait ComponentModule: Send + Sync {
    fn name(&self) -> &str;

    /// Every component this module declares. A failure aborts startup.
    fn components(&self) -> Result<Vec<ComponentDescriptor>, BoxError>;
}

/// Declarative [`ComponentModule`] built in code.
#[derive(Debug, Clone)]
pub struct ComponentList {
    name: String,
    components: Vec<ComponentDescriptor>,
}

impl ComponentList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    pub fn with<T: Component>(mut self) -> Self {
        self.components.push(ComponentDescriptor::of::<T>());
        self
    }

    pub fn descriptor<T: Component>() -> ComponentDescriptor {
        ComponentDescriptor::of::<T>()
    }
}

impl ComponentModule for ComponentList {
    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> Result<Vec<ComponentDescriptor>, BoxError> {
        Ok(self.components.clone())
    }
}
