//! Dependency entries, type keys and alias views.

use crate::container::component::{ComponentDescriptor, Scope};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// A constructed value. Always holds an `Arc<V>` where `V` is the type it was looked up
/// under, so unsized types such as `dyn Trait` can be stored too.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

/// Turns an entry's primary value into one of its alias views.
pub(crate) type Cast = Arc<dyn Fn(&Erased) -> Option<Erased> + Send + Sync>;

/// Identity of a bound type.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// An extra type under which a singleton of type `T` can be resolved.
///
/// ```rust
/// use actor_director::container::Alias;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct English;
/// impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
///
/// let alias = Alias::new(|english: Arc<English>| english as Arc<dyn Greeter>);
/// assert!(alias.type_name().contains("Greeter"));
/// ```
pub struct Alias<T: ?Sized> {
    key: TypeKey,
    cast: Cast,
    _target: PhantomData<fn(Arc<T>)>,
}

impl<T: ?Sized + Send + Sync + 'static> Alias<T> {
    pub fn new<A: ?Sized + Send + Sync + 'static>(cast: fn(Arc<T>) -> Arc<A>) -> Self {
        let cast: Cast = Arc::new(move |value: &Erased| {
            value
                .downcast_ref::<Arc<T>>()
                .map(|value| Arc::new(cast(Arc::clone(value))) as Erased)
        });
        Self {
            key: TypeKey::of::<A>(),
            cast,
            _target: PhantomData,
        }
    }
}

impl<T: ?Sized> Alias<T> {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name()
    }

    pub(crate) fn cast(&self) -> &Cast {
        &self.cast
    }
}

/// Depth-first build state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mark {
    Unvisited,
    InProgress,
    Done,
}

pub(crate) struct DependencyEntry {
    pub(crate) key: TypeKey,
    pub(crate) scope: Scope,
    pub(crate) recipe: Option<ComponentDescriptor>,
    pub(crate) instance: Option<Erased>,
    pub(crate) views: HashMap<TypeKey, Cast>,
    pub(crate) aliases: Vec<TypeKey>,
    pub(crate) root_singleton: bool,
    pub(crate) mark: Mark,
    pub(crate) under_construction: bool,
}

impl DependencyEntry {
    /// An entry for a value that was constructed outside the container.
    pub(crate) fn provided(key: TypeKey, instance: Erased) -> Self {
        Self {
            key,
            scope: Scope::Singleton,
            recipe: None,
            instance: Some(instance),
            views: HashMap::new(),
            aliases: Vec::new(),
            root_singleton: true,
            mark: Mark::Done,
            under_construction: false,
        }
    }

    /// An entry the container constructs lazily from `recipe`.
    pub(crate) fn lazy(recipe: ComponentDescriptor, root_singleton: bool) -> Self {
        Self {
            key: recipe.key(),
            scope: recipe.scope(),
            recipe: Some(recipe),
            instance: None,
            views: HashMap::new(),
            aliases: Vec::new(),
            root_singleton,
            mark: Mark::Unvisited,
            under_construction: false,
        }
    }

    /// Projects `instance` to the view registered under `key`.
    pub(crate) fn view(&self, key: TypeKey, instance: &Erased) -> Option<Erased> {
        if key == self.key {
            return Some(Arc::clone(instance));
        }
        self.views.get(&key).and_then(|cast| cast(instance))
    }

    /// The cast from this entry's primary value to `key`, `None` for the primary key itself.
    pub(crate) fn cast_to(&self, key: TypeKey) -> Option<Cast> {
        if key == self.key {
            None
        } else {
            self.views.get(&key).cloned()
        }
    }

    pub(crate) fn add_alias(&mut self, key: TypeKey, cast: Cast) {
        if !self.aliases.contains(&key) {
            self.aliases.push(key);
        }
        self.views.insert(key, cast);
    }

    pub(crate) fn drop_alias(&mut self, key: TypeKey) {
        self.aliases.retain(|alias| *alias != key);
        self.views.remove(&key);
    }
}
