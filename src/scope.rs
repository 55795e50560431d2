use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

/// A lexical scope: a frame mapping names to bindings, with an optional
/// parent pointer forming a lookup chain.
///
/// Scopes are cheap reference-counted handles. This indirection is load
/// bearing: object types hold their member scope, whose method types refer
/// back to the object type (through `this`), so the type graph is cyclic
/// and cannot be an owned tree. Cloning a `Scope` aliases the same frame.
pub struct Scope<T> {
    inner: Rc<RefCell<Frame<T>>>,
}

struct Frame<T> {
    parent: Option<Scope<T>>,
    names: HashMap<String, T>,
}

impl<T> Scope<T> {
    /// Creates a root scope with no parent.
    pub fn root() -> Scope<T> {
        Scope::new(None)
    }

    pub fn new(parent: Option<Scope<T>>) -> Scope<T> {
        Scope {
            inner: Rc::new(RefCell::new(Frame {
                parent,
                names: HashMap::new(),
            })),
        }
    }

    /// Creates a child frame whose lookups fall back to `self`.
    pub fn child(&self) -> Scope<T> {
        Scope::new(Some(self.clone()))
    }

    /// Binds `name` in this frame. Fails if the frame already defines it;
    /// shadowing an outer frame's binding is fine.
    pub fn define(&self, name: impl Into<String>, value: T) -> Result<(), ()> {
        let name = name.into();
        let mut frame = self.inner.borrow_mut();
        if frame.names.contains_key(&name) {
            return Err(());
        }
        frame.names.insert(name, value);
        Ok(())
    }

    /// Looks up `name`, walking parent frames unless `current_only`.
    pub fn get(&self, name: &str, current_only: bool) -> Option<T>
    where
        T: Clone,
    {
        let frame = self.inner.borrow();
        if let Some(value) = frame.names.get(name) {
            return Some(value.clone());
        }
        if current_only {
            return None;
        }
        frame.parent.as_ref().and_then(|p| p.get(name, false))
    }

    /// Rebinds `name` in the nearest enclosing frame that defines it.
    /// Fails if no frame does.
    pub fn set(&self, name: &str, value: T) -> Result<(), ()> {
        let mut frame = self.inner.borrow_mut();
        if let Some(slot) = frame.names.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &frame.parent {
            Some(parent) => parent.set(name, value),
            None => Err(()),
        }
    }

    /// The names defined by this frame only, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.borrow().names.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<T> Clone for Scope<T> {
    fn clone(&self) -> Self {
        Scope {
            inner: Rc::clone(&self.inner),
        }
    }
}

// Two scope handles are equal when they alias the same frame. This is what
// makes an object's member scope act as its nominal type signature.
impl<T> PartialEq for Scope<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// A derived Debug would recurse through parent chains and cyclic object
// scopes; printing the frame's own names is enough for diagnostics.
impl<T> fmt::Debug for Scope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope{:?}", self.names())
    }
}
