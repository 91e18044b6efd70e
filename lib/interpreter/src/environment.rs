use std::{
    collections::HashMap,
    iter::successors,
    rc::{Rc, Weak},
};

use scanner::Token;

use crate::{callable::Callable, value::Value};

/// Collections run after this many captured scopes were released, at the least.
const MIN_COLLECTION_THRESHOLD: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "env#{}", _0)]
pub struct EnvId(usize);

/// A closure's hold on the scope it was declared in. A released scope outlives its block
/// for as long as a handle to it is reachable.
#[derive(Debug, Clone)]
pub struct EnvRef {
    id: EnvId,
    pin: Rc<()>,
}

impl EnvRef {
    pub fn id(&self) -> EnvId {
        self.id
    }
}

impl PartialEq for EnvRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, Value>,
    enclosing: Option<EnvId>,
    // Set once a closure captured this scope or one nested in it.
    captured: bool,
    released: bool,
    // Counts the live `EnvRef`s to this scope.
    pin: Weak<()>,
}

impl Scope {
    fn closures(&self) -> impl Iterator<Item = EnvId> + '_ {
        self.values.values().filter_map(|value| match value {
            Value::Callable(Callable::Function(function)) => Some(function.closure.id()),
            _ => None,
        })
    }
}

/// Every scope of a running program, addressed by `EnvId`. Scopes link to their enclosing
/// scope by index, so closures can keep a scope alive without reference cycles.
///
/// Scopes are pushed on block/call entry and released on exit. A released scope that no
/// closure ever captured is freed right away and its slot reused. Released captured scopes
/// are swept by `collect`, which runs once enough of them piled up.
#[derive(Debug)]
pub struct Environments {
    scopes: Vec<Option<Scope>>,
    free_slots: Vec<usize>,
    released_captured: usize,
    next_collection: usize,
}

impl Default for Environments {
    fn default() -> Self {
        Self {
            scopes: vec![Some(Scope::default())],
            free_slots: Vec::new(),
            released_captured: 0,
            next_collection: MIN_COLLECTION_THRESHOLD,
        }
    }
}

impl Environments {
    pub const GLOBAL: EnvId = EnvId(0);

    pub fn push(&mut self, enclosing: EnvId) -> EnvId {
        let scope = Scope { enclosing: Some(enclosing), ..Default::default() };
        let env = match self.free_slots.pop() {
            Some(slot) => {
                self.scopes[slot] = Some(scope);
                EnvId(slot)
            }
            None => {
                self.scopes.push(Some(scope));
                EnvId(self.scopes.len() - 1)
            }
        };
        log::trace!("Pushed {} enclosed by {}", env, enclosing);
        env
    }

    pub fn release(&mut self, env: EnvId) {
        if env == Self::GLOBAL {
            return;
        }

        let scope = self.scope_mut(env);
        scope.released = true;

        if !scope.captured {
            self.free(env);
            return;
        }

        self.released_captured += 1;
        if self.released_captured >= self.next_collection {
            self.collect();
        }
    }

    /// Marks `env` and all of its enclosing scopes as captured and hands out a handle that
    /// keeps `env` alive past its release.
    pub fn capture(&mut self, env: EnvId) -> EnvRef {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.scope_mut(id);
            if scope.captured {
                break;
            }
            scope.captured = true;
            current = scope.enclosing;
        }

        let scope = self.scope_mut(env);
        let pin = scope.pin.upgrade().unwrap_or_else(|| {
            let pin = Rc::new(());
            scope.pin = Rc::downgrade(&pin);
            pin
        });

        EnvRef { id: env, pin }
    }

    /// Frees every released scope that is unreachable from live scopes and from handles
    /// held outside of the arena.
    pub fn collect(&mut self) {
        log::trace!("Collecting scopes, {} live", self.len());

        // Handles stored in the arena itself. Any surplus is held by the caller.
        let mut internal = vec![0; self.scopes.len()];
        for scope in self.scopes.iter().flatten() {
            for closure in scope.closures() {
                internal[closure.0] += 1;
            }
        }

        let mut gray: Vec<EnvId> = self
            .scopes
            .iter()
            .enumerate()
            .filter_map(|(slot, scope)| {
                let scope = scope.as_ref()?;
                let held_outside = scope.pin.strong_count() > internal[slot];
                (!scope.released || held_outside).then_some(EnvId(slot))
            })
            .collect();

        let mut marked = vec![false; self.scopes.len()];
        while let Some(env) = gray.pop() {
            if std::mem::replace(&mut marked[env.0], true) {
                continue;
            }
            let scope = self.scope(env);
            gray.extend(scope.enclosing);
            gray.extend(scope.closures());
        }

        for (slot, marked) in marked.into_iter().enumerate() {
            if !marked && self.scopes[slot].is_some() {
                self.free(EnvId(slot));
            }
        }

        self.released_captured = 0;
        self.next_collection = (self.len() * 2).max(MIN_COLLECTION_THRESHOLD);
        log::debug!("Collected scopes, {} live, next after {}", self.len(), self.next_collection);
    }

    pub fn define(&mut self, env: EnvId, name: &str, value: Value) {
        self.scope_mut(env).values.insert(name.to_string(), value);
    }

    pub fn get(&self, env: EnvId, name: &Token) -> Option<&Value> {
        self.chain(env).find_map(|env| self.scope(env).values.get(name.lexeme()))
    }

    /// Overwrites the innermost binding of `name`. Returns `false` if no scope in the chain
    /// defines it.
    pub fn assign(&mut self, env: EnvId, name: &Token, value: Value) -> bool {
        let defining =
            self.chain(env).find(|env| self.scope(*env).values.contains_key(name.lexeme()));
        let Some(env) = defining else {
            return false;
        };

        self.scope_mut(env).values.insert(name.lexeme().to_string(), value);
        true
    }

    /// Number of live scopes.
    pub fn len(&self) -> usize {
        self.scopes.len() - self.free_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn free(&mut self, env: EnvId) {
        self.scopes[env.0] = None;
        self.free_slots.push(env.0);
        log::trace!("Reclaimed {}", env);
    }

    fn scope(&self, env: EnvId) -> &Scope {
        match &self.scopes[env.0] {
            Some(scope) => scope,
            None => unreachable!("{} used after it was reclaimed", env),
        }
    }

    fn scope_mut(&mut self, env: EnvId) -> &mut Scope {
        match &mut self.scopes[env.0] {
            Some(scope) => scope,
            None => unreachable!("{} used after it was reclaimed", env),
        }
    }

    fn chain(&self, env: EnvId) -> impl Iterator<Item = EnvId> + '_ {
        successors(Some(env), |env| self.scope(*env).enclosing)
    }
}
