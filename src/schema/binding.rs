//! Deferred bindings
//!
//! Every cross-reference made at declaration time is stored as
//! `Binding::Unresolved(reference)` and transitioned exactly once to
//! `Binding::Resolved(value)` by the fixup pass.

/// A two-state cell: unresolved reference `R`, or resolved value `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding<R, T> {
    Unresolved(R),
    Resolved(T),
}

impl<R, T> Binding<R, T> {
    pub fn unresolved(reference: R) -> Self {
        Binding::Unresolved(reference)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Binding::Resolved(_))
    }

    /// The pending reference, if not yet resolved
    pub fn reference(&self) -> Option<&R> {
        match self {
            Binding::Unresolved(r) => Some(r),
            Binding::Resolved(_) => None,
        }
    }

    /// The resolved value, if fixup has run
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Binding::Unresolved(_) => None,
            Binding::Resolved(v) => Some(v),
        }
    }

    /// The resolved value.
    ///
    /// # Panics
    ///
    /// If read before the fixup pass resolved this binding. That is a bug in
    /// the caller's ordering, never a user error.
    pub fn get(&self) -> &T {
        match self {
            Binding::Resolved(v) => v,
            Binding::Unresolved(_) => panic!("deferred binding read before fixup"),
        }
    }

    /// Run `resolve` on the pending reference and store its result.
    ///
    /// A binding is only ever resolved once; resolving an already resolved
    /// binding is a no-op that returns the existing value.
    pub fn resolve_with<E>(&mut self, resolve: impl FnOnce(&R) -> Result<T, E>) -> Result<&T, E> {
        if let Binding::Unresolved(reference) = self {
            let value = resolve(reference)?;
            *self = Binding::Resolved(value);
        }
        Ok(self.get())
    }
}
