use std::sync::Arc;

/// An optional callback that can be cloned into worker threads.
///
/// The empty default is the "no listener" state; calling it does nothing.
pub struct SharedFn<F: ?Sized + Send + Sync + 'static>(Option<Arc<F>>);

impl<F: ?Sized + Send + Sync + 'static> SharedFn<F> {
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&F> {
        self.0.as_deref()
    }
}

impl<A: 'static> SharedFn<dyn Fn(A) + Send + Sync> {
    pub fn from_fn(f: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    #[inline]
    pub fn call(&self, arg: A) {
        if let Some(f) = &self.0 {
            f(arg);
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> From<Arc<F>> for SharedFn<F> {
    fn from(f: Arc<F>) -> Self {
        Self(Some(f))
    }
}

impl<F: ?Sized + Send + Sync + 'static> Clone for SharedFn<F> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for SharedFn<F> {
    fn default() -> Self {
        Self(None)
    }
}

impl<F: ?Sized + Send + Sync + 'static> std::fmt::Debug for SharedFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_set() { "set" } else { "unset" };
        write!(f, "SharedFn({state})")
    }
}
