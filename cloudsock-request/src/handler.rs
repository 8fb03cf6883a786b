//! A registered request: the callable itself plus the `{auto_convert,
//! allow_python_syntax, thread}` record the reference attaches to the
//! function object directly. Registration here is a small builder instead,
//! since Rust has nowhere to stash ad-hoc attributes on a closure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arg::Arg;
use crate::coerce::CoerceKind;
use crate::errors::RequestError;

pub type HandlerFn = dyn Fn(&[Arg], &HashMap<String, Arg>) -> Result<Arg, RequestError> + Send + Sync;

pub struct Registration {
    pub(crate) name: String,
    pub(crate) handler: Arc<HandlerFn>,
    pub(crate) params: Vec<CoerceKind>,
    pub(crate) variadic: CoerceKind,
    pub(crate) kwargs: HashMap<String, CoerceKind>,
    pub(crate) kwargs_variadic: CoerceKind,
    pub(crate) return_kind: CoerceKind,
    pub(crate) allow_python_syntax: bool,
    pub(crate) thread: bool,
}

impl Registration {
    pub fn new(name: impl Into<String>, handler: impl Fn(&[Arg], &HashMap<String, Arg>) -> Result<Arg, RequestError> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            params: Vec::new(),
            variadic: CoerceKind::Any,
            kwargs: HashMap::new(),
            kwargs_variadic: CoerceKind::Any,
            return_kind: CoerceKind::Any,
            allow_python_syntax: false,
            thread: false,
        }
    }

    /// Declares the coercion target for the next positional parameter, in
    /// declaration order.
    pub fn param(mut self, kind: CoerceKind) -> Self {
        self.params.push(kind);
        self
    }

    /// Coercion applied to positional arguments beyond the declared
    /// `param`s (the reference's `*args: list[T]` case).
    pub fn variadic(mut self, kind: CoerceKind) -> Self {
        self.variadic = kind;
        self
    }

    /// Declares the coercion target for a named keyword parameter.
    pub fn kwarg(mut self, name: impl Into<String>, kind: CoerceKind) -> Self {
        self.kwargs.insert(name.into(), kind);
        self
    }

    /// Coercion applied to keyword arguments not declared with `kwarg` (the
    /// reference's `**kwargs: dict[K, V]` case).
    pub fn kwargs_variadic(mut self, kind: CoerceKind) -> Self {
        self.kwargs_variadic = kind;
        self
    }

    pub fn returns(mut self, kind: CoerceKind) -> Self {
        self.return_kind = kind;
        self
    }

    pub fn allow_python_syntax(mut self, allow: bool) -> Self {
        self.allow_python_syntax = allow;
        self
    }

    /// Marks this handler to run on a fresh worker thread rather than
    /// blocking the accept/dispatch loop.
    pub fn thread(mut self, on_thread: bool) -> Self {
        self.thread = on_thread;
        self
    }
}
