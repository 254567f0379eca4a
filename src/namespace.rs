//! Dynamic namespace fragments.
//!
//! A namespace is an ordered list of parts resolved into a `/`-joined path
//! fragment inserted between a cache root and the cache name. Parts can be
//! literal strings, the local hostname, or caller-supplied functions, so
//! deployments can partition a shared directory by host, tenant, or any
//! runtime-computed label.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CacheError;

type ComputeFn = dyn Fn() -> String + Send + Sync;
type ComputeWithFn = dyn Fn(&[String]) -> String + Send + Sync;

/// One segment of a namespace.
#[derive(Clone)]
pub enum NamespacePart {
    /// A fixed string.
    Literal(String),
    /// The local hostname, resolved at cache startup.
    Host,
    /// A zero-argument function invoked at resolution.
    Compute(Arc<ComputeFn>),
    /// A function applied to captured arguments at resolution.
    ComputeWith {
        func: Arc<ComputeWithFn>,
        args: Vec<String>,
    },
}

impl fmt::Debug for NamespacePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespacePart::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            NamespacePart::Host => f.write_str("Host"),
            NamespacePart::Compute(_) => f.write_str("Compute(..)"),
            NamespacePart::ComputeWith { args, .. } => {
                f.debug_struct("ComputeWith").field("args", args).finish()
            }
        }
    }
}

impl From<&str> for NamespacePart {
    fn from(s: &str) -> Self {
        NamespacePart::Literal(s.to_string())
    }
}

impl From<String> for NamespacePart {
    fn from(s: String) -> Self {
        NamespacePart::Literal(s)
    }
}

/// An ordered list of namespace parts.
///
/// The empty namespace resolves to the empty fragment, leaving files
/// directly under `<root>/<cache>`.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    parts: Vec<NamespacePart>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part.
    pub fn part(mut self, part: impl Into<NamespacePart>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Append the local hostname.
    ///
    /// Recommended for temp namespaces when the temp directory is shared
    /// across machines, so each host sweeps only its own staging files.
    pub fn host(mut self) -> Self {
        self.parts.push(NamespacePart::Host);
        self
    }

    /// Append a part computed by a zero-argument function.
    pub fn compute(mut self, func: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.parts.push(NamespacePart::Compute(Arc::new(func)));
        self
    }

    /// Append a part computed by applying `func` to `args`.
    pub fn compute_with(
        mut self,
        func: impl Fn(&[String]) -> String + Send + Sync + 'static,
        args: Vec<String>,
    ) -> Self {
        self.parts.push(NamespacePart::ComputeWith {
            func: Arc::new(func),
            args,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Resolve every part and join them into a path fragment.
    ///
    /// Each resolved part must be a non-empty string free of `/`; anything
    /// else is [`CacheError::BadNamespacePart`].
    pub fn resolve(&self) -> Result<PathBuf, CacheError> {
        let mut fragment = PathBuf::new();
        for part in &self.parts {
            let resolved = match part {
                NamespacePart::Literal(s) => s.clone(),
                NamespacePart::Host => hostname::get()?.to_string_lossy().into_owned(),
                NamespacePart::Compute(func) => func(),
                NamespacePart::ComputeWith { func, args } => func(args),
            };
            if resolved.is_empty() || resolved.contains('/') {
                return Err(CacheError::BadNamespacePart(resolved));
            }
            fragment.push(&resolved);
        }
        Ok(fragment)
    }
}

impl From<Vec<NamespacePart>> for Namespace {
    fn from(parts: Vec<NamespacePart>) -> Self {
        Self { parts }
    }
}

impl From<NamespacePart> for Namespace {
    fn from(part: NamespacePart) -> Self {
        Self { parts: vec![part] }
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Namespace::new().part(s)
    }
}
