/*
 * Causality chains
 *
 * Every implementation-invoked method carries a `Reason` describing the
 * invocation that first activated it. Reasons form an immutable forest of
 * `Arc` nodes and are used only for diagnostics; the closure result never
 * depends on them.
 */

use std::sync::Arc;

use super::records::MethodId;

/// How an invocation reached its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Registered directly as an analysis root
    Root,
    /// Statically bound call (static, private, or already resolved)
    Static,
    /// Virtual dispatch resolved against an instantiated receiver
    Virtual,
}

impl DispatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchKind::Root => "root",
            DispatchKind::Static => "static",
            DispatchKind::Virtual => "virtual",
        }
    }
}

/// One node in the causality forest
#[derive(Debug)]
pub struct Reason {
    parent: Option<Arc<Reason>>,
    triggering_method: Option<MethodId>,
    kind: DispatchKind,
}

impl Reason {
    /// Reason for an externally registered root; has no trigger.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            triggering_method: None,
            kind: DispatchKind::Root,
        })
    }

    /// Reason for a call discovered while processing `triggering_method`.
    pub fn invoke(
        parent: Option<Arc<Reason>>,
        triggering_method: MethodId,
        kind: DispatchKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            parent,
            triggering_method: Some(triggering_method),
            kind,
        })
    }

    pub fn parent(&self) -> Option<&Arc<Reason>> {
        self.parent.as_ref()
    }

    pub fn triggering_method(&self) -> Option<MethodId> {
        self.triggering_method
    }

    pub fn kind(&self) -> DispatchKind {
        self.kind
    }

    /// Render the chain from this node to its root, resolving method names
    /// through the given lookup. Produces lines like
    /// `virtual call from Animal.speak <- static call from App.main <- root`.
    pub fn describe_with(&self, name_of: impl Fn(MethodId) -> String) -> String {
        let mut parts = Vec::new();
        let mut current = Some(self);
        while let Some(node) = current {
            match node.triggering_method {
                Some(method) => parts.push(format!(
                    "{} call from {}",
                    node.kind.as_str(),
                    name_of(method)
                )),
                None => parts.push(node.kind.as_str().to_string()),
            }
            current = node.parent.as_deref();
        }
        parts.join(" <- ")
    }
}
