//! Parameter-type trie for overloaded callables

use super::{type_eq, unify, CallableType, LoxType};
use crate::ast::NodeId;
use crate::scope::ScopeId;
use crate::symbol::{FunctionId, NativeId, Symbol};
use std::rc::Rc;
use thiserror::Error;

/// Arity ceiling enforced at definition time
pub const MAX_PARAMS: usize = 256;

/// Structured failures thrown by the trie and converted to logged
/// diagnostics by the resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverloadError {
    /// A signature identical to an existing one was defined
    #[error("{0} already exists in this scoop.")]
    RedefinedSymbol(String),
    /// More parameters than [`MAX_PARAMS`]
    #[error("Too many parameters: at most {MAX_PARAMS} are allowed.")]
    TooManyParams,
}

/// What a resolved overload dispatches to
#[derive(Debug, Clone)]
pub enum OverloadTarget {
    /// A declared function/method statement
    Declared {
        /// The function declaration's AST node
        stmt: NodeId,
        /// Dispatch id used by the code generator and the VM method tables
        function_id: FunctionId,
        /// Storage of the closure value (mangled global name or local slot);
        /// `None` for methods, which dispatch through class method tables
        storage: Option<(Symbol, ScopeId)>,
    },
    /// A host-provided native function
    Native {
        /// Registry id
        native: NativeId,
    },
}

/// One leaf of the trie
#[derive(Debug, Clone)]
pub struct OverloadEntry {
    /// Dispatch target
    pub target: OverloadTarget,
    /// Full signature, shared with the symbol table
    pub callable: Rc<CallableType>,
}

#[derive(Debug, Clone, Default)]
struct OverloadNode {
    /// Edges in insertion order; order makes tie-breaking deterministic
    edges: Vec<(LoxType, OverloadNode)>,
    entry: Option<OverloadEntry>,
}

/// The overload set of one name
#[derive(Debug, Clone)]
pub struct OverloadTree {
    name: String,
    root: OverloadNode,
}

impl OverloadTree {
    /// Create an empty overload set for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: OverloadNode::default(),
        }
    }

    /// The shared name of every overload in this set
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a signature. Identical parameter lists raise
    /// [`OverloadError::RedefinedSymbol`].
    pub fn define(&mut self, entry: OverloadEntry) -> Result<(), OverloadError> {
        if entry.callable.params.len() > MAX_PARAMS {
            return Err(OverloadError::TooManyParams);
        }

        let mut node = &mut self.root;
        let params = entry.callable.params.clone();
        for param in &params {
            let pos = node.edges.iter().position(|(ty, _)| type_eq(ty, param));
            let idx = match pos {
                Some(idx) => idx,
                None => {
                    node.edges.push((param.clone(), OverloadNode::default()));
                    node.edges.len() - 1
                }
            };
            node = &mut node.edges[idx].1;
        }

        if node.entry.is_some() {
            return Err(OverloadError::RedefinedSymbol(self.name.clone()));
        }
        node.entry = Some(entry);
        Ok(())
    }

    /// Dispatch by argument types.
    ///
    /// At each trie level, subtype-compatible edges are tried in order of
    /// increasing `id(arg) - id(param)`, recursing; the first complete path
    /// wins. No compatible leaf means the call fails at resolution time.
    pub fn resolve(&self, args: &[LoxType]) -> Option<&OverloadEntry> {
        Self::resolve_node(&self.root, args)
    }

    fn resolve_node<'t>(node: &'t OverloadNode, args: &[LoxType]) -> Option<&'t OverloadEntry> {
        let (first, rest) = match args.split_first() {
            Some(split) => split,
            None => return node.entry.as_ref(),
        };

        let mut candidates: Vec<(i128, usize)> = node
            .edges
            .iter()
            .enumerate()
            .filter(|(_, (param, _))| unify(param, first))
            .map(|(idx, (param, _))| (first.id() as i128 - param.id() as i128, idx))
            .collect();
        candidates.sort_by_key(|(distance, _)| *distance);

        for (_, idx) in candidates {
            if let Some(entry) = Self::resolve_node(&node.edges[idx].1, rest) {
                return Some(entry);
            }
        }
        None
    }

    /// All leaves, in definition order
    pub fn entries(&self) -> Vec<&OverloadEntry> {
        let mut out = Vec::new();
        Self::collect(&self.root, &mut out);
        out
    }

    /// The sole overload, when the set has exactly one
    pub fn single(&self) -> Option<&OverloadEntry> {
        let entries = self.entries();
        if entries.len() == 1 {
            Some(entries[0])
        } else {
            None
        }
    }

    fn collect<'t>(node: &'t OverloadNode, out: &mut Vec<&'t OverloadEntry>) {
        if let Some(entry) = &node.entry {
            out.push(entry);
        }
        for (_, child) in &node.edges {
            Self::collect(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;

    fn entry(id: u32, params: Vec<LoxType>) -> OverloadEntry {
        OverloadEntry {
            target: OverloadTarget::Declared {
                stmt: NodeId(id),
                function_id: FunctionId(id),
                storage: None,
            },
            callable: CallableType::new(params, LoxType::Void),
        }
    }

    fn function_id(entry: &OverloadEntry) -> FunctionId {
        match entry.target {
            OverloadTarget::Declared { function_id, .. } => function_id,
            OverloadTarget::Native { .. } => panic!("not a declared overload"),
        }
    }

    #[test]
    fn test_exact_dispatch() {
        let mut tree = OverloadTree::new("f");
        tree.define(entry(0, vec![LoxType::Integer])).unwrap();
        tree.define(entry(1, vec![LoxType::String])).unwrap();

        let chosen = tree.resolve(&[LoxType::Integer]).unwrap();
        assert_eq!(function_id(chosen), FunctionId(0));
        let chosen = tree.resolve(&[LoxType::String]).unwrap();
        assert_eq!(function_id(chosen), FunctionId(1));
    }

    #[test]
    fn test_promotion_prefers_smaller_distance() {
        let mut tree = OverloadTree::new("f");
        tree.define(entry(0, vec![LoxType::Floating])).unwrap();
        tree.define(entry(1, vec![LoxType::Integer])).unwrap();

        // An integer argument fits both; the integer overload is closer.
        let chosen = tree.resolve(&[LoxType::Integer]).unwrap();
        assert_eq!(function_id(chosen), FunctionId(1));
        // A floating argument only fits the floating overload.
        let chosen = tree.resolve(&[LoxType::Floating]).unwrap();
        assert_eq!(function_id(chosen), FunctionId(0));
    }

    #[test]
    fn test_no_compatible_leaf() {
        let mut tree = OverloadTree::new("f");
        tree.define(entry(0, vec![LoxType::Integer])).unwrap();
        assert!(tree.resolve(&[LoxType::String]).is_none());
        assert!(tree.resolve(&[]).is_none());
        assert!(tree
            .resolve(&[LoxType::Integer, LoxType::Integer])
            .is_none());
    }

    #[test]
    fn test_redefinition_is_structured_error() {
        let mut tree = OverloadTree::new("f");
        tree.define(entry(0, vec![LoxType::Integer])).unwrap();
        let err = tree.define(entry(1, vec![LoxType::Integer])).unwrap_err();
        assert_eq!(err, OverloadError::RedefinedSymbol("f".into()));
    }

    #[test]
    fn test_too_many_params() {
        let mut tree = OverloadTree::new("f");
        let params = vec![LoxType::Integer; MAX_PARAMS + 1];
        let err = tree.define(entry(0, params)).unwrap_err();
        assert_eq!(err, OverloadError::TooManyParams);
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let mut tree = OverloadTree::new("f");
        tree.define(entry(0, vec![LoxType::Floating, LoxType::Floating]))
            .unwrap();
        tree.define(entry(1, vec![LoxType::Integer, LoxType::Floating]))
            .unwrap();

        // Left-to-right distance: the integer-first overload is closer.
        for _ in 0..8 {
            let chosen = tree
                .resolve(&[LoxType::Integer, LoxType::Integer])
                .unwrap();
            assert_eq!(function_id(chosen), FunctionId(1));
        }
    }
}
