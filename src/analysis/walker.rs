//! Scope-tracking syntax tree traversal shared by all language analyzers.
//!
//! Each language describes what its node kinds mean through [`SyntaxRules`];
//! the walker does the bookkeeping: entity creation with file-local
//! parents, per-callable control flow, call sites with the innermost caller,
//! simple type bindings and line classification.

use std::collections::HashMap;

use tree_sitter::Node;

use super::facts::{
    ControlFlowInfo, Decision, LineStats, RawBase, RawCallSite, RawEntity, Receiver, Span,
    TypeRef, TypeRefKind,
};
use super::traits::{Extraction, ParsedFile};
use crate::model::EntityKind;

/// Where a definition appears.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DefContext {
    /// Directly inside a type body.
    pub in_type: bool,
    /// Directly at module level.
    pub at_module: bool,
}

/// A named definition recognised at a node.
pub(crate) struct Definition<'t> {
    pub kind: EntityKind,
    pub name: String,
    /// Node whose extent is the entity's span and scope.
    pub node: Node<'t>,
    pub bases: Vec<RawBase>,
    pub owner_hint: Option<String>,
    pub parameter_count: usize,
    /// Variable to type bindings visible inside the definition (typed
    /// parameters, Go receivers).
    pub bindings: Vec<(String, String)>,
}

impl<'t> Definition<'t> {
    pub fn new(kind: EntityKind, name: impl Into<String>, node: Node<'t>) -> Self {
        Self {
            kind,
            name: name.into(),
            node,
            bases: Vec::new(),
            owner_hint: None,
            parameter_count: 0,
            bindings: Vec::new(),
        }
    }
}

/// An identifier handed to a call as an argument.
pub(crate) struct CallArg {
    pub name: String,
    pub receiver: Receiver,
}

pub(crate) struct CallShape {
    pub callee: String,
    pub receiver: Receiver,
    pub line: usize,
    pub args: Vec<CallArg>,
}

/// Per-language interpretation of syntax nodes.
pub(crate) trait SyntaxRules {
    fn definitions<'t>(&self, node: Node<'t>, src: &[u8], ctx: DefContext) -> Vec<Definition<'t>>;

    fn call(&self, node: Node, src: &[u8]) -> Option<CallShape>;

    fn decision(&self, node: Node, src: &[u8]) -> Option<Decision>;

    /// Comment nodes and docstrings. Their subtree is not visited.
    fn is_comment(&self, node: Node, src: &[u8]) -> bool;

    /// Local variable bindings with an inferable type, e.g. `x = X()`.
    fn bindings(&self, _node: Node, _src: &[u8]) -> Vec<(String, String)> {
        Vec::new()
    }

    fn type_refs(&self, _node: Node, _src: &[u8]) -> Vec<(String, TypeRefKind)> {
        Vec::new()
    }
}

pub(crate) fn text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

pub(crate) fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

pub(crate) fn field_text<'a>(node: Node, field: &str, src: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(n, src))
}

/// Named children of `node`, collected so callers can filter freely.
pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Simple (possibly dotted) type or class name, without generics.
pub(crate) fn simple_type_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches(['*', '&']).trim();
    let base = trimmed.split(['<', '[', '(']).next().unwrap_or("").trim();
    let valid = !base.is_empty()
        && base
            .split('.')
            .all(|seg| {
                let mut chars = seg.chars();
                matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
                    && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
            });
    valid.then(|| base.to_string())
}

const CODE: u8 = 1;
const COMMENT: u8 = 2;

struct Frame {
    entity: usize,
    node_id: usize,
    kind: EntityKind,
    qualified: String,
    bindings: HashMap<String, String>,
}

struct Walker<'r> {
    rules: &'r dyn SyntaxRules,
    entities: Vec<RawEntity>,
    call_sites: Vec<RawCallSite>,
    type_refs: Vec<TypeRef>,
    frames: Vec<Frame>,
    rows: Vec<u8>,
}

impl<'r> Walker<'r> {
    fn enter(&mut self, node: Node, src: &[u8]) -> bool {
        if self.rules.is_comment(node, src) {
            self.mark(node, COMMENT);
            return false;
        }
        if node.child_count() == 0 && node.start_byte() < node.end_byte() {
            self.mark(node, CODE);
        }

        let bindings = self.rules.bindings(node, src);
        if let Some(top) = self.frames.last_mut() {
            for (var, ty) in bindings {
                top.bindings.insert(var, ty);
            }
        }

        let ctx = self.context();
        let mut scope_pushed = false;
        for def in self.rules.definitions(node, src, ctx) {
            let opens_scope = def.kind.is_scope() && !scope_pushed;
            self.define(def, ctx, opens_scope);
            scope_pushed |= opens_scope;
        }

        if let Some(decision) = self.rules.decision(node, src) {
            self.record_decision(decision);
        }

        if let Some(call) = self.rules.call(node, src) {
            self.record_call(call);
        }

        for (type_name, kind) in self.rules.type_refs(node, src) {
            self.type_refs.push(TypeRef {
                type_name,
                kind,
                line: line_of(node),
            });
        }

        true
    }

    fn leave(&mut self, node: Node) {
        while self.frames.len() > 1
            && self.frames.last().map(|f| f.node_id) == Some(node.id())
        {
            self.frames.pop();
        }
    }

    fn context(&self) -> DefContext {
        let top = self.frames.last();
        DefContext {
            in_type: top.is_some_and(|f| f.kind.is_type()),
            at_module: self.frames.len() == 1,
        }
    }

    fn define(&mut self, def: Definition, ctx: DefContext, opens_scope: bool) {
        let Some(top) = self.frames.last() else {
            return;
        };
        let kind = if def.kind == EntityKind::Function && ctx.in_type {
            EntityKind::Method
        } else {
            def.kind
        };
        let qualified = match (&def.owner_hint, top.kind) {
            (Some(owner), _) => format!("{}.{}", owner, def.name),
            (None, EntityKind::Module) => def.name.clone(),
            (None, _) => format!("{}.{}", top.qualified, def.name),
        };
        let parent = top.entity;
        let index = self.entities.len();
        self.entities.push(RawEntity {
            kind,
            name: def.name,
            qualified_name: qualified.clone(),
            parent: Some(parent),
            owner_hint: def.owner_hint,
            bases: def.bases,
            span: Span::from_node(def.node),
            control_flow: kind.is_callable().then(ControlFlowInfo::default),
            parameter_count: def.parameter_count,
        });
        if opens_scope {
            self.frames.push(Frame {
                entity: index,
                node_id: def.node.id(),
                kind,
                qualified,
                bindings: def.bindings.into_iter().collect(),
            });
        }
    }

    fn record_decision(&mut self, decision: Decision) {
        for frame in self.frames.iter().rev() {
            if frame.kind.is_callable() {
                if let Some(cf) = self.entities[frame.entity].control_flow.as_mut() {
                    cf.record(decision);
                }
                return;
            }
            if frame.kind.is_type() {
                return;
            }
        }
    }

    fn lookup_binding(&self, var: &str) -> Option<String> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.bindings.get(var).cloned())
    }

    fn record_call(&mut self, call: CallShape) {
        let caller = self.frames.last().map(|f| f.entity).unwrap_or(0);
        let receiver_type = match &call.receiver {
            Receiver::Path(path) if !path.contains('.') => self.lookup_binding(path),
            _ => None,
        };
        self.call_sites.push(RawCallSite {
            caller,
            callee: call.callee,
            receiver: call.receiver,
            receiver_type,
            line: call.line,
            callback: false,
        });
        for arg in call.args {
            self.call_sites.push(RawCallSite {
                caller,
                callee: arg.name,
                receiver: arg.receiver,
                receiver_type: None,
                line: call.line,
                callback: true,
            });
        }
    }

    fn mark(&mut self, node: Node, flag: u8) {
        let start = node.start_position();
        let end = node.end_position();
        let mut last = end.row;
        if end.column == 0 && end.row > start.row {
            last -= 1;
        }
        for row in start.row..=last {
            if let Some(slot) = self.rows.get_mut(row) {
                *slot |= flag;
            }
        }
    }

    fn line_stats(&self) -> LineStats {
        let total = self.rows.len();
        let code = self.rows.iter().filter(|r| **r & CODE != 0).count();
        let comment = self.rows.iter().filter(|r| **r == COMMENT).count();
        LineStats {
            total,
            code,
            comment,
            blank: total - code - comment,
        }
    }
}

fn count_rows(source: &[u8]) -> usize {
    if source.is_empty() {
        return 0;
    }
    let newlines = source.iter().filter(|b| **b == b'\n').count();
    if source.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// Traverse `parsed` once with `rules`, building entity index 0 as the module
/// entity named `module`.
pub(crate) fn walk(parsed: &ParsedFile, rules: &dyn SyntaxRules, module: &str) -> Extraction {
    let root = parsed.tree.root_node();
    let src = &parsed.source[..];

    let mut walker = Walker {
        rules,
        entities: vec![RawEntity {
            kind: EntityKind::Module,
            name: module.to_string(),
            qualified_name: module.to_string(),
            parent: None,
            owner_hint: None,
            bases: Vec::new(),
            span: Span::from_node(root),
            control_flow: None,
            parameter_count: 0,
        }],
        call_sites: Vec::new(),
        type_refs: Vec::new(),
        frames: vec![Frame {
            entity: 0,
            node_id: root.id(),
            kind: EntityKind::Module,
            qualified: String::new(),
            bindings: HashMap::new(),
        }],
        rows: vec![0; count_rows(src)],
    };

    let mut cursor = root.walk();
    'outer: loop {
        let node = cursor.node();
        if walker.enter(node, src) && cursor.goto_first_child() {
            continue;
        }
        loop {
            walker.leave(cursor.node());
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                break 'outer;
            }
        }
    }

    // the module spans the whole file even when the tree stops short
    if let Some(module_entity) = walker.entities.first_mut() {
        module_entity.span.start_line = 1;
        module_entity.span.end_line = module_entity.span.end_line.max(walker.rows.len());
    }

    let lines = walker.line_stats();
    Extraction {
        entities: walker.entities,
        call_sites: walker.call_sites,
        type_refs: walker.type_refs,
        lines,
    }
}
