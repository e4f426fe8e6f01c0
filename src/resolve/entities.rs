//! Global symbol table: stable identities, per-file scopes and inheritance.
//!
//! Files are processed in sorted path order so identities (including the
//! `#2`, `#3` collision suffixes) do not depend on scan or parse order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::analysis::{AnalyzerRegistry, BaseRelation, FileFacts, LanguageAnalyzer, RawBase};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::model::{Entity, EntityIdx, EntityKind, UnresolvedReason};
use crate::scanner::Language;

/// What an imported local name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A project module.
    Module(String),
    /// A member of a project module, optionally nested in a type.
    Symbol {
        module: String,
        name: String,
        owner: Option<String>,
    },
    /// Something outside the project, by specifier.
    External(String),
}

/// Name resolution context of one file.
#[derive(Debug, Clone)]
pub struct FileScope {
    pub path: String,
    pub language: Language,
    pub module: String,
    /// Global index of each file-local entity.
    pub locals: Vec<EntityIdx>,
    pub bindings: BTreeMap<String, Binding>,
    /// Project modules whose members are all visible (`import *`).
    pub wildcards: Vec<String>,
    /// Set when a wildcard import names a module outside the project.
    pub external_wildcard: bool,
    /// Project module each import statement refers to, in statement order.
    pub import_targets: Vec<Option<String>>,
}

impl FileScope {
    /// Project modules this file refers to through imports.
    pub fn imported_modules(&self) -> BTreeSet<&str> {
        let mut modules: BTreeSet<&str> = self.wildcards.iter().map(|m| m.as_str()).collect();
        for binding in self.bindings.values() {
            match binding {
                Binding::Module(m) | Binding::Symbol { module: m, .. } => {
                    modules.insert(m.as_str());
                }
                Binding::External(_) => {}
            }
        }
        modules
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceLink {
    pub child: EntityIdx,
    pub base: EntityIdx,
    pub relation: BaseRelation,
}

/// Outcome of resolving a (possibly dotted) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(EntityIdx),
    Unresolved(UnresolvedReason),
}

impl Lookup {
    pub fn found(self) -> Option<EntityIdx> {
        match self {
            Lookup::Found(idx) => Some(idx),
            Lookup::Unresolved(_) => None,
        }
    }
}

pub struct SymbolTable {
    entities: Vec<Entity>,
    ids: HashMap<String, EntityIdx>,
    files: Vec<FileScope>,
    file_index: HashMap<String, usize>,
    modules: BTreeSet<String>,
    module_entities: BTreeMap<String, EntityIdx>,
    /// Top-level names per module.
    module_members: HashMap<String, BTreeMap<String, Vec<EntityIdx>>>,
    /// Own and inherited callables per type.
    methods: HashMap<EntityIdx, BTreeMap<String, EntityIdx>>,
    subclasses: HashMap<EntityIdx, Vec<EntityIdx>>,
    /// Types with a base outside the project, directly or through a base.
    external_bases: HashSet<EntityIdx>,
    /// Methods of types, by name.
    methods_by_name: BTreeMap<String, Vec<EntityIdx>>,
    inheritance: Vec<InheritanceLink>,
    diagnostics: Vec<Diagnostic>,
}

struct PendingBases {
    file: usize,
    entity: EntityIdx,
    bases: Vec<RawBase>,
}

impl SymbolTable {
    pub fn build(facts: &[FileFacts], registry: &AnalyzerRegistry) -> Self {
        let mut order: Vec<&FileFacts> = facts.iter().collect();
        order.sort_by(|a, b| a.path.cmp(&b.path));

        let mut table = SymbolTable {
            entities: Vec::new(),
            ids: HashMap::new(),
            files: Vec::with_capacity(order.len()),
            file_index: HashMap::new(),
            modules: order.iter().map(|f| f.module.clone()).collect(),
            module_entities: BTreeMap::new(),
            module_members: HashMap::new(),
            methods: HashMap::new(),
            subclasses: HashMap::new(),
            external_bases: HashSet::new(),
            methods_by_name: BTreeMap::new(),
            inheritance: Vec::new(),
            diagnostics: Vec::new(),
        };

        let mut id_counts: HashMap<String, usize> = HashMap::new();
        let mut owners: Vec<(EntityIdx, String)> = Vec::new();
        let mut pending: Vec<PendingBases> = Vec::new();

        for file in &order {
            let position = table.files.len();
            let overloading = registry
                .for_language(file.language)
                .is_some_and(|a| a.supports_overloading());
            let locals = table.add_file_entities(
                file,
                position,
                overloading,
                &mut id_counts,
                &mut owners,
                &mut pending,
            );
            table.file_index.insert(file.path.clone(), position);
            table.files.push(FileScope {
                path: file.path.clone(),
                language: file.language,
                module: file.module.clone(),
                locals,
                bindings: BTreeMap::new(),
                wildcards: Vec::new(),
                external_wildcard: false,
                import_targets: Vec::new(),
            });
        }

        table.attach_receiver_methods(owners);

        for (position, file) in order.iter().enumerate() {
            if let Some(analyzer) = registry.for_language(file.language) {
                table.bind_imports(position, file, analyzer);
            }
        }

        for item in pending {
            let analyzer = registry.for_language(table.files[item.file].language);
            table.resolve_bases(item, analyzer);
        }

        let order = table.break_cycles();
        table.build_method_tables(&order);

        debug!(
            "symbol table: {} entities, {} modules, {} inheritance links",
            table.entities.len(),
            table.modules.len(),
            table.inheritance.len()
        );
        table
    }

    fn assign_id(counts: &mut HashMap<String, usize>, base: String) -> String {
        let count = counts.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}#{}", base, count)
        }
    }

    fn push_entity(&mut self, entity: Entity) -> EntityIdx {
        let idx = EntityIdx(self.entities.len());
        self.ids.insert(entity.id.clone(), idx);
        self.entities.push(entity);
        idx
    }

    fn add_file_entities(
        &mut self,
        file: &FileFacts,
        position: usize,
        overloading: bool,
        id_counts: &mut HashMap<String, usize>,
        owners: &mut Vec<(EntityIdx, String)>,
        pending: &mut Vec<PendingBases>,
    ) -> Vec<EntityIdx> {
        let mut locals: Vec<EntityIdx> = Vec::with_capacity(file.entities.len());
        // overloads differ by arity and are kept as distinct entities
        let mut seen: HashMap<(EntityKind, &str, Option<usize>), EntityIdx> = HashMap::new();

        for raw in &file.entities {
            if raw.kind == EntityKind::Module && raw.parent.is_none() {
                let idx = match self.module_entities.get(&file.module) {
                    Some(idx) => *idx,
                    None => {
                        let id = Self::assign_id(id_counts, format!("module:{}", file.module));
                        let idx = self.push_entity(Entity {
                            id,
                            kind: EntityKind::Module,
                            name: file.module.clone(),
                            qualified_name: file.module.clone(),
                            module: file.module.clone(),
                            file: file.path.clone(),
                            line: raw.span.start_line,
                            end_line: raw.span.end_line,
                            parent: None,
                            children: Vec::new(),
                            bases: Vec::new(),
                            complexity: None,
                            parameter_count: 0,
                        });
                        self.module_entities.insert(file.module.clone(), idx);
                        idx
                    }
                };
                locals.push(idx);
                continue;
            }

            let arity = (overloading && raw.kind.is_callable()).then_some(raw.parameter_count);
            let key = (raw.kind, raw.qualified_name.as_str(), arity);
            if let Some(&existing) = seen.get(&key) {
                // rebinding a variable is not a redeclaration
                if raw.kind != EntityKind::Variable {
                    let first = self.entities[existing.0].line;
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::DuplicateDeclaration,
                            format!(
                                "duplicate declaration of {} `{}` (first declared at line {})",
                                raw.kind, raw.qualified_name, first
                            ),
                        )
                        .in_file(&file.path)
                        .at_line(raw.span.start_line),
                    );
                }
                locals.push(existing);
                continue;
            }

            let parent = raw.parent.and_then(|p| locals.get(p).copied());
            let id = Self::assign_id(
                id_counts,
                format!("{}:{}", raw.kind.id_prefix(), raw.qualified_name),
            );
            let idx = self.push_entity(Entity {
                id,
                kind: raw.kind,
                name: raw.name.clone(),
                qualified_name: raw.qualified_name.clone(),
                module: file.module.clone(),
                file: file.path.clone(),
                line: raw.span.start_line,
                end_line: raw.span.end_line,
                parent,
                children: Vec::new(),
                bases: Vec::new(),
                complexity: raw.control_flow.map(|cf| cf.cyclomatic_complexity()),
                parameter_count: raw.parameter_count,
            });
            if let Some(parent) = parent {
                self.entities[parent.0].children.push(idx);
                let top_level = self.entities[parent.0].kind == EntityKind::Module;
                match &raw.owner_hint {
                    Some(owner) => owners.push((idx, owner.clone())),
                    None if top_level => self
                        .module_members
                        .entry(file.module.clone())
                        .or_default()
                        .entry(raw.name.clone())
                        .or_default()
                        .push(idx),
                    None => {}
                }
            }
            if !raw.bases.is_empty() {
                pending.push(PendingBases {
                    file: position,
                    entity: idx,
                    bases: raw.bases.clone(),
                });
            }
            seen.insert(key, idx);
            locals.push(idx);
        }
        locals
    }

    /// Move methods declared outside their type's body under that type.
    fn attach_receiver_methods(&mut self, owners: Vec<(EntityIdx, String)>) {
        for (method, owner) in owners {
            let module = self.entities[method.0].module.clone();
            let Some(owner_idx) = self
                .module_members
                .get(&module)
                .and_then(|members| members.get(&owner))
                .and_then(|candidates| {
                    candidates
                        .iter()
                        .copied()
                        .find(|c| self.entities[c.0].kind.is_type())
                })
            else {
                continue;
            };
            if let Some(old) = self.entities[method.0].parent {
                self.entities[old.0].children.retain(|c| *c != method);
            }
            self.entities[method.0].parent = Some(owner_idx);
            self.entities[owner_idx.0].children.push(method);
        }
    }

    fn bind_imports(&mut self, position: usize, file: &FileFacts, analyzer: &dyn LanguageAnalyzer) {
        let mut bindings = BTreeMap::new();
        let mut wildcards = Vec::new();
        let mut external_wildcard = false;
        let mut targets = Vec::with_capacity(file.imports.len());

        for import in &file.imports {
            let target = analyzer.resolve_module(&import.module, file, &self.modules);
            let base = target.as_deref().unwrap_or(&import.module);
            let mut statement_target = target.clone();

            if let Some(alias) = &import.alias {
                let binding = match &target {
                    Some(module) => Binding::Module(module.clone()),
                    None => Binding::External(import.module.clone()),
                };
                bindings.insert(alias.clone(), binding);
            }

            for symbol in &import.symbols {
                let local = symbol.local_name().to_string();
                // `from pkg import mod` names a submodule unless pkg declares it
                let submodule = analyzer
                    .submodule_name(base, &symbol.name)
                    .filter(|sub| self.modules.contains(sub))
                    .filter(|_| {
                        target
                            .as_deref()
                            .map_or(true, |m| self.module_member(m, &symbol.name, None).is_none())
                    });
                let binding = match (submodule, &target) {
                    (Some(sub), _) => {
                        statement_target.get_or_insert_with(|| sub.clone());
                        Binding::Module(sub)
                    }
                    (None, Some(module)) => Binding::Symbol {
                        module: module.clone(),
                        // default exports are assumed to keep their name
                        name: if symbol.name == "default" {
                            local.clone()
                        } else {
                            symbol.name.clone()
                        },
                        owner: symbol.owner.clone(),
                    },
                    (None, None) => Binding::External(import.module.clone()),
                };
                bindings.insert(local, binding);
            }

            if import.wildcard {
                match &target {
                    Some(module) if !wildcards.contains(module) => wildcards.push(module.clone()),
                    Some(_) => {}
                    None => external_wildcard = true,
                }
            }
            targets.push(statement_target);
        }

        let scope = &mut self.files[position];
        scope.bindings = bindings;
        scope.wildcards = wildcards;
        scope.external_wildcard = external_wildcard;
        scope.import_targets = targets;
    }

    fn resolve_bases(&mut self, item: PendingBases, analyzer: Option<&dyn LanguageAnalyzer>) {
        let scope = self.entities[item.entity.0].parent;
        let mut external = false;
        for base in &item.bases {
            let segments: Vec<&str> = base.name.split('.').collect();
            let lookup = self.lookup_path(&self.files[item.file], scope, &segments, analyzer);
            match lookup {
                Lookup::Found(target) if self.entities[target.0].kind.is_type() => {
                    if target == item.entity || self.entities[item.entity.0].bases.contains(&target)
                    {
                        continue;
                    }
                    self.entities[item.entity.0].bases.push(target);
                    self.inheritance.push(InheritanceLink {
                        child: item.entity,
                        base: target,
                        relation: base.relation,
                    });
                }
                Lookup::Unresolved(reason) if reason.is_external() => external = true,
                _ => {
                    let entity = &self.entities[item.entity.0];
                    let message = format!(
                        "unresolved base `{}` of {} `{}`",
                        base.name, entity.kind, entity.qualified_name
                    );
                    let diagnostic = Diagnostic::info(DiagnosticKind::UnresolvedSymbol, message)
                        .in_file(&entity.file)
                        .at_line(entity.line);
                    self.diagnostics.push(diagnostic);
                }
            }
        }
        if external {
            self.external_bases.insert(item.entity);
        }
    }

    /// Drop the base edge that closes each inheritance cycle and return the
    /// types ordered bases-first.
    fn break_cycles(&mut self) -> Vec<EntityIdx> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut mark = vec![Mark::New; self.entities.len()];
        let mut order = Vec::new();
        let mut removed: Vec<(EntityIdx, EntityIdx)> = Vec::new();

        for start in 0..self.entities.len() {
            if mark[start] != Mark::New || !self.entities[start].kind.is_type() {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            mark[start] = Mark::Active;
            while let Some(&(node, pos)) = stack.last() {
                let bases = &self.entities[node].bases;
                if pos >= bases.len() {
                    mark[node] = Mark::Done;
                    order.push(EntityIdx(node));
                    stack.pop();
                    continue;
                }
                let base = bases[pos].0;
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match mark[base] {
                    Mark::New => {
                        mark[base] = Mark::Active;
                        stack.push((base, 0));
                    }
                    Mark::Active => {
                        let from = stack.iter().position(|(n, _)| *n == base).unwrap_or(0);
                        let mut cycle: Vec<&str> = stack[from..]
                            .iter()
                            .map(|(n, _)| self.entities[*n].id.as_str())
                            .collect();
                        cycle.push(self.entities[base].id.as_str());
                        let entity = &self.entities[node];
                        let diagnostic = Diagnostic::warning(
                            DiagnosticKind::InheritanceCycle,
                            format!(
                                "inheritance cycle {}; ignoring base `{}` of `{}`",
                                cycle.join(" -> "),
                                self.entities[base].id,
                                entity.id
                            ),
                        )
                        .in_file(&entity.file)
                        .at_line(entity.line);
                        self.diagnostics.push(diagnostic);
                        removed.push((EntityIdx(node), EntityIdx(base)));
                    }
                    Mark::Done => {}
                }
            }
        }

        for (child, base) in removed {
            self.entities[child.0].bases.retain(|b| *b != base);
            self.inheritance
                .retain(|link| !(link.child == child && link.base == base));
        }
        order
    }

    fn build_method_tables(&mut self, order: &[EntityIdx]) {
        for &ty in order {
            let mut table: BTreeMap<String, EntityIdx> = BTreeMap::new();
            for &child in &self.entities[ty.0].children {
                let entity = &self.entities[child.0];
                if entity.kind.is_callable() {
                    table.entry(entity.name.clone()).or_insert(child);
                }
            }
            let mut external = self.external_bases.contains(&ty);
            for &base in &self.entities[ty.0].bases {
                if let Some(inherited) = self.methods.get(&base) {
                    for (name, method) in inherited {
                        table.entry(name.clone()).or_insert(*method);
                    }
                }
                external |= self.external_bases.contains(&base);
                self.subclasses.entry(base).or_default().push(ty);
            }
            if external {
                self.external_bases.insert(ty);
            }
            self.methods.insert(ty, table);
        }

        for (idx, entity) in self.entities.iter().enumerate() {
            let in_type = entity
                .parent
                .is_some_and(|p| self.entities[p.0].kind.is_type());
            if entity.kind.is_callable() && in_type {
                self.methods_by_name
                    .entry(entity.name.clone())
                    .or_default()
                    .push(EntityIdx(idx));
            }
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, idx: EntityIdx) -> &Entity {
        &self.entities[idx.0]
    }

    pub fn lookup_id(&self, id: &str) -> Option<EntityIdx> {
        self.ids.get(id).copied()
    }

    /// File scopes in sorted path order.
    pub fn files(&self) -> &[FileScope] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&FileScope> {
        self.file_index.get(path).map(|i| &self.files[*i])
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn module_entity(&self, module: &str) -> Option<EntityIdx> {
        self.module_entities.get(module).copied()
    }

    pub fn inheritance(&self) -> &[InheritanceLink] {
        &self.inheritance
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Own and inherited callables of a type.
    pub fn method_table(&self, ty: EntityIdx) -> Option<&BTreeMap<String, EntityIdx>> {
        self.methods.get(&ty)
    }

    pub fn has_external_base(&self, ty: EntityIdx) -> bool {
        self.external_bases.contains(&ty)
    }

    /// Methods of any type with the given name.
    pub fn methods_named(&self, name: &str) -> &[EntityIdx] {
        self.methods_by_name
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_named(&self, parent: EntityIdx, name: &str) -> Option<EntityIdx> {
        self.entities[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.entities[c.0].name == name)
    }

    /// Nearest enclosing type of an entity (excluding the entity itself).
    pub fn enclosing_type(&self, idx: EntityIdx) -> Option<EntityIdx> {
        let mut current = self.entities[idx.0].parent;
        while let Some(p) = current {
            if self.entities[p.0].kind.is_type() {
                return Some(p);
            }
            current = self.entities[p.0].parent;
        }
        None
    }

    /// Whether any transitive subclass of `ty` declares its own `name`.
    pub fn is_overridden(&self, ty: EntityIdx, name: &str) -> bool {
        let mut stack: Vec<EntityIdx> = self.subclasses.get(&ty).cloned().unwrap_or_default();
        let mut visited = HashSet::new();
        while let Some(sub) = stack.pop() {
            if !visited.insert(sub) {
                continue;
            }
            let declares = self.entities[sub.0].children.iter().any(|c| {
                let child = &self.entities[c.0];
                child.kind.is_callable() && child.name == name
            });
            if declares {
                return true;
            }
            if let Some(next) = self.subclasses.get(&sub) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    /// Top-level `name` of `module`, preferring a declaration in `prefer_file`.
    pub fn module_member(&self, module: &str, name: &str, prefer_file: Option<&str>) -> Option<EntityIdx> {
        let candidates = self.module_members.get(module)?.get(name)?;
        prefer_file
            .and_then(|file| {
                candidates
                    .iter()
                    .copied()
                    .find(|c| self.entities[c.0].file == file)
            })
            .or_else(|| candidates.first().copied())
    }

    /// A name declared in an enclosing callable of `scope`. Type bodies are
    /// not searched; their members are reached through `self`/`this`.
    pub fn lexical(&self, scope: EntityIdx, name: &str) -> Option<EntityIdx> {
        let mut current = Some(scope);
        while let Some(idx) = current {
            let entity = &self.entities[idx.0];
            if entity.kind == EntityKind::Module {
                return None;
            }
            if !entity.kind.is_type() {
                if let Some(found) = self.child_named(idx, name) {
                    return Some(found);
                }
            }
            current = entity.parent;
        }
        None
    }

    /// Resolve the first segment of a name through imports and wildcards.
    pub fn imported(&self, file: &FileScope, name: &str) -> Option<Lookup> {
        if let Some(binding) = file.bindings.get(name) {
            return Some(self.resolve_binding(binding));
        }
        for module in &file.wildcards {
            if let Some(found) = self.module_member(module, name, None) {
                return Some(Lookup::Found(found));
            }
        }
        if file.external_wildcard {
            return Some(Lookup::Unresolved(UnresolvedReason::ExternalImport));
        }
        None
    }

    fn resolve_binding(&self, binding: &Binding) -> Lookup {
        match binding {
            Binding::Module(module) => match self.module_entity(module) {
                Some(idx) => Lookup::Found(idx),
                None => Lookup::Unresolved(UnresolvedReason::NoCandidate),
            },
            Binding::Symbol { module, name, owner } => {
                let found = match owner {
                    Some(owner) => self
                        .module_member(module, owner, None)
                        .and_then(|ty| self.member(ty, name).found()),
                    None => self.module_member(module, name, None),
                };
                match found {
                    Some(idx) => Lookup::Found(idx),
                    None => Lookup::Unresolved(UnresolvedReason::UnknownMember),
                }
            }
            Binding::External(_) => Lookup::Unresolved(UnresolvedReason::ExternalImport),
        }
    }

    /// Member `name` of an entity: module members, type members including
    /// inherited methods. Members of values are unknown.
    pub fn member(&self, owner: EntityIdx, name: &str) -> Lookup {
        let entity = &self.entities[owner.0];
        match entity.kind {
            EntityKind::Module => match self.module_member(&entity.module, name, None) {
                Some(idx) => Lookup::Found(idx),
                None => Lookup::Unresolved(UnresolvedReason::UnknownMember),
            },
            kind if kind.is_type() => {
                let found = self
                    .methods
                    .get(&owner)
                    .and_then(|table| table.get(name).copied())
                    .or_else(|| self.child_named(owner, name));
                match found {
                    Some(idx) => Lookup::Found(idx),
                    None if self.has_external_base(owner) => {
                        Lookup::Unresolved(UnresolvedReason::ExternalBase)
                    }
                    None => Lookup::Unresolved(UnresolvedReason::UnknownMember),
                }
            }
            _ => Lookup::Unresolved(UnresolvedReason::UnknownReceiver),
        }
    }

    /// Resolve a dotted path as seen from `scope` in `file`: lexical scope,
    /// then the module, then imports; remaining segments are members.
    pub fn lookup_path(
        &self,
        file: &FileScope,
        scope: Option<EntityIdx>,
        segments: &[&str],
        analyzer: Option<&dyn LanguageAnalyzer>,
    ) -> Lookup {
        let Some((first, _)) = segments.split_first() else {
            return Lookup::Unresolved(UnresolvedReason::NoCandidate);
        };

        let local = scope
            .and_then(|s| self.lexical(s, first))
            .or_else(|| self.module_member(&file.module, first, Some(file.path.as_str())));
        let (mut current, consumed) = match local {
            Some(idx) => (idx, 1),
            None => {
                // `import a.b` binds the dotted name itself
                let bound = (1..=segments.len()).rev().find_map(|k| {
                    let key = segments[..k].join(".");
                    file.bindings.contains_key(&key).then_some((key, k))
                });
                let resolved = match bound {
                    Some((key, k)) => self.imported(file, &key).map(|l| (l, k)),
                    None => self.imported(file, first).map(|l| (l, 1)),
                };
                match resolved {
                    Some((Lookup::Found(idx), k)) => (idx, k),
                    Some((Lookup::Unresolved(reason), _)) => return Lookup::Unresolved(reason),
                    None if analyzer.is_some_and(|a| a.is_builtin(first)) => {
                        return Lookup::Unresolved(UnresolvedReason::ExternalImport)
                    }
                    None => return Lookup::Unresolved(UnresolvedReason::NoCandidate),
                }
            }
        };

        for segment in &segments[consumed..] {
            match self.member(current, segment) {
                Lookup::Found(next) => current = next,
                unresolved => return unresolved,
            }
        }
        Lookup::Found(current)
    }
}
