use crate::language::symbols::DeclId;
use std::collections::{HashMap, HashSet};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Import,
    Class,
    Function,
    Block,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Scope of the superclass, for class scopes only. Walked before the
    /// lexical parent.
    pub superclass: Option<ScopeId>,
    pub owner: Option<DeclId>,
    imports: Vec<ScopeId>,
    names: HashMap<String, DeclId>,
    overloads: HashMap<String, Vec<(String, DeclId)>>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            superclass: None,
            owner: None,
            imports: Vec::new(),
            names: HashMap::new(),
            overloads: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
enum JournalEntry {
    Name {
        scope: ScopeId,
        name: String,
        previous: Option<DeclId>,
    },
    Overload {
        scope: ScopeId,
        name: String,
    },
    Import {
        scope: ScopeId,
    },
}

#[derive(Clone, Debug)]
struct Journal {
    scope_count: usize,
    current: ScopeId,
    stack: Vec<ScopeId>,
    entries: Vec<JournalEntry>,
}

/// Chained name tables, one per lexical region.
///
/// Scopes are never removed (outside a rollback) so ids recorded on tree
/// nodes stay valid after `close`.
#[derive(Clone, Debug)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
    current: ScopeId,
    stack: Vec<ScopeId>,
    journal: Option<Journal>,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, None)],
            current: ScopeId(0),
            stack: Vec::new(),
            journal: None,
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn kind(&self, id: ScopeId) -> ScopeKind {
        self.get(id).kind
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).parent
    }

    pub fn owner(&self, id: ScopeId) -> Option<DeclId> {
        self.get(id).owner
    }

    pub fn set_owner(&mut self, id: ScopeId, owner: DeclId) {
        self.scopes[id.0].owner = Some(owner);
    }

    pub fn set_superclass(&mut self, class_scope: ScopeId, superclass: ScopeId) {
        self.scopes[class_scope.0].superclass = Some(superclass);
    }

    /// Opens a child of the current scope and makes it current.
    pub fn open(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = Some(self.current);
        self.open_with_parent(kind, parent)
    }

    /// Opens a scope with an explicit lexical parent. Import roots have no
    /// parent at all.
    pub fn open_with_parent(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(kind, parent));
        self.stack.push(self.current);
        self.current = id;
        trace!(scope = id.0, ?kind, "open scope");
        id
    }

    /// Re-enters a scope created earlier, e.g. a class scope while its
    /// members are resolved.
    pub fn enter(&mut self, id: ScopeId) {
        self.stack.push(self.current);
        self.current = id;
    }

    /// Leaves the current scope and returns the scope that was current when
    /// it was opened or entered.
    pub fn close(&mut self) -> ScopeId {
        let closed = self.current;
        self.current = self.stack.pop().unwrap_or_else(|| self.global());
        trace!(scope = closed.0, "close scope");
        self.current
    }

    pub fn declare(&mut self, name: &str, decl: DeclId) {
        let scope = self.current;
        self.declare_in(scope, name, decl);
    }

    pub fn declare_in(&mut self, scope: ScopeId, name: &str, decl: DeclId) {
        let previous = self.scopes[scope.0].names.insert(name.to_string(), decl);
        if let Some(journal) = self.journal.as_mut() {
            journal.entries.push(JournalEntry::Name {
                scope,
                name: name.to_string(),
                previous,
            });
        }
    }

    pub fn declare_overload(&mut self, name: &str, signature: &str, decl: DeclId) {
        let scope = self.current;
        self.declare_overload_in(scope, name, signature, decl);
    }

    pub fn declare_overload_in(&mut self, scope: ScopeId, name: &str, signature: &str, decl: DeclId) {
        self.scopes[scope.0]
            .overloads
            .entry(name.to_string())
            .or_default()
            .push((signature.to_string(), decl));
        if let Some(journal) = self.journal.as_mut() {
            journal.entries.push(JournalEntry::Overload {
                scope,
                name: name.to_string(),
            });
        }
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.get(self.current).names.contains_key(name)
    }

    pub fn has_local_in(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope).names.contains_key(name)
    }

    /// True iff the current scope already holds `name` with `signature`.
    pub fn has_overload_collision(&self, name: &str, signature: &str) -> bool {
        self.has_overload_collision_in(self.current, name, signature)
    }

    pub fn has_overload_collision_in(&self, scope: ScopeId, name: &str, signature: &str) -> bool {
        self.get(scope)
            .overloads
            .get(name)
            .is_some_and(|entries| entries.iter().any(|(sig, _)| sig == signature))
    }

    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.lookup_from(self.current, name)
    }

    /// Walks lexical parents (a class level also covers its superclasses),
    /// then the import chain of the root reached.
    pub fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<DeclId> {
        let mut visited = HashSet::new();
        self.find(scope, &mut visited, &|scope| scope.names.get(name).copied())
    }

    pub fn lookup_overload(&self, name: &str, signature: &str) -> Option<DeclId> {
        self.lookup_overload_from(self.current, name, signature)
    }

    pub fn lookup_overload_from(&self, scope: ScopeId, name: &str, signature: &str) -> Option<DeclId> {
        let mut visited = HashSet::new();
        self.find(scope, &mut visited, &|scope| {
            scope
                .overloads
                .get(name)
                .and_then(|entries| entries.iter().find(|(sig, _)| sig == signature))
                .map(|(_, decl)| *decl)
        })
    }

    /// Every visible overload of `name`, nearest scope first. An inner
    /// overload hides an outer one with the same signature.
    pub fn overloads_from(&self, scope: ScopeId, name: &str) -> Vec<(String, DeclId)> {
        let mut found: Vec<(String, DeclId)> = Vec::new();
        let mut visited = HashSet::new();
        self.collect(scope, &mut visited, name, &mut found);
        found
    }

    /// Member lookup that only walks a class and its ancestor class scopes.
    pub fn lookup_member(&self, class_scope: ScopeId, name: &str) -> Option<DeclId> {
        self.class_chain(class_scope)
            .into_iter()
            .find_map(|scope| self.get(scope).names.get(name).copied())
    }

    pub fn member_overloads(&self, class_scope: ScopeId, name: &str) -> Vec<(String, DeclId)> {
        let mut found: Vec<(String, DeclId)> = Vec::new();
        for scope in self.class_chain(class_scope) {
            if let Some(entries) = self.get(scope).overloads.get(name) {
                for (sig, decl) in entries {
                    if !found.iter().any(|(seen, _)| seen == sig) {
                        found.push((sig.clone(), *decl));
                    }
                }
            }
        }
        found
    }

    /// Links an import root into the global scope's import chain.
    pub fn add_import(&mut self, root: ScopeId) {
        let global = self.global();
        self.add_import_to(global, root);
    }

    pub fn add_import_to(&mut self, scope: ScopeId, root: ScopeId) {
        self.scopes[scope.0].imports.push(root);
        if let Some(journal) = self.journal.as_mut() {
            journal.entries.push(JournalEntry::Import { scope });
        }
    }

    pub fn begin_journal(&mut self) {
        self.journal = Some(Journal {
            scope_count: self.scopes.len(),
            current: self.current,
            stack: self.stack.clone(),
            entries: Vec::new(),
        });
    }

    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undoes every insertion made since `begin_journal`.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        trace!(entries = journal.entries.len(), "rollback scope journal");
        for entry in journal.entries.into_iter().rev() {
            match entry {
                JournalEntry::Name {
                    scope,
                    name,
                    previous,
                } => {
                    if let Some(table) = self.scopes.get_mut(scope.0) {
                        match previous {
                            Some(decl) => {
                                table.names.insert(name, decl);
                            }
                            None => {
                                table.names.remove(&name);
                            }
                        }
                    }
                }
                JournalEntry::Overload { scope, name } => {
                    if let Some(table) = self.scopes.get_mut(scope.0) {
                        if let Some(entries) = table.overloads.get_mut(&name) {
                            entries.pop();
                            if entries.is_empty() {
                                table.overloads.remove(&name);
                            }
                        }
                    }
                }
                JournalEntry::Import { scope } => {
                    if let Some(table) = self.scopes.get_mut(scope.0) {
                        table.imports.pop();
                    }
                }
            }
        }
        self.scopes.truncate(journal.scope_count);
        self.current = journal.current;
        self.stack = journal.stack;
    }

    fn class_chain(&self, class_scope: ScopeId) -> Vec<ScopeId> {
        let mut chain = Vec::new();
        let mut current = Some(class_scope);
        while let Some(id) = current {
            if self.kind(id) != ScopeKind::Class || chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = self.get(id).superclass;
        }
        chain
    }

    /// Scopes searched at one lexical level: a class and its ancestors, or
    /// just the scope itself.
    fn level(&self, id: ScopeId) -> Vec<ScopeId> {
        match self.kind(id) {
            ScopeKind::Class => self.class_chain(id),
            _ => vec![id],
        }
    }

    fn find(
        &self,
        start: ScopeId,
        visited: &mut HashSet<ScopeId>,
        select: &dyn Fn(&Scope) -> Option<DeclId>,
    ) -> Option<DeclId> {
        let mut current = start;
        loop {
            if visited.contains(&current) {
                return None;
            }
            for id in self.level(current) {
                if !visited.insert(id) {
                    continue;
                }
                if let Some(found) = select(self.get(id)) {
                    return Some(found);
                }
            }
            match self.get(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        let root = self.get(current);
        for import in &root.imports {
            if let Some(found) = self.find(*import, visited, select) {
                return Some(found);
            }
        }
        None
    }

    fn collect(
        &self,
        start: ScopeId,
        visited: &mut HashSet<ScopeId>,
        name: &str,
        found: &mut Vec<(String, DeclId)>,
    ) {
        let mut current = start;
        loop {
            if visited.contains(&current) {
                return;
            }
            for id in self.level(current) {
                if !visited.insert(id) {
                    continue;
                }
                if let Some(entries) = self.get(id).overloads.get(name) {
                    for (sig, decl) in entries {
                        if !found.iter().any(|(seen, _)| seen == sig) {
                            found.push((sig.clone(), *decl));
                        }
                    }
                }
            }
            match self.get(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        let imports = self.get(current).imports.clone();
        for import in imports {
            self.collect(import, visited, name, found);
        }
    }
}

#[cfg(test)]
mod tests;
