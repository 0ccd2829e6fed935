use crate::language::{
    ast::{ClassDecl, FunctionDecl},
    scope::ScopeTable,
    symbols::{DeclId, DeclKind, Symbols},
    types::{parameter_signature, Type},
};
use std::collections::HashMap;

/// Generic declaration kept aside until it is applied to type arguments.
#[derive(Clone, Debug)]
pub enum Template {
    Class(ClassDecl),
    Function(FunctionDecl),
}

/// Overload key of a generic function: type-parameter count plus the
/// parameter signature with type parameters numbered by position, so
/// `f<T>(T)` and `f<U>(U)` collide.
pub fn template_signature(function: &FunctionDecl) -> String {
    let params: Vec<Type> = function
        .params
        .iter()
        .map(|param| {
            function
                .type_params
                .iter()
                .enumerate()
                .fold(param.ty.clone(), |ty, (idx, type_param)| {
                    ty.instantiate(&type_param.name, &Type::Param(format!("#{idx}")), &function.name)
                })
        })
        .collect();
    format!("<{}>{}", function.type_params.len(), parameter_signature(&params))
}

#[derive(Clone, Debug)]
struct Journal {
    symbols: usize,
    templates: Vec<String>,
    instances: Vec<String>,
    retyped: Vec<(DeclId, Type)>,
}

/// Semantic state shared by every pass of one session.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pub scopes: ScopeTable,
    pub symbols: Symbols,
    templates: HashMap<String, Vec<Template>>,
    instances: HashMap<String, DeclId>,
    journal: Option<Journal>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generic functions may be overloaded, so templates accumulate per name.
    pub fn add_template(&mut self, name: &str, template: Template) {
        self.templates.entry(name.to_string()).or_default().push(template);
        if let Some(journal) = self.journal.as_mut() {
            journal.templates.push(name.to_string());
        }
    }

    pub fn class_template(&self, name: &str) -> Option<&ClassDecl> {
        self.templates.get(name)?.iter().find_map(|template| match template {
            Template::Class(class) => Some(class),
            Template::Function(_) => None,
        })
    }

    pub fn function_templates(&self, name: &str) -> Vec<&FunctionDecl> {
        self.templates
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|template| match template {
                Template::Function(function) => Some(function),
                Template::Class(_) => None,
            })
            .collect()
    }

    /// Declaration produced for an applied generic such as `Box<Int>`.
    pub fn instance(&self, key: &str) -> Option<DeclId> {
        self.instances.get(key).copied()
    }

    pub fn add_instance(&mut self, key: &str, decl: DeclId) {
        self.instances.insert(key.to_string(), decl);
        if let Some(journal) = self.journal.as_mut() {
            journal.instances.push(key.to_string());
        }
    }

    /// Changes the type of an existing declaration, as `retype` does.
    /// Declarations older than the open journal get their type back on
    /// rollback.
    pub fn retype_decl(&mut self, id: DeclId, ty: Type) {
        let previous = std::mem::replace(&mut self.symbols.get_mut(id).ty, ty);
        if let Some(journal) = self.journal.as_mut() {
            if id.0 < journal.symbols {
                journal.retyped.push((id, previous));
            }
        }
    }

    /// Class declaration a value of `ty` starts out as.
    pub fn class_of(&self, ty: &Type) -> Option<DeclId> {
        let key = ty.class_key()?;
        self.class_named(&key)
    }

    /// Every class a value of `ty` may hold; the initial class comes first.
    pub fn classes_of(&self, ty: &Type) -> Vec<DeclId> {
        let mut classes: Vec<DeclId> = self.class_of(ty).into_iter().collect();
        for key in ty.member_keys() {
            if let Some(id) = self.class_named(&key) {
                if !classes.contains(&id) {
                    classes.push(id);
                }
            }
        }
        classes
    }

    pub fn class_named(&self, key: &str) -> Option<DeclId> {
        let id = self.scopes.lookup_from(self.scopes.global(), key)?;
        matches!(self.symbols.get(id).kind, DeclKind::Class(_)).then_some(id)
    }

    pub fn begin_journal(&mut self) {
        self.scopes.begin_journal();
        self.journal = Some(Journal {
            symbols: self.symbols.len(),
            templates: Vec::new(),
            instances: Vec::new(),
            retyped: Vec::new(),
        });
    }

    pub fn commit(&mut self) {
        self.scopes.commit();
        self.journal = None;
    }

    pub fn rollback(&mut self) {
        self.scopes.rollback();
        if let Some(journal) = self.journal.take() {
            self.symbols.truncate(journal.symbols);
            for (id, ty) in journal.retyped.into_iter().rev() {
                self.symbols.get_mut(id).ty = ty;
            }
            for key in journal.templates.into_iter().rev() {
                if let Some(entries) = self.templates.get_mut(&key) {
                    entries.pop();
                    if entries.is_empty() {
                        self.templates.remove(&key);
                    }
                }
            }
            for key in journal.instances {
                self.instances.remove(&key);
            }
        }
    }
}
