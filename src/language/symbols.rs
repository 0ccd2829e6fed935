use crate::language::{
    ast::ParamMode,
    scope::ScopeId,
    span::Span,
    types::{parameter_signature, Type},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Global,
    Field,
    LoopControl,
}

#[derive(Clone, Debug)]
pub struct Callable {
    pub params: Vec<Type>,
    pub modes: Vec<ParamMode>,
    pub ret: Type,
    /// Class declaration for methods.
    pub owner: Option<DeclId>,
}

impl Callable {
    pub fn signature(&self) -> String {
        parameter_signature(&self.params)
    }
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub superclass: Option<DeclId>,
    pub scope: ScopeId,
    pub fields: Vec<DeclId>,
    pub type_params: Vec<String>,
    pub auto_constructor: bool,
}

#[derive(Clone, Debug)]
pub enum DeclKind {
    Variable(VarKind),
    Parameter(ParamMode),
    Function(Callable),
    Method(Callable),
    Class(ClassInfo),
    Enum { constants: Vec<String> },
}

/// Anything nameable. `ty` is the declared type for variables, the return
/// type for callables and the declared type itself for classes and enums.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub ty: Type,
    pub scope: ScopeId,
    pub span: Span,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: DeclKind, ty: Type, scope: ScopeId, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            scope,
            span,
        }
    }

    pub fn callable(&self) -> Option<&Callable> {
        match &self.kind {
            DeclKind::Function(callable) | DeclKind::Method(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn callable_mut(&mut self) -> Option<&mut Callable> {
        match &mut self.kind {
            DeclKind::Function(callable) | DeclKind::Method(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn class_info(&self) -> Option<&ClassInfo> {
        match &self.kind {
            DeclKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn class_info_mut(&mut self) -> Option<&mut ClassInfo> {
        match &mut self.kind {
            DeclKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_assignable(&self) -> bool {
        matches!(self.kind, DeclKind::Variable(_) | DeclKind::Parameter(_))
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, DeclKind::Variable(VarKind::Field))
    }

    pub fn enum_ordinal(&self, constant: &str) -> Option<usize> {
        match &self.kind {
            DeclKind::Enum { constants } => constants.iter().position(|name| name == constant),
            _ => None,
        }
    }
}

/// Arena of every declaration made in a session.
#[derive(Clone, Debug, Default)]
pub struct Symbols {
    decls: Vec<Declaration>,
}

impl Symbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, decl: Declaration) -> DeclId {
        self.decls.push(decl);
        DeclId(self.decls.len() - 1)
    }

    pub fn get(&self, id: DeclId) -> &Declaration {
        &self.decls[id.0]
    }

    pub fn get_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.0]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.decls.truncate(len);
    }

    /// `class` and its ancestors, nearest first.
    pub fn class_chain(&self, class: DeclId) -> Vec<DeclId> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = self.get(id).class_info().and_then(|info| info.superclass);
        }
        chain
    }

    pub fn is_subclass(&self, class: DeclId, ancestor: DeclId) -> bool {
        self.class_chain(class).contains(&ancestor)
    }

    /// Every field of `class`, ancestors first.
    pub fn all_fields(&self, class: DeclId) -> Vec<DeclId> {
        let mut fields = Vec::new();
        for id in self.class_chain(class).into_iter().rev() {
            if let Some(info) = self.get(id).class_info() {
                fields.extend(info.fields.iter().copied());
            }
        }
        fields
    }
}
