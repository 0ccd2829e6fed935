use crate::language::{
    ast::*,
    context::template_signature,
    errors::{Diagnostic, Diagnostics, ErrorCode},
    passes::{
        resolve::resolve_instance,
        walk::{self, TypeVisitor},
    },
    span::Span,
    symbols::{DeclId, DeclKind},
    types::{assignment_compatible, CollectionKind, Type},
    Context,
};
use tracing::{debug, instrument};

/// Rewrites every class-shaped type reference into the type it names and
/// instantiates applied generics. Instantiations are appended to `program`.
#[instrument(level = "debug", skip_all)]
pub fn validate_program(ctx: &mut Context, program: &mut Program, diags: &mut Diagnostics) {
    let mut validator = Validator {
        ctx,
        diags,
        instances: Vec::new(),
    };
    validator.validate_items(&mut program.items);
    let instances = validator.instances;
    if !instances.is_empty() {
        debug!(count = instances.len(), "appending instantiations");
    }
    program.items.extend(instances);
}

enum Named {
    Enum(Type),
    Class(usize),
    Other,
}

struct Validator<'a> {
    ctx: &'a mut Context,
    diags: &'a mut Diagnostics,
    instances: Vec<Item>,
}

impl<'a> Validator<'a> {
    fn validate_items(&mut self, items: &mut [Item]) {
        for item in items.iter_mut() {
            match item {
                Item::Import(import) => {
                    if let Some(unit) = import.unit.as_deref_mut() {
                        self.validate_items(&mut unit.items);
                    }
                }
                Item::Class(class) if !class.is_generic() => walk::walk_class(self, class),
                Item::Function(function) if !function.is_generic() => {
                    walk::walk_function(self, function)
                }
                Item::Global(var) => walk::walk_var(self, var),
                Item::Statement(stmt) => walk::walk_stmt(self, stmt),
                Item::Main(block) => walk::walk_block(self, block),
                Item::Class(_) | Item::Function(_) | Item::Enum(_) => {}
            }
        }
    }

    fn error(&mut self, diagnostic: Diagnostic) {
        self.diags.push(diagnostic);
    }

    fn resolve_type(&mut self, ty: &Type, span: Span) -> Type {
        match ty {
            Type::Class { name, args } => self.resolve_named(name, args, span),
            Type::List { base, dims } => {
                let base = self.resolve_type(base, span);
                Type::collection(CollectionKind::List, base, *dims)
            }
            Type::Array { base, dims } => {
                let base = self.resolve_type(base, span);
                Type::collection(CollectionKind::Array, base, *dims)
            }
            Type::Multi { initial, members } => Type::Multi {
                initial: Box::new(self.resolve_type(initial, span)),
                members: members
                    .iter()
                    .map(|member| self.resolve_type(member, span))
                    .collect(),
            },
            Type::Param(name) => {
                self.error(Diagnostic::new(ErrorCode::UnknownType, span).arg(name));
                Type::Unknown
            }
            other => other.clone(),
        }
    }

    fn resolve_named(&mut self, name: &str, args: &[Type], span: Span) -> Type {
        let global = self.ctx.scopes.global();
        let Some(id) = self.ctx.scopes.lookup_from(global, name) else {
            self.error(Diagnostic::new(ErrorCode::UnknownType, span).arg(name));
            return Type::Unknown;
        };
        let decl = self.ctx.symbols.get(id);
        let named = match &decl.kind {
            DeclKind::Enum { .. } => Named::Enum(decl.ty.clone()),
            DeclKind::Class(info) => Named::Class(info.type_params.len()),
            _ => Named::Other,
        };
        match named {
            Named::Enum(ty) => {
                if !args.is_empty() {
                    self.arity_error(name, 0, args.len(), span);
                }
                ty
            }
            Named::Class(0) => {
                if !args.is_empty() {
                    self.arity_error(name, 0, args.len(), span);
                    return Type::Unknown;
                }
                Type::class(name)
            }
            Named::Class(expected) => {
                if args.len() != expected {
                    self.arity_error(name, expected, args.len(), span);
                    return Type::Unknown;
                }
                let args: Vec<Type> = args.iter().map(|arg| self.resolve_type(arg, span)).collect();
                if args.iter().any(Type::is_unknown) {
                    return Type::Unknown;
                }
                if self.instantiate_class(name, &args, span) {
                    Type::generic(name, args)
                } else {
                    Type::Unknown
                }
            }
            Named::Other => {
                self.error(Diagnostic::new(ErrorCode::NotAClass, span).arg(name));
                Type::Unknown
            }
        }
    }

    fn arity_error(&mut self, name: &str, expected: usize, found: usize, span: Span) {
        self.error(
            Diagnostic::new(ErrorCode::GenericArity, span)
                .arg(name)
                .arg(expected)
                .arg(found),
        );
    }

    /// First argument that does not satisfy its parameter's bound.
    fn bound_violation(&mut self, params: &[TypeParam], args: &[Type], span: Span) -> Option<(Type, Type)> {
        for (param, arg) in params.iter().zip(args) {
            let Some(bound) = &param.bound else {
                continue;
            };
            let bound = self.resolve_type(bound, span);
            let satisfied = match (self.ctx.class_of(arg), self.ctx.class_of(&bound)) {
                (Some(class), Some(ancestor)) => self.ctx.symbols.is_subclass(class, ancestor),
                _ => assignment_compatible(&bound, arg),
            };
            if !satisfied {
                return Some((arg.clone(), bound));
            }
        }
        None
    }

    fn bounds_hold(&mut self, generic: &str, params: &[TypeParam], args: &[Type], span: Span) -> bool {
        let Some((arg, bound)) = self.bound_violation(params, args, span) else {
            return true;
        };
        self.error(
            Diagnostic::new(ErrorCode::GenericBound, span)
                .arg(&arg)
                .arg(&bound)
                .arg(generic),
        );
        false
    }

    /// Makes sure `name<args>` exists as a class. The cache entry is added
    /// before the instance is validated so self-references terminate.
    fn instantiate_class(&mut self, name: &str, args: &[Type], span: Span) -> bool {
        let applied = Type::generic(name, args.to_vec());
        let key = applied.to_string();
        if self.ctx.instance(&key).is_some() {
            return true;
        }
        let Some(template) = self.ctx.class_template(name).cloned() else {
            return false;
        };
        if !self.bounds_hold(name, &template.type_params, args, span) {
            return false;
        }
        let mut instance = template.clone();
        instance.name = key.clone();
        instance.type_params.clear();
        for (param, arg) in template.type_params.iter().zip(args) {
            let mut substitute = Substitute {
                param: &param.name,
                arg,
                owner: name,
            };
            if let Some(superclass) = &mut instance.superclass {
                substitute.visit_type(superclass, span);
            }
            walk::walk_class(&mut substitute, &mut instance);
        }
        debug!(%key, "instantiating class");
        let mut item = Item::Class(instance);
        resolve_instance(self.ctx, &mut item, self.diags);
        let Item::Class(instance) = &mut item else {
            return false;
        };
        let Some(id) = instance.id else {
            return false;
        };
        self.ctx.add_instance(&key, id);
        self.ctx.symbols.get_mut(id).ty = applied;
        walk::walk_class(self, instance);
        self.instances.push(item);
        true
    }

    /// Instantiates every overload of `call.name` that takes this many type
    /// arguments and call arguments and whose bounds hold. The checker then
    /// picks among the instances by argument types.
    fn instantiate_function(&mut self, call: &Call, span: Span) {
        if call.type_args.iter().any(Type::is_unknown) {
            return;
        }
        let templates: Vec<FunctionDecl> = self
            .ctx
            .function_templates(&call.name)
            .into_iter()
            .cloned()
            .collect();
        let Some(first) = templates.first() else {
            self.error(Diagnostic::new(ErrorCode::Undeclared, span).arg(call.lookup_name()));
            return;
        };
        let expected = first.type_params.len();
        let arity: Vec<&FunctionDecl> = templates
            .iter()
            .filter(|template| template.type_params.len() == call.type_args.len())
            .collect();
        if arity.is_empty() {
            self.arity_error(&call.name, expected, call.type_args.len(), span);
            return;
        }
        let by_count: Vec<&FunctionDecl> = arity
            .iter()
            .copied()
            .filter(|template| template.params.len() == call.args.len())
            .collect();
        // With no match by argument count every overload is instantiated so
        // the checker can report the mismatch against them.
        let candidates = if by_count.is_empty() { arity } else { by_count };
        let mut violated = None;
        let mut instantiated = false;
        for template in candidates {
            if self.bound_violation(&template.type_params, &call.type_args, span).is_some() {
                violated.get_or_insert(template);
                continue;
            }
            instantiated = true;
            self.instantiate_overload(call, template, span);
        }
        if let (false, Some(template)) = (instantiated, violated) {
            self.bounds_hold(&call.name, &template.type_params, &call.type_args, span);
        }
    }

    fn instantiate_overload(&mut self, call: &Call, template: &FunctionDecl, span: Span) {
        let key = call.lookup_name();
        let cache_key = instance_key(&key, template);
        if self.ctx.instance(&cache_key).is_some() {
            return;
        }
        let mut instance = template.clone();
        instance.name = key.clone();
        instance.type_params.clear();
        for (param, arg) in template.type_params.iter().zip(&call.type_args) {
            let mut substitute = Substitute {
                param: &param.name,
                arg,
                owner: &call.name,
            };
            walk::walk_function(&mut substitute, &mut instance);
        }
        debug!(%key, "instantiating function");
        let mut item = Item::Function(instance);
        resolve_instance(self.ctx, &mut item, self.diags);
        let Item::Function(instance) = &mut item else {
            return;
        };
        let Some(id) = instance.id else {
            return;
        };
        self.ctx.add_instance(&cache_key, id);
        walk::walk_function(self, instance);
        self.instances.push(item);
    }

    fn update_decl(&mut self, decl: Option<DeclId>, ty: &Type) {
        if let Some(id) = decl {
            self.ctx.symbols.get_mut(id).ty = ty.clone();
        }
    }
}

impl TypeVisitor for Validator<'_> {
    fn visit_type(&mut self, ty: &mut Type, span: Span) {
        *ty = self.resolve_type(ty, span);
    }

    fn visit_decl(&mut self, decl: Option<DeclId>, ty: &mut Type, span: Span) {
        *ty = self.resolve_type(ty, span);
        self.update_decl(decl, ty);
    }

    fn visit_signature(&mut self, function: &FunctionDecl) {
        let Some(id) = function.id else {
            return;
        };
        let decl = self.ctx.symbols.get_mut(id);
        decl.ty = function.ret.clone();
        if let Some(callable) = decl.callable_mut() {
            callable.params = function.params.iter().map(|p| p.ty.clone()).collect();
            callable.ret = function.ret.clone();
        }
    }

    fn visit_call(&mut self, call: &mut Call, span: Span) {
        if !call.type_args.is_empty() {
            self.instantiate_function(call, span);
        }
    }
}

/// Cache key of one generic function overload applied to type arguments,
/// e.g. `pick<Int>` + `<1>#0,#0`.
fn instance_key(applied: &str, template: &FunctionDecl) -> String {
    format!("{applied}{}", template_signature(template))
}

/// Replaces one type parameter throughout a template copy.
struct Substitute<'t> {
    param: &'t str,
    arg: &'t Type,
    owner: &'t str,
}

impl TypeVisitor for Substitute<'_> {
    fn visit_type(&mut self, ty: &mut Type, _span: Span) {
        *ty = ty.instantiate(self.param, self.arg, self.owner);
    }
}
