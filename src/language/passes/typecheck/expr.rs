use super::Checker;
use crate::language::{
    ast::*,
    errors::{Diagnostic, ErrorCode},
    passes::resolve::enum_reference,
    span::Span,
    symbols::DeclId,
    types::{assignment_compatible, parameter_signature, CollectionKind, Discrete, Scalar, Type},
};

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Bool(_) => Type::bool(),
        Literal::Char(_) => Type::char(),
        Literal::Int(_) => Type::int(),
        Literal::Real(_) => Type::real(),
        Literal::String(_) => Type::string(),
        Literal::Text(_) => Type::text(),
    }
}

fn describe(types: &[Type]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

enum Lookup {
    Found(DeclId),
    NoMember,
    NoMatch,
}

impl Checker<'_> {
    pub(super) fn expr(&mut self, expr: &mut Expr) -> Type {
        let ty = self.infer(expr);
        expr.ty = Some(ty.clone());
        ty
    }

    /// Types the target of an assignment or input and reports targets that
    /// cannot be written to.
    pub(super) fn assign_target(&mut self, target: &mut Expr) -> Type {
        let assignable = match &target.kind {
            ExprKind::Name(name) => name
                .decl
                .map_or(true, |id| self.ctx.symbols.get(id).is_assignable()),
            ExprKind::Field { object, .. } => enum_reference(&*self.ctx, object).is_none(),
            ExprKind::Index { .. } => true,
            _ => false,
        };
        let ty = self.expr(target);
        if assignable {
            ty
        } else {
            self.error(Diagnostic::new(ErrorCode::NotAssignable, target.span));
            Type::Unknown
        }
    }

    /// Class declaration that `new` or `retype` may construct from `ty`.
    pub(super) fn instantiable_class(&self, ty: &Type) -> Option<DeclId> {
        let Type::Class { .. } = ty else {
            return None;
        };
        let id = self.ctx.class_of(ty)?;
        let generic = self
            .ctx
            .symbols
            .get(id)
            .class_info()
            .is_some_and(|info| !info.type_params.is_empty());
        (!generic).then_some(id)
    }

    pub(super) fn check_field_inits(&mut self, class: DeclId, class_ty: &Type, fields: &mut [FieldInit]) {
        let Some(scope) = self.ctx.symbols.get(class).class_info().map(|info| info.scope) else {
            return;
        };
        for field in fields {
            let found = self.expr(&mut field.value);
            let member = self
                .ctx
                .scopes
                .lookup_member(scope, &field.name)
                .filter(|id| self.ctx.symbols.get(*id).is_field());
            match member {
                Some(id) => {
                    let expected = self.ctx.symbols.get(id).ty.clone();
                    self.expect_compatible(&expected, &found, field.value.span);
                }
                None => self.error(
                    Diagnostic::new(ErrorCode::UnknownMember, field.span)
                        .arg(class_ty)
                        .arg(&field.name),
                ),
            }
        }
    }

    /// Exact signature first, then the first overload whose parameters
    /// accept the argument types.
    fn select_overload(&self, candidates: &[(String, DeclId)], args: &[Type]) -> Option<DeclId> {
        let signature = parameter_signature(args);
        if let Some((_, id)) = candidates.iter().find(|(sig, _)| *sig == signature) {
            return Some(*id);
        }
        candidates.iter().map(|(_, id)| *id).find(|id| {
            self.ctx.symbols.get(*id).callable().is_some_and(|callable| {
                callable.params.len() == args.len()
                    && callable
                        .params
                        .iter()
                        .zip(args)
                        .all(|(param, arg)| assignment_compatible(param, arg))
            })
        })
    }

    fn return_type(&self, id: DeclId) -> Type {
        self.ctx
            .symbols
            .get(id)
            .callable()
            .map(|callable| callable.ret.clone())
            .unwrap_or(Type::Unknown)
    }

    /// Looks `name` up among the methods of every class `ty` may hold.
    fn find_method(&self, ty: &Type, name: &str, args: &[Type]) -> Lookup {
        let mut any = false;
        for class in self.ctx.classes_of(ty) {
            let Some(scope) = self.ctx.symbols.get(class).class_info().map(|info| info.scope) else {
                continue;
            };
            let candidates = self.ctx.scopes.member_overloads(scope, name);
            if candidates.is_empty() {
                continue;
            }
            any = true;
            if let Some(id) = self.select_overload(&candidates, args) {
                return Lookup::Found(id);
            }
        }
        if any {
            Lookup::NoMatch
        } else {
            Lookup::NoMember
        }
    }

    fn infer(&mut self, expr: &mut Expr) -> Type {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Literal(literal) => literal_type(literal),
            ExprKind::Name(name) => {
                let Some(id) = name.decl else {
                    return Type::Unknown;
                };
                let decl = self.ctx.symbols.get(id);
                if decl.is_assignable() {
                    decl.ty.clone()
                } else {
                    let name = decl.name.clone();
                    self.error(Diagnostic::new(ErrorCode::NotAValue, span).arg(name));
                    Type::Unknown
                }
            }
            ExprKind::This => self
                .class
                .map(|id| self.ctx.symbols.get(id).ty.clone())
                .unwrap_or(Type::Unknown),
            ExprKind::Super => self
                .class
                .and_then(|id| self.ctx.symbols.get(id).class_info().and_then(|i| i.superclass))
                .map(|id| self.ctx.symbols.get(id).ty.clone())
                .unwrap_or(Type::Unknown),
            ExprKind::Console | ExprKind::Stream { .. } => Type::Unknown,
            ExprKind::Binary {
                op,
                left,
                right,
                overload,
            } => {
                let op = *op;
                let left_ty = self.expr(left);
                let right_ty = self.expr(right);
                self.binary(op, &left_ty, &right_ty, overload, span)
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let ty = self.expr(operand);
                match op {
                    _ if ty.is_unknown() => Type::Unknown,
                    UnaryOp::Neg if ty.is_numeric() => ty,
                    UnaryOp::Not if ty.is_bool() => ty,
                    _ => {
                        self.error(Diagnostic::new(ErrorCode::UnaryOperand, span).arg(op.symbol()).arg(&ty));
                        Type::Unknown
                    }
                }
            }
            ExprKind::Call(call) => self.call(call, span),
            ExprKind::MethodCall(call) => self.method_call(call, span),
            ExprKind::Field { object, name, decl } => {
                if let Some(enum_id) = enum_reference(&*self.ctx, object) {
                    let ty = self.ctx.symbols.get(enum_id).ty.clone();
                    object.ty = Some(ty.clone());
                    return ty;
                }
                let object_ty = self.expr(object);
                if object_ty.is_unknown() {
                    return Type::Unknown;
                }
                if !object_ty.is_object() {
                    self.error(Diagnostic::new(ErrorCode::NotAnObject, object.span).arg(&object_ty));
                    return Type::Unknown;
                }
                let member = name.clone();
                let found = self.ctx.classes_of(&object_ty).into_iter().find_map(|class| {
                    let scope = self.ctx.symbols.get(class).class_info()?.scope;
                    self.ctx
                        .scopes
                        .lookup_member(scope, &member)
                        .filter(|id| self.ctx.symbols.get(*id).is_field())
                });
                match found {
                    Some(id) => {
                        *decl = Some(id);
                        self.ctx.symbols.get(id).ty.clone()
                    }
                    None => {
                        self.error(
                            Diagnostic::new(ErrorCode::UnknownMember, span)
                                .arg(&object_ty)
                                .arg(member),
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::Index { base, indices } => {
                let base_ty = self.expr(base);
                for index in indices.iter_mut() {
                    let ty = self.expr(index);
                    if !ty.is_unknown() && ty != Type::int() {
                        self.error(Diagnostic::new(ErrorCode::IndexNotInt, index.span).arg(&ty));
                    }
                }
                if base_ty.is_unknown() {
                    return Type::Unknown;
                }
                match base_ty.indexed(indices.len()) {
                    Some(ty) => ty,
                    None => {
                        self.error(
                            Diagnostic::new(ErrorCode::NotIndexable, span)
                                .arg(&base_ty)
                                .arg(indices.len()),
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::New {
                class,
                args,
                constructor,
            } => {
                if class.is_unknown() {
                    return Type::Unknown;
                }
                let Some(class_id) = self.instantiable_class(class) else {
                    self.error(Diagnostic::new(ErrorCode::NotAClass, span).arg(&*class));
                    return Type::Unknown;
                };
                let class_ty = class.clone();
                match args {
                    NewArgs::Named(fields) => self.check_field_inits(class_id, &class_ty, fields),
                    NewArgs::Positional(values) => {
                        let arg_types: Vec<Type> = values.iter_mut().map(|v| self.expr(v)).collect();
                        match self.find_method(&class_ty, "new", &arg_types) {
                            Lookup::Found(id) => *constructor = Some(id),
                            _ => self.error(
                                Diagnostic::new(ErrorCode::ArgumentMismatch, span)
                                    .arg(format!("{class_ty}.new"))
                                    .arg(describe(&arg_types)),
                            ),
                        }
                    }
                }
                class_ty
            }
            ExprKind::ArrayNew { element, sizes } => {
                for size in sizes.iter_mut() {
                    let ty = self.expr(size);
                    if !ty.is_unknown() && ty != Type::int() {
                        self.error(Diagnostic::new(ErrorCode::IndexNotInt, size.span).arg(&ty));
                    }
                }
                Type::array(element.clone(), sizes.len())
            }
            ExprKind::Collection { kind, elements } => {
                let kind = *kind;
                let mut element_ty: Option<Type> = None;
                for element in elements.iter_mut() {
                    let ty = self.expr(element);
                    match &element_ty {
                        None => element_ty = Some(ty),
                        Some(first) => {
                            let first = first.clone();
                            self.expect_compatible(&first, &ty, element.span);
                        }
                    }
                }
                Type::collection(kind, element_ty.unwrap_or(Type::Void), 1)
            }
            ExprKind::Cast { target, operand } => {
                let from = self.expr(operand);
                if !self.cast_allowed(&from, target) {
                    self.error(Diagnostic::new(ErrorCode::InvalidCast, span).arg(&from).arg(&*target));
                }
                target.clone()
            }
            ExprKind::InstanceOf { operand, class } => {
                let ty = self.expr(operand);
                if !ty.is_object() && !ty.is_unknown() {
                    self.error(Diagnostic::new(ErrorCode::NotAnObject, operand.span).arg(&ty));
                }
                if !class.is_unknown() && self.ctx.class_of(class).is_none() {
                    self.error(Diagnostic::new(ErrorCode::NotAClass, span).arg(&*class));
                }
                Type::bool()
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Type,
        right: &Type,
        overload: &mut Option<DeclId>,
        span: Span,
    ) -> Type {
        let comparison = op.is_equality() || op.is_ordering() || op.is_logical();
        if left.is_unknown() || right.is_unknown() {
            return if comparison { Type::bool() } else { Type::Unknown };
        }
        if left.is_object() && !op.is_equality() {
            let method = operator_method_name(op);
            if let Lookup::Found(id) = self.find_method(left, &method, std::slice::from_ref(right)) {
                *overload = Some(id);
                return self.return_type(id);
            }
        }
        let same = left.signature() == right.signature() && assignment_compatible(left, right);
        let result = if op.is_arithmetic() {
            let textual_concat = op == BinaryOp::Add && left.is_textual();
            (same && (left.is_numeric() || textual_concat)).then(|| left.clone())
        } else if op.is_ordering() {
            (same && left.is_orderable()).then(Type::bool)
        } else if op.is_equality() {
            (assignment_compatible(left, right) || assignment_compatible(right, left)).then(Type::bool)
        } else {
            (left.is_bool() && right.is_bool()).then(Type::bool)
        };
        match result {
            Some(ty) => ty,
            None => {
                self.error(
                    Diagnostic::new(ErrorCode::IncompatibleOperands, span)
                        .arg(op.symbol())
                        .arg(left)
                        .arg(right),
                );
                if comparison {
                    Type::bool()
                } else {
                    Type::Unknown
                }
            }
        }
    }

    fn call(&mut self, call: &mut Call, span: Span) -> Type {
        let arg_types: Vec<Type> = call.args.iter_mut().map(|arg| self.expr(arg)).collect();
        let name = call.lookup_name();
        let scope = call.scope.unwrap_or_else(|| self.ctx.scopes.global());
        let candidates = self.ctx.scopes.overloads_from(scope, &name);
        if candidates.is_empty() {
            // A failed instantiation was already reported by validation.
            if call.type_args.is_empty() || self.ctx.function_templates(&call.name).is_empty() {
                self.error(Diagnostic::new(ErrorCode::Undeclared, span).arg(&name));
            }
            return Type::Unknown;
        }
        match self.select_overload(&candidates, &arg_types) {
            Some(id) => {
                call.target = Some(id);
                self.return_type(id)
            }
            None => {
                self.error(
                    Diagnostic::new(ErrorCode::ArgumentMismatch, span)
                        .arg(&name)
                        .arg(describe(&arg_types)),
                );
                Type::Unknown
            }
        }
    }

    fn method_call(&mut self, call: &mut MethodCall, span: Span) -> Type {
        let receiver = self.expr(&mut call.receiver);
        let arg_types: Vec<Type> = call.args.iter_mut().map(|arg| self.expr(arg)).collect();
        if receiver.is_unknown() {
            return Type::Unknown;
        }
        if receiver.is_object() {
            return match self.find_method(&receiver, &call.name, &arg_types) {
                Lookup::Found(id) => {
                    call.target = Some(id);
                    self.return_type(id)
                }
                Lookup::NoMember => {
                    self.error(
                        Diagnostic::new(ErrorCode::UnknownMember, span)
                            .arg(&receiver)
                            .arg(&call.name),
                    );
                    Type::Unknown
                }
                Lookup::NoMatch => {
                    self.error(
                        Diagnostic::new(ErrorCode::ArgumentMismatch, span)
                            .arg(&call.name)
                            .arg(describe(&arg_types)),
                    );
                    Type::Unknown
                }
            };
        }
        let Some((builtin, ty)) = self.builtin(&receiver, &call.name, &arg_types) else {
            let code = if receiver.collection_parts().is_some() || receiver.is_textual() {
                ErrorCode::UnknownMember
            } else {
                ErrorCode::NotAnObject
            };
            let diagnostic = match code {
                ErrorCode::UnknownMember => Diagnostic::new(code, span).arg(&receiver).arg(&call.name),
                _ => Diagnostic::new(code, call.receiver.span).arg(&receiver),
            };
            self.error(diagnostic);
            return Type::Unknown;
        };
        match ty {
            Some(ty) => {
                call.builtin = Some(builtin);
                ty
            }
            None => {
                self.error(
                    Diagnostic::new(ErrorCode::ArgumentMismatch, span)
                        .arg(&call.name)
                        .arg(describe(&arg_types)),
                );
                Type::Unknown
            }
        }
    }

    /// Runtime-provided members of lists, arrays and strings. The inner
    /// option is `None` when the member exists but rejects the arguments.
    fn builtin(&self, receiver: &Type, name: &str, args: &[Type]) -> Option<(Builtin, Option<Type>)> {
        let accepts = |expected: &[Type]| {
            expected.len() == args.len()
                && expected
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| assignment_compatible(param, arg))
        };
        if receiver.is_textual() {
            return (name == "length").then(|| (Builtin::Length, accepts(&[]).then(Type::int)));
        }
        let (kind, _, _) = receiver.collection_parts()?;
        let element = receiver.element()?;
        let list = kind == CollectionKind::List;
        let entry = match name {
            "size" => (Builtin::Size, accepts(&[]).then(Type::int)),
            "contains" => (Builtin::Contains, accepts(&[element]).then(Type::bool)),
            "append" if list => (Builtin::Append, accepts(&[element]).then_some(Type::Void)),
            "insert" if list => (
                Builtin::Insert,
                accepts(&[Type::int(), element]).then_some(Type::Void),
            ),
            "remove" if list => (Builtin::Remove, accepts(&[Type::int()]).then_some(Type::Void)),
            _ => return None,
        };
        Some(entry)
    }

    fn cast_allowed(&self, from: &Type, to: &Type) -> bool {
        if from.is_unknown() || to.is_unknown() || assignment_compatible(to, from) {
            return true;
        }
        match (from, to) {
            (Type::Discrete(Discrete::Int), Type::Scalar(Scalar::Real))
            | (Type::Scalar(Scalar::Real), Type::Discrete(Discrete::Int))
            | (Type::Discrete(Discrete::Int), Type::Discrete(Discrete::Char))
            | (Type::Discrete(Discrete::Char), Type::Discrete(Discrete::Int))
            | (Type::Enum { .. }, Type::Discrete(Discrete::Int))
            | (Type::Discrete(Discrete::Int), Type::Enum { .. }) => true,
            (from, to) if to.is_textual() => from.is_primitive() || matches!(from, Type::Enum { .. }),
            (from, Type::Discrete(_) | Type::Scalar(Scalar::Real)) if from.is_textual() => true,
            (from, to) if from.is_object() && to.is_object() => {
                match (self.ctx.class_of(from), self.ctx.class_of(to)) {
                    (Some(a), Some(b)) => {
                        self.ctx.symbols.is_subclass(a, b) || self.ctx.symbols.is_subclass(b, a)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }
}
