use crate::language::{
    ast::*,
    context::{template_signature, Template},
    errors::{Diagnostic, Diagnostics, ErrorCode},
    scope::{ScopeId, ScopeKind},
    span::Span,
    symbols::{Callable, ClassInfo, DeclId, DeclKind, Declaration, VarKind},
    types::{parameter_signature, Type},
    Context,
};
use std::collections::HashSet;
use tracing::{debug, instrument, trace};

/// Binds every name in `program` to a declaration.
#[instrument(level = "debug", skip_all, fields(items = program.items.len()))]
pub fn resolve_program(ctx: &mut Context, program: &mut Program, diags: &mut Diagnostics) {
    let mut resolver = Resolver::new(ctx, diags);
    resolver.resolve_items(&mut program.items);
}

/// Hoists and resolves one instantiated generic item in the global scope.
pub fn resolve_instance(ctx: &mut Context, item: &mut Item, diags: &mut Diagnostics) {
    let global = ctx.scopes.global();
    ctx.scopes.enter(global);
    let mut items = vec![std::mem::replace(item, Item::Main(Block::default()))];
    Resolver::new(ctx, diags).resolve_items(&mut items);
    if let Some(resolved) = items.pop() {
        *item = resolved;
    }
    ctx.scopes.close();
}

#[derive(Clone, Copy)]
struct ClassContext {
    has_superclass: bool,
}

struct Resolver<'a> {
    ctx: &'a mut Context,
    diags: &'a mut Diagnostics,
    loop_depth: usize,
    class: Option<ClassContext>,
    in_method: bool,
}

impl<'a> Resolver<'a> {
    fn new(ctx: &'a mut Context, diags: &'a mut Diagnostics) -> Self {
        Self {
            ctx,
            diags,
            loop_depth: 0,
            class: None,
            in_method: false,
        }
    }

    fn error(&mut self, diagnostic: Diagnostic) {
        trace!(%diagnostic, "resolve error");
        self.diags.push(diagnostic);
    }

    fn add_decl(&mut self, name: &str, kind: DeclKind, ty: Type, span: Span) -> DeclId {
        let scope = self.ctx.scopes.current();
        self.ctx
            .symbols
            .add(Declaration::new(name, kind, ty, scope, span))
    }

    /// Resolves the items of one unit in the current root scope.
    fn resolve_items(&mut self, items: &mut [Item]) {
        self.resolve_imports(items);
        self.hoist_enums(items);
        self.hoist_classes(items);
        self.hoist_functions(items);
        for item in items.iter_mut() {
            match item {
                Item::Class(class) if !class.is_generic() => self.walk_class(class),
                Item::Function(function) if !function.is_generic() => {
                    self.walk_function(function, false)
                }
                Item::Global(var) => self.declare_var(var, VarKind::Global),
                Item::Statement(stmt) => self.walk_stmt(stmt),
                Item::Main(block) => {
                    self.loop_depth = 0;
                    self.walk_block(block);
                }
                Item::Class(_) | Item::Function(_) | Item::Import(_) | Item::Enum(_) => {}
            }
        }
    }

    fn resolve_imports(&mut self, items: &mut [Item]) {
        for item in items.iter_mut() {
            let Item::Import(import) = item else {
                continue;
            };
            let Some(unit) = import.unit.as_deref_mut() else {
                continue;
            };
            let importer = self.ctx.scopes.current();
            let root = self.ctx.scopes.open_with_parent(ScopeKind::Import, None);
            debug!(file = %import.file, root = root.0, "resolving import");
            self.resolve_items(&mut unit.items);
            self.ctx.scopes.close();
            self.ctx.scopes.add_import_to(importer, root);
        }
    }

    fn hoist_enums(&mut self, items: &mut [Item]) {
        for item in items.iter_mut() {
            let Item::Enum(decl) = item else {
                continue;
            };
            if self.ctx.scopes.has_local(&decl.name) {
                self.error(Diagnostic::new(ErrorCode::Redeclaration, decl.span).arg(&decl.name));
                continue;
            }
            let mut seen = HashSet::new();
            for constant in &decl.constants {
                if !seen.insert(constant.name.clone()) {
                    self.error(Diagnostic::new(ErrorCode::Redeclaration, constant.span).arg(&constant.name));
                }
            }
            let constants = decl.constants.iter().map(|c| c.name.clone()).collect();
            let id = self.add_decl(
                &decl.name,
                DeclKind::Enum { constants },
                Type::enumeration(decl.name.clone()),
                decl.span,
            );
            self.ctx.scopes.declare(&decl.name, id);
            decl.id = Some(id);
        }
    }

    fn hoist_classes(&mut self, items: &mut [Item]) {
        let root = self.ctx.scopes.current();
        let mut pending = Vec::new();
        for (idx, item) in items.iter_mut().enumerate() {
            let Item::Class(class) = item else {
                continue;
            };
            if self.ctx.scopes.has_local(&class.name) {
                self.error(Diagnostic::new(ErrorCode::Redeclaration, class.span).arg(&class.name));
                continue;
            }
            let type_params: Vec<String> = class.type_params.iter().map(|p| p.name.clone()).collect();
            let ty = if class.is_generic() {
                Type::generic(
                    class.name.clone(),
                    type_params.iter().cloned().map(Type::Param).collect(),
                )
            } else {
                Type::class(class.name.clone())
            };
            let info = ClassInfo {
                superclass: None,
                scope: root,
                fields: Vec::new(),
                type_params,
                auto_constructor: class.auto_constructor,
            };
            let id = self.add_decl(&class.name, DeclKind::Class(info), ty, class.span);
            self.ctx.scopes.declare(&class.name, id);
            class.id = Some(id);
            if class.is_generic() {
                self.ctx.add_template(&class.name, Template::Class(class.clone()));
            } else {
                pending.push((idx, id));
            }
        }

        for &(idx, id) in &pending {
            if let Item::Class(class) = &items[idx] {
                let superclass = self.link_superclass(class);
                if let Some(info) = self.ctx.symbols.get_mut(id).class_info_mut() {
                    info.superclass = superclass;
                }
            }
        }
        self.break_cycles(items, &pending);

        // Superclass scopes must exist before a subclass scope links to them.
        let mut done: HashSet<DeclId> = HashSet::new();
        let batch: HashSet<DeclId> = pending.iter().map(|(_, id)| *id).collect();
        while done.len() < pending.len() {
            let mut progressed = false;
            for &(idx, id) in &pending {
                if done.contains(&id) {
                    continue;
                }
                let superclass = self
                    .ctx
                    .symbols
                    .get(id)
                    .class_info()
                    .and_then(|info| info.superclass);
                if superclass.is_some_and(|sup| batch.contains(&sup) && !done.contains(&sup)) {
                    continue;
                }
                if let Item::Class(class) = &mut items[idx] {
                    self.hoist_members(class, id, superclass, root);
                }
                done.insert(id);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    fn link_superclass(&mut self, class: &ClassDecl) -> Option<DeclId> {
        let superclass = class.superclass.as_ref()?;
        let Type::Class { name, args } = superclass else {
            self.error(Diagnostic::new(ErrorCode::NotAClass, class.span).arg(superclass));
            return None;
        };
        let Some(id) = self.ctx.scopes.lookup(name) else {
            self.error(Diagnostic::new(ErrorCode::Undeclared, class.span).arg(name));
            return None;
        };
        let generic = self
            .ctx
            .symbols
            .get(id)
            .class_info()
            .map(|info| !info.type_params.is_empty());
        match generic {
            Some(false) if args.is_empty() => Some(id),
            _ => {
                self.error(Diagnostic::new(ErrorCode::NotAClass, class.span).arg(superclass));
                None
            }
        }
    }

    fn break_cycles(&mut self, items: &[Item], pending: &[(usize, DeclId)]) {
        for &(idx, id) in pending {
            let mut seen = HashSet::new();
            let mut current = self.ctx.symbols.get(id).class_info().and_then(|i| i.superclass);
            let mut cyclic = false;
            while let Some(next) = current {
                if next == id {
                    cyclic = true;
                    break;
                }
                if !seen.insert(next) {
                    break;
                }
                current = self.ctx.symbols.get(next).class_info().and_then(|i| i.superclass);
            }
            if cyclic {
                let span = match &items[idx] {
                    Item::Class(class) => class.span,
                    _ => Span::default(),
                };
                let name = self.ctx.symbols.get(id).name.clone();
                self.error(Diagnostic::new(ErrorCode::InheritanceCycle, span).arg(name));
                if let Some(info) = self.ctx.symbols.get_mut(id).class_info_mut() {
                    info.superclass = None;
                }
            }
        }
    }

    fn hoist_members(&mut self, class: &mut ClassDecl, id: DeclId, superclass: Option<DeclId>, root: ScopeId) {
        let scope = self.ctx.scopes.open_with_parent(ScopeKind::Class, Some(root));
        if let Some(sup_scope) =
            superclass.and_then(|sup| self.ctx.symbols.get(sup).class_info().map(|info| info.scope))
        {
            self.ctx.scopes.set_superclass(scope, sup_scope);
        }
        self.ctx.scopes.set_owner(scope, id);
        class.scope = Some(scope);

        let mut fields = Vec::new();
        for field in &mut class.fields {
            if self.ctx.scopes.has_local(&field.name) {
                self.error(Diagnostic::new(ErrorCode::Redeclaration, field.span).arg(&field.name));
                continue;
            }
            let field_id = self.add_decl(
                &field.name,
                DeclKind::Variable(VarKind::Field),
                field.ty.clone(),
                field.span,
            );
            self.ctx.scopes.declare(&field.name, field_id);
            field.id = Some(field_id);
            fields.push(field_id);
        }
        for method in &mut class.methods {
            self.hoist_function(method, Some(id));
        }
        self.ctx.scopes.close();

        if let Some(info) = self.ctx.symbols.get_mut(id).class_info_mut() {
            info.scope = scope;
            info.fields = fields;
        }
        trace!(class = %class.name, scope = scope.0, "class hoisted");
    }

    fn hoist_functions(&mut self, items: &mut [Item]) {
        for item in items.iter_mut() {
            let Item::Function(function) = item else {
                continue;
            };
            if function.is_generic() {
                let signature = template_signature(function);
                let collides = self
                    .ctx
                    .function_templates(&function.name)
                    .into_iter()
                    .any(|existing| template_signature(existing) == signature);
                if collides {
                    self.error(
                        Diagnostic::new(ErrorCode::DuplicateOverload, function.span)
                            .arg(&function.name)
                            .arg(&signature),
                    );
                    continue;
                }
                self.ctx
                    .add_template(&function.name, Template::Function(function.clone()));
            } else {
                self.hoist_function(function, None);
            }
        }
    }

    fn hoist_function(&mut self, function: &mut FunctionDecl, owner: Option<DeclId>) {
        let params: Vec<Type> = function.params.iter().map(|p| p.ty.clone()).collect();
        let signature = parameter_signature(&params);
        if self.ctx.scopes.has_overload_collision(&function.name, &signature) {
            self.error(
                Diagnostic::new(ErrorCode::DuplicateOverload, function.span)
                    .arg(&function.name)
                    .arg(&signature),
            );
            return;
        }
        let callable = Callable {
            params,
            modes: function.params.iter().map(|p| p.mode).collect(),
            ret: function.ret.clone(),
            owner,
        };
        let kind = if owner.is_some() {
            DeclKind::Method(callable)
        } else {
            DeclKind::Function(callable)
        };
        let id = self.add_decl(&function.name, kind, function.ret.clone(), function.span);
        self.ctx.scopes.declare_overload(&function.name, &signature, id);
        function.id = Some(id);
    }

    fn walk_class(&mut self, class: &mut ClassDecl) {
        let Some(scope) = class.scope else {
            return;
        };
        let has_superclass = class
            .id
            .and_then(|id| self.ctx.symbols.get(id).class_info().map(|i| i.superclass.is_some()))
            .unwrap_or(false);
        let saved_class = self.class.replace(ClassContext { has_superclass });
        let saved_method = std::mem::replace(&mut self.in_method, true);
        self.ctx.scopes.enter(scope);
        for field in &mut class.fields {
            if let Some(init) = &mut field.init {
                self.resolve_expr(init);
            }
        }
        for method in &mut class.methods {
            self.walk_function(method, true);
        }
        self.ctx.scopes.close();
        self.in_method = saved_method;
        self.class = saved_class;
    }

    fn walk_function(&mut self, function: &mut FunctionDecl, method: bool) {
        if let Some(op) = function.operator {
            if function.params.len() != 1 {
                self.error(Diagnostic::new(ErrorCode::OperatorArity, function.span).arg(op.symbol()));
            }
        }
        let scope = self.ctx.scopes.open(ScopeKind::Function);
        if let Some(id) = function.id {
            self.ctx.scopes.set_owner(scope, id);
        }
        function.scope = Some(scope);
        function.body.scope = Some(scope);
        for param in &mut function.params {
            if self.ctx.scopes.has_local(&param.name) {
                self.error(Diagnostic::new(ErrorCode::Redeclaration, param.span).arg(&param.name));
                continue;
            }
            let id = self.add_decl(
                &param.name,
                DeclKind::Parameter(param.mode),
                param.ty.clone(),
                param.span,
            );
            self.ctx.scopes.declare(&param.name, id);
            param.id = Some(id);
        }
        let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
        let saved_method = std::mem::replace(&mut self.in_method, method);
        for stmt in &mut function.body.stmts {
            self.walk_stmt(stmt);
        }
        self.in_method = saved_method;
        self.loop_depth = saved_depth;
        self.ctx.scopes.close();
    }

    fn walk_block(&mut self, block: &mut Block) {
        let scope = self.ctx.scopes.open(ScopeKind::Block);
        block.scope = Some(scope);
        for stmt in &mut block.stmts {
            self.walk_stmt(stmt);
        }
        self.ctx.scopes.close();
    }

    fn walk_loop_body(&mut self, block: &mut Block) {
        self.loop_depth += 1;
        self.walk_block(block);
        self.loop_depth -= 1;
    }

    /// Declares `var` before its initializer is visited so that a
    /// self-referencing initializer can be reported.
    fn declare_var(&mut self, var: &mut VarDecl, kind: VarKind) {
        if self.ctx.scopes.has_local(&var.name) {
            self.error(Diagnostic::new(ErrorCode::Redeclaration, var.span).arg(&var.name));
            if let Some(init) = &mut var.init {
                self.resolve_expr(init);
            }
            return;
        }
        let id = self.add_decl(&var.name, DeclKind::Variable(kind), var.ty.clone(), var.span);
        self.ctx.scopes.declare(&var.name, id);
        var.id = Some(id);
        if let Some(init) = &mut var.init {
            self.resolve_expr(init);
            if mentions(init, id) {
                self.error(Diagnostic::new(ErrorCode::SelfReference, init.span).arg(&var.name));
            }
        }
    }

    fn local_kind(&self) -> VarKind {
        match self.ctx.scopes.kind(self.ctx.scopes.current()) {
            ScopeKind::Global | ScopeKind::Import => VarKind::Global,
            _ => VarKind::Local,
        }
    }

    fn check_in_loop(&mut self, keyword: &str, span: Span) {
        if self.loop_depth == 0 {
            self.error(Diagnostic::new(ErrorCode::OutsideLoop, span).arg(keyword));
        }
    }

    fn walk_stmt(&mut self, stmt: &mut Stmt) {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Var(var) => {
                let kind = self.local_kind();
                self.declare_var(var, kind);
            }
            StmtKind::Assign { target, value } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            StmtKind::Expr(expr) => self.resolve_expr(expr),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.walk_block(then_branch);
                if let Some(block) = else_branch {
                    self.walk_block(block);
                }
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition);
                self.walk_loop_body(body);
            }
            StmtKind::DoWhile { body, condition } => {
                self.walk_loop_body(body);
                self.resolve_expr(condition);
            }
            StmtKind::For(for_stmt) => {
                self.resolve_expr(&mut for_stmt.range.start);
                self.resolve_expr(&mut for_stmt.range.end);
                let scope = self.ctx.scopes.open(ScopeKind::Block);
                for_stmt.scope = Some(scope);
                self.declare_var(&mut for_stmt.var, VarKind::LoopControl);
                self.walk_loop_body(&mut for_stmt.body);
                self.ctx.scopes.close();
            }
            StmtKind::ForEach(for_each) => {
                self.resolve_expr(&mut for_each.collection);
                let scope = self.ctx.scopes.open(ScopeKind::Block);
                for_each.scope = Some(scope);
                self.declare_var(&mut for_each.var, VarKind::LoopControl);
                self.walk_loop_body(&mut for_each.body);
                self.ctx.scopes.close();
            }
            StmtKind::Choice(choice) => {
                self.resolve_expr(&mut choice.scrutinee);
                for arm in &mut choice.arms {
                    for label in &mut arm.labels {
                        match label {
                            ChoiceLabel::Value(value) => self.resolve_expr(value),
                            ChoiceLabel::Range(low, high) => {
                                self.resolve_expr(low);
                                self.resolve_expr(high);
                            }
                        }
                    }
                    self.walk_block(&mut arm.body);
                }
                if let Some(block) = &mut choice.default {
                    self.walk_block(block);
                }
            }
            StmtKind::Break => self.check_in_loop("break", span),
            StmtKind::Continue => self.check_in_loop("continue", span),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            StmtKind::Stop => {}
            StmtKind::Block(block) => self.walk_block(block),
            StmtKind::Input(exprs) | StmtKind::Output(exprs) => {
                for expr in exprs {
                    self.resolve_expr(expr);
                }
            }
            StmtKind::Stream(_) => {}
            StmtKind::Retype { target, fields, .. } => {
                self.resolve_expr(target);
                for field in fields {
                    self.resolve_expr(&mut field.value);
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Literal(_) | ExprKind::Console => {}
            ExprKind::Name(name) => match self.ctx.scopes.lookup(&name.name) {
                Some(id) => name.decl = Some(id),
                None => self.error(Diagnostic::new(ErrorCode::Undeclared, span).arg(&name.name)),
            },
            ExprKind::This => {
                if !self.in_method {
                    self.error(Diagnostic::new(ErrorCode::ThisOutsideClass, span));
                }
            }
            ExprKind::Super => {
                let allowed = self.in_method && self.class.is_some_and(|class| class.has_superclass);
                if !allowed {
                    self.error(Diagnostic::new(ErrorCode::SuperOutsideInheritance, span));
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Stream { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::InstanceOf { operand, .. } => self.resolve_expr(operand),
            ExprKind::Call(call) => {
                call.scope = Some(self.ctx.scopes.current());
                for arg in &mut call.args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::MethodCall(call) => {
                self.resolve_expr(&mut call.receiver);
                for arg in &mut call.args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Field { object, name, .. } => {
                self.resolve_expr(object);
                if let Some(enum_id) = enum_reference(&*self.ctx, object) {
                    if self.ctx.symbols.get(enum_id).enum_ordinal(name).is_none() {
                        let owner = self.ctx.symbols.get(enum_id).name.clone();
                        self.error(Diagnostic::new(ErrorCode::UnknownMember, span).arg(owner).arg(name.as_str()));
                    }
                }
            }
            ExprKind::Index { base, indices } => {
                self.resolve_expr(base);
                for index in indices {
                    self.resolve_expr(index);
                }
            }
            ExprKind::New { args, .. } => match args {
                NewArgs::Named(fields) => {
                    for field in fields {
                        self.resolve_expr(&mut field.value);
                    }
                }
                NewArgs::Positional(values) => {
                    for value in values {
                        self.resolve_expr(value);
                    }
                }
            },
            ExprKind::ArrayNew { sizes, .. } => {
                for size in sizes {
                    self.resolve_expr(size);
                }
            }
            ExprKind::Collection { elements, .. } => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
        }
    }
}

/// The enumeration named by `expr`, when it is a bare enum name.
pub fn enum_reference(ctx: &Context, expr: &Expr) -> Option<DeclId> {
    let id = expr.as_name()?.decl?;
    matches!(ctx.symbols.get(id).kind, DeclKind::Enum { .. }).then_some(id)
}

/// Whether `expr` reads `decl` outside of call arguments, constructor
/// arguments and member-access targets.
fn mentions(expr: &Expr, decl: DeclId) -> bool {
    match &expr.kind {
        ExprKind::Name(name) => name.decl == Some(decl),
        ExprKind::Binary { left, right, .. } | ExprKind::Stream { left, right, .. } => {
            mentions(left, decl) || mentions(right, decl)
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Cast { operand, .. }
        | ExprKind::InstanceOf { operand, .. } => mentions(operand, decl),
        ExprKind::Index { base, indices } => {
            mentions(base, decl) || indices.iter().any(|index| mentions(index, decl))
        }
        ExprKind::Collection { elements, .. } => elements.iter().any(|e| mentions(e, decl)),
        ExprKind::ArrayNew { sizes, .. } => sizes.iter().any(|size| mentions(size, decl)),
        ExprKind::Call(_)
        | ExprKind::MethodCall(_)
        | ExprKind::New { .. }
        | ExprKind::Field { .. }
        | ExprKind::Literal(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::Console => false,
    }
}
