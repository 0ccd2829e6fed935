use crate::language::{ast::*, span::Span, symbols::DeclId, types::Type};

/// Visits every type written in the tree: declaration types, return types
/// and the types named inside expressions.
pub trait TypeVisitor {
    fn visit_type(&mut self, ty: &mut Type, span: Span);

    /// Type of a declared variable or parameter.
    fn visit_decl(&mut self, _decl: Option<DeclId>, ty: &mut Type, span: Span) {
        self.visit_type(ty, span);
    }

    /// Called once parameter and return types of `function` are visited.
    fn visit_signature(&mut self, _function: &FunctionDecl) {}

    /// Called once the explicit type arguments of `call` are visited.
    fn visit_call(&mut self, _call: &mut Call, _span: Span) {}
}

pub fn walk_class<V: TypeVisitor + ?Sized>(v: &mut V, class: &mut ClassDecl) {
    for field in &mut class.fields {
        v.visit_decl(field.id, &mut field.ty, field.span);
        if let Some(init) = &mut field.init {
            walk_expr(v, init);
        }
    }
    for method in &mut class.methods {
        walk_function(v, method);
    }
}

pub fn walk_function<V: TypeVisitor + ?Sized>(v: &mut V, function: &mut FunctionDecl) {
    for param in &mut function.params {
        v.visit_decl(param.id, &mut param.ty, param.span);
    }
    v.visit_type(&mut function.ret, function.span);
    v.visit_signature(function);
    walk_block(v, &mut function.body);
}

pub fn walk_block<V: TypeVisitor + ?Sized>(v: &mut V, block: &mut Block) {
    for stmt in &mut block.stmts {
        walk_stmt(v, stmt);
    }
}

pub fn walk_var<V: TypeVisitor + ?Sized>(v: &mut V, var: &mut VarDecl) {
    v.visit_decl(var.id, &mut var.ty, var.span);
    if let Some(init) = &mut var.init {
        walk_expr(v, init);
    }
}

pub fn walk_stmt<V: TypeVisitor + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Var(var) => walk_var(v, var),
        StmtKind::Assign { target, value } => {
            walk_expr(v, target);
            walk_expr(v, value);
        }
        StmtKind::Expr(expr) | StmtKind::Stream(expr) => walk_expr(v, expr),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk_expr(v, condition);
            walk_block(v, then_branch);
            if let Some(block) = else_branch {
                walk_block(v, block);
            }
        }
        StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
            walk_expr(v, condition);
            walk_block(v, body);
        }
        StmtKind::For(for_stmt) => {
            walk_var(v, &mut for_stmt.var);
            walk_expr(v, &mut for_stmt.range.start);
            walk_expr(v, &mut for_stmt.range.end);
            walk_block(v, &mut for_stmt.body);
        }
        StmtKind::ForEach(for_each) => {
            walk_var(v, &mut for_each.var);
            walk_expr(v, &mut for_each.collection);
            walk_block(v, &mut for_each.body);
        }
        StmtKind::Choice(choice) => {
            walk_expr(v, &mut choice.scrutinee);
            for arm in &mut choice.arms {
                for label in &mut arm.labels {
                    match label {
                        ChoiceLabel::Value(value) => walk_expr(v, value),
                        ChoiceLabel::Range(low, high) => {
                            walk_expr(v, low);
                            walk_expr(v, high);
                        }
                    }
                }
                walk_block(v, &mut arm.body);
            }
            if let Some(block) = &mut choice.default {
                walk_block(v, block);
            }
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr(v, value);
            }
        }
        StmtKind::Block(block) => walk_block(v, block),
        StmtKind::Input(exprs) | StmtKind::Output(exprs) => {
            for expr in exprs {
                walk_expr(v, expr);
            }
        }
        StmtKind::Retype {
            target,
            class,
            fields,
        } => {
            v.visit_type(class, stmt.span);
            walk_expr(v, target);
            for field in fields {
                walk_expr(v, &mut field.value);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Stop => {}
    }
}

pub fn walk_expr<V: TypeVisitor + ?Sized>(v: &mut V, expr: &mut Expr) {
    let span = expr.span;
    match &mut expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Name(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::Console => {}
        ExprKind::Binary { left, right, .. } | ExprKind::Stream { left, right, .. } => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        ExprKind::Unary { operand, .. } => walk_expr(v, operand),
        ExprKind::Call(call) => {
            for ty in &mut call.type_args {
                v.visit_type(ty, span);
            }
            for arg in &mut call.args {
                walk_expr(v, arg);
            }
            v.visit_call(call, span);
        }
        ExprKind::MethodCall(call) => {
            walk_expr(v, &mut call.receiver);
            for arg in &mut call.args {
                walk_expr(v, arg);
            }
        }
        ExprKind::Field { object, .. } => walk_expr(v, object),
        ExprKind::Index { base, indices } => {
            walk_expr(v, base);
            for index in indices {
                walk_expr(v, index);
            }
        }
        ExprKind::New { class, args, .. } => {
            v.visit_type(class, span);
            match args {
                NewArgs::Named(fields) => {
                    for field in fields {
                        walk_expr(v, &mut field.value);
                    }
                }
                NewArgs::Positional(values) => {
                    for value in values {
                        walk_expr(v, value);
                    }
                }
            }
        }
        ExprKind::ArrayNew { element, sizes } => {
            v.visit_type(element, span);
            for size in sizes {
                walk_expr(v, size);
            }
        }
        ExprKind::Collection { elements, .. } => {
            for element in elements {
                walk_expr(v, element);
            }
        }
        ExprKind::Cast { target, operand } => {
            v.visit_type(target, span);
            walk_expr(v, operand);
        }
        ExprKind::InstanceOf { operand, class } => {
            walk_expr(v, operand);
            v.visit_type(class, span);
        }
    }
}
