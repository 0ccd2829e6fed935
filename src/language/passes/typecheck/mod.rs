//! Bottom-up typing of expressions and statement-level type constraints.

mod expr;

use crate::language::{
    ast::*,
    errors::{Diagnostic, Diagnostics, ErrorCode},
    span::Span,
    symbols::DeclId,
    types::{assignment_compatible, Type},
    Context,
};
use tracing::{instrument, trace};

#[instrument(level = "debug", skip_all)]
pub fn check_program(ctx: &mut Context, program: &mut Program, diags: &mut Diagnostics) {
    let mut checker = Checker {
        ctx,
        diags,
        returns: Vec::new(),
        class: None,
    };
    checker.check_items(&mut program.items);
}

struct ReturnContext {
    name: String,
    ty: Type,
}

pub(crate) struct Checker<'a> {
    ctx: &'a mut Context,
    diags: &'a mut Diagnostics,
    returns: Vec<ReturnContext>,
    class: Option<DeclId>,
}

impl<'a> Checker<'a> {
    fn error(&mut self, diagnostic: Diagnostic) {
        trace!(%diagnostic, "type error");
        self.diags.push(diagnostic);
    }

    fn check_items(&mut self, items: &mut [Item]) {
        for item in items.iter_mut() {
            match item {
                Item::Import(import) => {
                    if let Some(unit) = import.unit.as_deref_mut() {
                        self.check_items(&mut unit.items);
                    }
                }
                Item::Class(class) if !class.is_generic() => self.check_class(class),
                Item::Function(function) if !function.is_generic() => {
                    self.check_function(function)
                }
                Item::Global(var) => self.check_var(var),
                Item::Statement(stmt) => self.check_stmt(stmt),
                Item::Main(block) => {
                    self.returns.push(ReturnContext {
                        name: "main".into(),
                        ty: Type::Void,
                    });
                    self.check_block(block);
                    self.returns.pop();
                }
                Item::Class(_) | Item::Function(_) | Item::Enum(_) => {}
            }
        }
    }

    fn check_class(&mut self, class: &mut ClassDecl) {
        let saved = std::mem::replace(&mut self.class, class.id);
        for field in &mut class.fields {
            self.check_var(field);
        }
        for method in &mut class.methods {
            self.check_function(method);
        }
        self.class = saved;
    }

    fn check_function(&mut self, function: &mut FunctionDecl) {
        self.returns.push(ReturnContext {
            name: function.name.clone(),
            ty: function.ret.clone(),
        });
        self.check_block(&mut function.body);
        self.returns.pop();
    }

    fn check_block(&mut self, block: &mut Block) {
        for stmt in &mut block.stmts {
            self.check_stmt(stmt);
        }
    }

    fn expect_compatible(&mut self, expected: &Type, found: &Type, span: Span) {
        if !assignment_compatible(expected, found) {
            self.error(
                Diagnostic::new(ErrorCode::IncompatibleAssignment, span)
                    .arg(expected)
                    .arg(found),
            );
        }
    }

    fn check_var(&mut self, var: &mut VarDecl) {
        if let Some(init) = &mut var.init {
            let found = self.expr(init);
            let span = init.span;
            self.expect_compatible(&var.ty, &found, span);
        }
    }

    fn check_condition(&mut self, condition: &mut Expr) {
        let ty = self.expr(condition);
        if !ty.is_bool() && !ty.is_unknown() {
            self.error(Diagnostic::new(ErrorCode::ConditionNotBool, condition.span).arg(&ty));
        }
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Var(var) => self.check_var(var),
            StmtKind::Assign { target, value } => {
                let expected = self.assign_target(target);
                let found = self.expr(value);
                self.expect_compatible(&expected, &found, value.span);
            }
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition);
                self.check_block(then_branch);
                if let Some(block) = else_branch {
                    self.check_block(block);
                }
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition);
                self.check_block(body);
            }
            StmtKind::DoWhile { body, condition } => {
                self.check_block(body);
                self.check_condition(condition);
            }
            StmtKind::For(for_stmt) => {
                let start = self.expr(&mut for_stmt.range.start);
                let end = self.expr(&mut for_stmt.range.end);
                if !range_bounds_valid(&start, &end) {
                    self.error(Diagnostic::new(ErrorCode::InvalidRange, span).arg(&start).arg(&end));
                }
                let var_ty = for_stmt.var.ty.clone();
                self.expect_compatible(&var_ty, &start, for_stmt.var.span);
                self.check_block(&mut for_stmt.body);
            }
            StmtKind::ForEach(for_each) => {
                let collection = self.expr(&mut for_each.collection);
                match collection.element() {
                    Some(element) => {
                        let var_ty = for_each.var.ty.clone();
                        self.expect_compatible(&var_ty, &element, for_each.var.span);
                    }
                    None if collection.is_unknown() => {}
                    None => self.error(
                        Diagnostic::new(ErrorCode::NotIterable, for_each.collection.span).arg(&collection),
                    ),
                }
                self.check_block(&mut for_each.body);
            }
            StmtKind::Choice(choice) => self.check_choice(choice),
            StmtKind::Break | StmtKind::Continue | StmtKind::Stop | StmtKind::Stream(_) => {}
            StmtKind::Return(value) => self.check_return(value.as_mut(), span),
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::Input(targets) => {
                for target in targets {
                    let ty = self.assign_target(target);
                    if !ty.is_primitive() && !ty.is_unknown() {
                        self.error(Diagnostic::new(ErrorCode::InvalidInputTarget, target.span).arg(&ty));
                    }
                }
            }
            StmtKind::Output(values) => {
                for value in values {
                    let ty = self.expr(value);
                    if ty.is_void() {
                        self.error(Diagnostic::new(ErrorCode::VoidOutput, value.span));
                    }
                }
            }
            StmtKind::Retype {
                target,
                class,
                fields,
            } => self.check_retype(target, class, fields, span),
        }
    }

    fn check_choice(&mut self, choice: &mut ChoiceStmt) {
        let scrutinee = self.expr(&mut choice.scrutinee);
        for arm in &mut choice.arms {
            for label in &mut arm.labels {
                match label {
                    ChoiceLabel::Value(value) => {
                        let ty = self.expr(value);
                        if !assignment_compatible(&scrutinee, &ty) {
                            self.error(
                                Diagnostic::new(ErrorCode::ChoiceLabelMismatch, value.span)
                                    .arg(&ty)
                                    .arg(&scrutinee),
                            );
                        }
                    }
                    ChoiceLabel::Range(low, high) => {
                        let low_ty = self.expr(low);
                        let high_ty = self.expr(high);
                        let span = low.span.join(high.span);
                        if !range_bounds_valid(&low_ty, &high_ty) {
                            self.error(Diagnostic::new(ErrorCode::InvalidRange, span).arg(&low_ty).arg(&high_ty));
                        } else if !assignment_compatible(&scrutinee, &low_ty) {
                            self.error(
                                Diagnostic::new(ErrorCode::ChoiceLabelMismatch, span)
                                    .arg(&low_ty)
                                    .arg(&scrutinee),
                            );
                        }
                    }
                }
            }
            self.check_block(&mut arm.body);
        }
        if let Some(block) = &mut choice.default {
            self.check_block(block);
        }
    }

    fn check_return(&mut self, value: Option<&mut Expr>, span: Span) {
        let (name, expected) = match self.returns.last() {
            Some(ctx) => (ctx.name.clone(), ctx.ty.clone()),
            None => ("main".to_string(), Type::Void),
        };
        match value {
            Some(value) => {
                let found = self.expr(value);
                if expected.is_void() {
                    self.error(Diagnostic::new(ErrorCode::UnexpectedReturnValue, value.span).arg(&name));
                } else if !assignment_compatible(&expected, &found) {
                    self.error(
                        Diagnostic::new(ErrorCode::ReturnMismatch, value.span)
                            .arg(&expected)
                            .arg(&found),
                    );
                }
            }
            None => {
                if !expected.is_void() && !expected.is_unknown() {
                    self.error(
                        Diagnostic::new(ErrorCode::MissingReturnValue, span)
                            .arg(&name)
                            .arg(&expected),
                    );
                }
            }
        }
    }

    /// `retype x as C(...)` widens the declared type of `x` to a Multi type
    /// holding `C`.
    fn check_retype(&mut self, target: &mut Expr, class: &Type, fields: &mut [FieldInit], span: Span) {
        let current = self.expr(target);
        let decl = target
            .as_name()
            .and_then(|name| name.decl)
            .filter(|id| self.ctx.symbols.get(*id).is_assignable());
        let class_decl = self.instantiable_class(class);
        let (Some(decl), Some(class_decl)) = (decl, class_decl) else {
            self.error(Diagnostic::new(ErrorCode::InvalidRetype, span).arg(&current).arg(class));
            return;
        };
        if !current.is_object() && !current.is_unknown() {
            self.error(Diagnostic::new(ErrorCode::InvalidRetype, span).arg(&current).arg(class));
            return;
        }
        self.check_field_inits(class_decl, class, fields);
        let widened = current.with_member(class);
        trace!(from = %current, to = %widened, "retype widens declaration");
        self.ctx.retype_decl(decl, widened.clone());
        target.ty = Some(widened);
    }
}

fn range_bounds_valid(start: &Type, end: &Type) -> bool {
    if start.is_unknown() || end.is_unknown() {
        return true;
    }
    let rangeable = matches!(start.signature().as_str(), "I" | "C" | "R");
    rangeable && start.signature() == end.signature()
}
