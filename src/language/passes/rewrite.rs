use crate::language::{
    ast::*,
    context::Context,
    errors::{Diagnostic, Diagnostics, ErrorCode},
    span::Span,
    types::Type,
};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Syntactic desugaring that runs before any name is resolved: stream
/// chains become flat input/output statements, property fields gain
/// accessors and auto-constructor classes gain a positional `new`.
///
/// Only names are consulted in `ctx`: superclasses declared by earlier
/// inputs contribute their fields to synthesized constructors.
pub fn rewrite_program(ctx: &Context, program: &mut Program, diags: &mut Diagnostics) {
    let mut fields_by_class = ClassFields::new();
    collect_class_fields(program, &mut fields_by_class);
    let known = KnownClasses {
        ctx,
        program: &fields_by_class,
    };
    rewrite_items(&known, program, diags);
}

fn rewrite_items(known: &KnownClasses, program: &mut Program, diags: &mut Diagnostics) {
    for item in &mut program.items {
        match item {
            Item::Import(import) => {
                if let Some(unit) = import.unit.as_deref_mut() {
                    rewrite_items(known, unit, diags);
                }
            }
            Item::Class(class) => rewrite_class(class, known, diags),
            Item::Function(function) => rewrite_block(&mut function.body, diags),
            Item::Main(block) => rewrite_block(block, diags),
            Item::Statement(stmt) => rewrite_stmt(stmt, diags),
            Item::Global(_) | Item::Enum(_) => {}
        }
    }
}

type ClassFields = HashMap<String, (Option<String>, Vec<VarDecl>)>;

/// Classes an auto-constructor may inherit fields from: those of the
/// program being rewritten and its imports, then those already declared.
struct KnownClasses<'a> {
    ctx: &'a Context,
    program: &'a ClassFields,
}

/// Collects classes of `program` and, after them, of its import units.
fn collect_class_fields(program: &Program, classes: &mut ClassFields) {
    for item in &program.items {
        if let Item::Class(class) = item {
            let superclass = match &class.superclass {
                Some(Type::Class { name, .. }) => Some(name.clone()),
                _ => None,
            };
            classes
                .entry(class.name.clone())
                .or_insert((superclass, class.fields.clone()));
        }
    }
    for item in &program.items {
        if let Item::Import(import) = item {
            if let Some(unit) = import.unit.as_deref() {
                collect_class_fields(unit, classes);
            }
        }
    }
}

/// Fields of `class` and its ancestors, ancestors first.
fn constructor_fields(class: &ClassDecl, known: &KnownClasses) -> Vec<VarDecl> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(class.name.clone());
    let mut next = match &class.superclass {
        Some(Type::Class { name, .. }) => Some(name.clone()),
        _ => None,
    };
    while let Some(name) = next {
        if !seen.insert(name.clone()) {
            break;
        }
        if let Some((superclass, fields)) = known.program.get(&name) {
            chain.push(fields.clone());
            next = superclass.clone();
            continue;
        }
        // Declared by an earlier input: its ancestry is already linked.
        if let Some(id) = known.ctx.class_named(&name) {
            let declared = known
                .ctx
                .symbols
                .all_fields(id)
                .into_iter()
                .map(|field| {
                    let decl = known.ctx.symbols.get(field);
                    VarDecl::new(&decl.name, decl.ty.clone(), None)
                })
                .collect();
            chain.push(declared);
        }
        break;
    }
    let mut fields: Vec<VarDecl> = chain.into_iter().rev().flatten().collect();
    fields.extend(class.fields.iter().cloned());
    fields
}

fn has_method(class: &ClassDecl, name: &str) -> bool {
    class.methods.iter().any(|method| method.name == name)
}

fn rewrite_class(class: &mut ClassDecl, known: &KnownClasses, diags: &mut Diagnostics) {
    let mut synthesized = Vec::new();
    for field in class.fields.iter().filter(|field| field.property) {
        let getter = format!("get_{}", field.name);
        if !has_method(class, &getter) {
            let body = Block::new(vec![Stmt::ret(Some(Expr::field(Expr::this(), &field.name)))]);
            synthesized.push(FunctionDecl::new(getter, Vec::new(), field.ty.clone(), body).with_span(field.span));
        }
        let setter = format!("set_{}", field.name);
        if !has_method(class, &setter) {
            let body = Block::new(vec![Stmt::assign(
                Expr::field(Expr::this(), &field.name),
                Expr::name("value"),
            )]);
            synthesized.push(
                FunctionDecl::new(setter, vec![Param::new("value", field.ty.clone())], Type::Void, body)
                    .with_span(field.span),
            );
        }
    }
    if class.auto_constructor && !has_method(class, "new") {
        let fields = constructor_fields(class, known);
        let params = fields
            .iter()
            .map(|field| Param::new(&field.name, field.ty.clone()))
            .collect();
        let body = fields
            .iter()
            .map(|field| Stmt::assign(Expr::field(Expr::this(), &field.name), Expr::name(&field.name)))
            .collect();
        synthesized.push(FunctionDecl::new("new", params, Type::Void, Block::new(body)).with_span(class.span));
    }
    if !synthesized.is_empty() {
        trace!(class = %class.name, count = synthesized.len(), "synthesized members");
    }
    class.methods.extend(synthesized);
    for method in &mut class.methods {
        rewrite_block(&mut method.body, diags);
    }
}

fn rewrite_block(block: &mut Block, diags: &mut Diagnostics) {
    for stmt in &mut block.stmts {
        rewrite_stmt(stmt, diags);
    }
}

fn rewrite_stmt(stmt: &mut Stmt, diags: &mut Diagnostics) {
    match &mut stmt.kind {
        StmtKind::Stream(chain) => {
            if let Some(flat) = flatten_stream(chain, stmt.span, diags) {
                stmt.kind = flat;
            }
        }
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            rewrite_block(then_branch, diags);
            if let Some(block) = else_branch {
                rewrite_block(block, diags);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => rewrite_block(body, diags),
        StmtKind::For(for_stmt) => rewrite_block(&mut for_stmt.body, diags),
        StmtKind::ForEach(for_each) => rewrite_block(&mut for_each.body, diags),
        StmtKind::Choice(choice) => {
            for arm in &mut choice.arms {
                rewrite_block(&mut arm.body, diags);
            }
            if let Some(block) = &mut choice.default {
                rewrite_block(block, diags);
            }
        }
        StmtKind::Block(block) => rewrite_block(block, diags),
        _ => {}
    }
}

fn is_input_target(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Name(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
    )
}

/// `out << a << b` parses as `((out << a) << b)`; the console must sit at
/// the far left and every link must point the same way.
fn flatten_stream(chain: &Expr, span: Span, diags: &mut Diagnostics) -> Option<StmtKind> {
    let mut operands = Vec::new();
    let mut direction = None;
    let mut current = chain;
    loop {
        match &current.kind {
            ExprKind::Stream { op, left, right } => {
                if direction.is_some_and(|seen| seen != *op) {
                    diags.push(Diagnostic::new(ErrorCode::MalformedStream, span).arg("mixed stream directions"));
                    return None;
                }
                direction = Some(*op);
                operands.push((**right).clone());
                current = left;
            }
            ExprKind::Console => break,
            _ => {
                diags.push(Diagnostic::new(ErrorCode::MalformedStream, span).arg("missing console source"));
                return None;
            }
        }
    }
    operands.reverse();
    match direction {
        Some(StreamOp::Out) => Some(StmtKind::Output(operands)),
        Some(StreamOp::In) => {
            if let Some(bad) = operands.iter().find(|operand| !is_input_target(operand)) {
                diags.push(Diagnostic::new(ErrorCode::MalformedStream, bad.span).arg("input target is not assignable"));
                return None;
            }
            Some(StmtKind::Input(operands))
        }
        None => {
            diags.push(Diagnostic::new(ErrorCode::MalformedStream, span).arg("stream without operands"));
            None
        }
    }
}
