use crate::language::{
    ast::*,
    passes::resolve::enum_reference,
    symbols::{Callable, DeclId, DeclKind},
    types::{CollectionKind, Discrete, Scalar, Type},
    Context,
};
use crate::runtime::{
    environment::Environment,
    error::{RuntimeError, RuntimeResult},
    input,
    platform::Console,
    value::{EnumValue, ListRef, ObjectRef, Value},
};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::rc::Rc;
use tracing::{debug, instrument, trace};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Control flow threaded through statement execution. Loops consume
/// `Break` and `Continue`; call boundaries consume `Return`.
#[derive(Clone, Debug)]
pub enum Signal {
    None,
    Break,
    Continue,
    Return(Value),
}

/// Runtime state that outlives a single input: the global frame, the
/// bodies of every callable and class seen so far and the stop flag.
#[derive(Debug, Default)]
pub struct RuntimeState {
    env: Environment,
    functions: HashMap<DeclId, Rc<FunctionDecl>>,
    classes: HashMap<DeclId, Rc<ClassDecl>>,
    stopped: bool,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Value bound to `decl` in the global frame.
    pub fn global(&self, decl: DeclId) -> Option<Value> {
        self.env.get(decl)
    }
}

enum Place {
    Var(DeclId),
    Field(ObjectRef, DeclId),
    Element(ListRef, usize),
}

pub struct Interpreter<'a> {
    ctx: &'a Context,
    state: &'a mut RuntimeState,
    console: &'a mut dyn Console,
    max_call_depth: usize,
    call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a Context, state: &'a mut RuntimeState, console: &'a mut dyn Console) -> Self {
        Self {
            ctx,
            state,
            console,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_depth: 0,
        }
    }

    pub fn with_max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    /// Executes a checked program. A runtime error unwinds every frame but
    /// the global one; `stop` additionally refuses all later input.
    #[instrument(level = "debug", skip_all)]
    pub fn run(&mut self, program: &Program) -> RuntimeResult<()> {
        if self.state.stopped {
            return Err(RuntimeError::Stopped);
        }
        self.register(&program.items);
        let result = self.run_items(&program.items, true);
        if let Err(err) = &result {
            debug!(%err, code = err.code(), "unwinding to the global frame");
            self.state.env.unwind_to_global();
            self.call_depth = 0;
            if matches!(err, RuntimeError::Stopped) {
                self.state.stopped = true;
            }
        }
        result
    }

    fn register(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Import(import) => {
                    if let Some(unit) = &import.unit {
                        self.register(&unit.items);
                    }
                }
                Item::Function(function) if !function.is_generic() => {
                    if let Some(id) = function.id {
                        self.state.functions.insert(id, Rc::new(function.clone()));
                    }
                }
                Item::Class(class) if !class.is_generic() => {
                    for method in &class.methods {
                        if let Some(id) = method.id {
                            self.state.functions.insert(id, Rc::new(method.clone()));
                        }
                    }
                    if let Some(id) = class.id {
                        self.state.classes.insert(id, Rc::new(class.clone()));
                    }
                }
                _ => {}
            }
        }
    }

    /// Imported units bind their globals and run their statements; only the
    /// importing program's `main` runs.
    fn run_items(&mut self, items: &[Item], run_main: bool) -> RuntimeResult<()> {
        for item in items {
            match item {
                Item::Import(import) => {
                    if let Some(unit) = &import.unit {
                        self.run_items(&unit.items, false)?;
                    }
                }
                Item::Global(var) => self.bind_var(var)?,
                Item::Statement(stmt) => {
                    if let Signal::Return(_) = self.exec_stmt(stmt)? {
                        return Ok(());
                    }
                }
                Item::Main(block) if run_main => {
                    self.exec_block(block)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn bind_var(&mut self, var: &VarDecl) -> RuntimeResult<()> {
        let id = var.id.ok_or_else(|| unresolved(&var.name))?;
        let default = self.default_value(&var.ty);
        self.state.env.bind(id, default);
        if let Some(init) = &var.init {
            let value = self.eval(init)?;
            self.state.env.assign(id, value);
        }
        Ok(())
    }

    fn default_value(&self, ty: &Type) -> Value {
        match ty {
            Type::Discrete(Discrete::Bool) => Value::Bool(false),
            Type::Discrete(Discrete::Char) => Value::Char('\0'),
            Type::Discrete(Discrete::Int) => Value::Int(0),
            Type::Scalar(Scalar::Real) => Value::Real(0.0),
            Type::Scalar(Scalar::String | Scalar::Text) => Value::Str(String::new()),
            Type::Enum { name, .. } => self.enum_value(name, 0).unwrap_or(Value::Void),
            Type::List { .. } => Value::list(CollectionKind::List, Vec::new()),
            _ => Value::Void,
        }
    }

    fn enum_value(&self, name: &str, ordinal: usize) -> Option<Value> {
        let id = self.ctx.scopes.lookup_from(self.ctx.scopes.global(), name)?;
        let DeclKind::Enum { constants } = &self.ctx.symbols.get(id).kind else {
            return None;
        };
        let label = constants.get(ordinal)?;
        Some(Value::Enum(EnumValue {
            enum_name: name.to_string(),
            ordinal,
            label: label.clone(),
        }))
    }

    fn exec_block(&mut self, block: &Block) -> RuntimeResult<Signal> {
        self.state.env.push_block();
        let result = self.exec_stmts(&block.stmts);
        self.state.env.pop();
        result
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> RuntimeResult<Signal> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Signal::None => {}
                signal => return Ok(signal),
            }
        }
        Ok(Signal::None)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> RuntimeResult<Signal> {
        match &stmt.kind {
            StmtKind::Var(var) => self.bind_var(var)?,
            StmtKind::Assign { target, value } => {
                let place = self.place(target)?;
                let value = self.eval(value)?;
                self.store(place, value)?;
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    return self.exec_block(then_branch);
                }
                if let Some(block) = else_branch {
                    return self.exec_block(block);
                }
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition)? {
                    if let ControlFlow::Break(signal) = after_body(self.exec_block(body)?) {
                        return Ok(signal);
                    }
                }
            }
            StmtKind::DoWhile { body, condition } => loop {
                if let ControlFlow::Break(signal) = after_body(self.exec_block(body)?) {
                    return Ok(signal);
                }
                if !self.condition(condition)? {
                    break;
                }
            },
            StmtKind::For(for_stmt) => return self.exec_for(for_stmt),
            StmtKind::ForEach(for_each) => return self.exec_for_each(for_each),
            StmtKind::Choice(choice) => return self.exec_choice(choice),
            StmtKind::Break => return Ok(Signal::Break),
            StmtKind::Continue => return Ok(Signal::Continue),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Void,
                };
                return Ok(Signal::Return(value));
            }
            StmtKind::Stop => {
                debug!("stop requested");
                return Err(RuntimeError::Stopped);
            }
            StmtKind::Block(block) => return self.exec_block(block),
            StmtKind::Input(targets) => {
                for target in targets {
                    self.read_into(target)?;
                }
            }
            StmtKind::Output(values) => {
                let mut line = String::new();
                for value in values {
                    line.push_str(&self.eval(value)?.to_string());
                }
                self.console.write_line(&line);
            }
            StmtKind::Stream(_) => {
                return Err(RuntimeError::internal("stream statement was not flattened"));
            }
            StmtKind::Retype {
                target,
                class,
                fields,
            } => {
                let place = self.place(target)?;
                let object = self.construct_object(class, fields)?;
                self.store(place, Value::Object(object))?;
            }
        }
        Ok(Signal::None)
    }

    fn condition(&mut self, condition: &Expr) -> RuntimeResult<bool> {
        let value = self.eval(condition)?;
        value
            .as_bool()
            .ok_or_else(|| RuntimeError::internal(format!("condition evaluated to {}", value.type_name())))
    }

    fn exec_for(&mut self, for_stmt: &ForStmt) -> RuntimeResult<Signal> {
        let start = self.eval(&for_stmt.range.start)?;
        let end = self.eval(&for_stmt.range.end)?;
        let values = range_values(&start, &end, for_stmt.range.kind)?;
        self.run_loop(&for_stmt.var, values, &for_stmt.body)
    }

    fn exec_for_each(&mut self, for_each: &ForEachStmt) -> RuntimeResult<Signal> {
        let items = match self.eval(&for_each.collection)? {
            Value::List(list) => list.borrow().items.clone(),
            Value::Void => {
                return Err(RuntimeError::NoObject {
                    context: "for each".into(),
                })
            }
            other => {
                return Err(RuntimeError::internal(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };
        self.run_loop(&for_each.var, items.into_iter(), &for_each.body)
    }

    /// Binds the loop variable in its own frame and runs `body` once per value.
    fn run_loop(
        &mut self,
        var: &VarDecl,
        values: impl Iterator<Item = Value>,
        body: &Block,
    ) -> RuntimeResult<Signal> {
        let id = var.id.ok_or_else(|| unresolved(&var.name))?;
        self.state.env.push_block();
        let default = self.default_value(&var.ty);
        self.state.env.bind(id, default);
        let result = self.iterate(id, values, body);
        self.state.env.pop();
        result
    }

    fn iterate(
        &mut self,
        var: DeclId,
        values: impl Iterator<Item = Value>,
        body: &Block,
    ) -> RuntimeResult<Signal> {
        for value in values {
            self.state.env.assign(var, value);
            if let ControlFlow::Break(signal) = after_body(self.exec_block(body)?) {
                return Ok(signal);
            }
        }
        Ok(Signal::None)
    }

    fn exec_choice(&mut self, choice: &ChoiceStmt) -> RuntimeResult<Signal> {
        let scrutinee = self.eval(&choice.scrutinee)?;
        for arm in &choice.arms {
            if self.arm_matches(&scrutinee, &arm.labels)? {
                return self.exec_block(&arm.body);
            }
        }
        match &choice.default {
            Some(block) => self.exec_block(block),
            None => Ok(Signal::None),
        }
    }

    fn arm_matches(&mut self, scrutinee: &Value, labels: &[ChoiceLabel]) -> RuntimeResult<bool> {
        for label in labels {
            let matched = match label {
                ChoiceLabel::Value(value) => scrutinee.same(&self.eval(value)?),
                ChoiceLabel::Range(low, high) => {
                    let low = self.eval(low)?;
                    let high = self.eval(high)?;
                    scrutinee.compare(&low).is_some_and(|o| o.is_ge())
                        && scrutinee.compare(&high).is_some_and(|o| o.is_le())
                }
            };
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read_into(&mut self, target: &Expr) -> RuntimeResult<()> {
        let ty = target.ty();
        let place = self.place(target)?;
        let token = self
            .console
            .read_token()
            .ok_or_else(|| RuntimeError::MissingInput {
                target: describe_target(target),
            })?;
        trace!(%token, target = %describe_target(target), "input");
        let value = input::read_value(&token, &ty)?;
        self.store(place, value)
    }

    fn name_place(&mut self, decl: DeclId, name: &str) -> RuntimeResult<Place> {
        if self.ctx.symbols.get(decl).is_field() {
            Ok(Place::Field(self.this_object(name)?, decl))
        } else {
            Ok(Place::Var(decl))
        }
    }

    fn place(&mut self, target: &Expr) -> RuntimeResult<Place> {
        match &target.kind {
            ExprKind::Name(name) => {
                let id = name.decl.ok_or_else(|| unresolved(&name.name))?;
                self.name_place(id, &name.name)
            }
            ExprKind::Field { object, name, decl } => {
                let id = decl.ok_or_else(|| unresolved(name))?;
                let object = self.eval_object(object, name)?;
                Ok(Place::Field(object, id))
            }
            ExprKind::Index { base, indices } => {
                let (list, index) = self.locate(base, indices)?;
                Ok(Place::Element(list, index))
            }
            _ => Err(RuntimeError::internal("expression is not assignable")),
        }
    }

    fn store(&mut self, place: Place, value: Value) -> RuntimeResult<()> {
        match place {
            Place::Var(id) => {
                if self.state.env.assign(id, value) {
                    Ok(())
                } else {
                    Err(unresolved(&self.ctx.symbols.get(id).name))
                }
            }
            Place::Field(object, id) => {
                object.borrow_mut().fields.insert(id, value);
                Ok(())
            }
            Place::Element(list, index) => {
                let mut list = list.borrow_mut();
                let size = list.items.len();
                match list.items.get_mut(index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::IndexOutOfRange {
                        index: index as i64 + 1,
                        size,
                    }),
                }
            }
        }
    }

    fn this_object(&self, context: &str) -> RuntimeResult<ObjectRef> {
        self.state.env.this().ok_or_else(|| RuntimeError::NoObject {
            context: format!("`{context}`"),
        })
    }

    fn eval_object(&mut self, expr: &Expr, member: &str) -> RuntimeResult<ObjectRef> {
        match self.eval(expr)? {
            Value::Object(object) => Ok(object),
            Value::Void => Err(RuntimeError::NoObject {
                context: format!("access to `{member}`"),
            }),
            other => Err(RuntimeError::internal(format!(
                "`{member}` accessed on {}",
                other.type_name()
            ))),
        }
    }

    fn eval_list(&mut self, expr: &Expr) -> RuntimeResult<ListRef> {
        match self.eval(expr)? {
            Value::List(list) => Ok(list),
            Value::Void => Err(RuntimeError::NoObject {
                context: "indexing".into(),
            }),
            other => Err(RuntimeError::internal(format!("cannot index {}", other.type_name()))),
        }
    }

    fn eval_int(&mut self, expr: &Expr) -> RuntimeResult<i64> {
        let value = self.eval(expr)?;
        value
            .as_int()
            .ok_or_else(|| RuntimeError::internal(format!("expected Int, found {}", value.type_name())))
    }

    fn eval_args(&mut self, args: &[Expr]) -> RuntimeResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// Walks all but the last index and returns the innermost collection
    /// with the zero-based position of the last one.
    fn locate(&mut self, base: &Expr, indices: &[Expr]) -> RuntimeResult<(ListRef, usize)> {
        let mut list = self.eval_list(base)?;
        let positions = indices
            .iter()
            .map(|index| self.eval_int(index))
            .collect::<RuntimeResult<Vec<_>>>()?;
        let Some((last, outer)) = positions.split_last() else {
            return Err(RuntimeError::internal("index without positions"));
        };
        for &position in outer {
            let index = checked_index(&list, position)?;
            let inner = list.borrow().items.get(index).cloned();
            list = match inner {
                Some(Value::List(inner)) => inner,
                _ => return Err(RuntimeError::internal("indexing past the last dimension")),
            };
        }
        let index = checked_index(&list, *last)?;
        Ok((list, index))
    }

    fn eval(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Name(name) => self.read_name(name),
            ExprKind::This | ExprKind::Super => self.this_object("this").map(Value::Object),
            ExprKind::Console | ExprKind::Stream { .. } => {
                Err(RuntimeError::internal("console used as a value"))
            }
            ExprKind::Binary {
                op,
                left,
                right,
                overload,
            } => self.binary(*op, left, right, *overload),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            ExprKind::Call(call) => self.call(call),
            ExprKind::MethodCall(call) => self.method_call(call),
            ExprKind::Field { object, name, decl } => {
                if let Some(enum_id) = enum_reference(self.ctx, object) {
                    let decl = self.ctx.symbols.get(enum_id);
                    return decl
                        .enum_ordinal(name)
                        .and_then(|ordinal| self.enum_value(&decl.name, ordinal))
                        .ok_or_else(|| unresolved(name));
                }
                let id = decl.ok_or_else(|| unresolved(name))?;
                let object = self.eval_object(object, name)?;
                let value = object.borrow().fields.get(&id).cloned();
                value.ok_or_else(|| RuntimeError::ObjectTypeMismatch {
                    class: object.borrow().class_name.clone(),
                    member: name.clone(),
                })
            }
            ExprKind::Index { base, indices } => {
                let (list, index) = self.locate(base, indices)?;
                let value = list.borrow().items.get(index).cloned();
                value.ok_or_else(|| RuntimeError::internal("element vanished during indexing"))
            }
            ExprKind::New {
                class,
                args,
                constructor,
            } => self.construct(class, args, *constructor),
            ExprKind::ArrayNew { element, sizes } => {
                let sizes = sizes
                    .iter()
                    .map(|size| self.eval_int(size))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                self.new_array(element, &sizes)
            }
            ExprKind::Collection { kind, elements } => {
                let items = self.eval_args(elements)?;
                Ok(Value::list(*kind, items))
            }
            ExprKind::Cast { target, operand } => {
                let value = self.eval(operand)?;
                self.cast(value, target)
            }
            ExprKind::InstanceOf { operand, class } => {
                let value = self.eval(operand)?;
                let is_instance = match (value, self.ctx.class_of(class)) {
                    (Value::Object(object), Some(class)) => {
                        self.ctx.symbols.is_subclass(object.borrow().class, class)
                    }
                    _ => false,
                };
                Ok(Value::Bool(is_instance))
            }
        }
    }

    fn read_name(&mut self, name: &NameRef) -> RuntimeResult<Value> {
        let id = name.decl.ok_or_else(|| unresolved(&name.name))?;
        let decl = self.ctx.symbols.get(id);
        if decl.is_field() {
            let this = self.this_object(&name.name)?;
            let value = this.borrow().fields.get(&id).cloned();
            // Fields read by an earlier field initializer see their default.
            return Ok(value.unwrap_or_else(|| self.default_value(&decl.ty)));
        }
        self.state.env.get(id).ok_or_else(|| unresolved(&name.name))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        overload: Option<DeclId>,
    ) -> RuntimeResult<Value> {
        let lhs = self.eval(left)?;
        if op.is_logical() {
            let lhs = truth(&lhs)?;
            let short_circuit = match op {
                BinaryOp::And => !lhs,
                _ => lhs,
            };
            if short_circuit {
                return Ok(Value::Bool(lhs));
            }
            let rhs = self.eval(right)?;
            return truth(&rhs).map(Value::Bool);
        }
        let rhs = self.eval(right)?;
        if let Some(method) = overload {
            let Value::Object(object) = lhs else {
                return Err(RuntimeError::NoObject {
                    context: format!("operator {}", op.symbol()),
                });
            };
            let target = self.dispatch(&object, method)?;
            return self.invoke(target, vec![rhs], &[], Some(object));
        }
        apply_binary(op, lhs, rhs)
    }

    fn call(&mut self, call: &Call) -> RuntimeResult<Value> {
        let target = call.target.ok_or_else(|| unresolved(&call.name))?;
        let values = self.eval_args(&call.args)?;
        if let DeclKind::Method(_) = self.ctx.symbols.get(target).kind {
            let this = self.this_object(&call.name)?;
            let target = self.dispatch(&this, target)?;
            return self.invoke(target, values, &call.args, Some(this));
        }
        self.invoke(target, values, &call.args, None)
    }

    fn method_call(&mut self, call: &MethodCall) -> RuntimeResult<Value> {
        if let Some(builtin) = call.builtin {
            return self.builtin(builtin, call);
        }
        let target = call.target.ok_or_else(|| unresolved(&call.name))?;
        let receiver = self.eval(&call.receiver)?;
        let values = self.eval_args(&call.args)?;
        let object = match receiver {
            Value::Object(object) => object,
            Value::Void => {
                return Err(RuntimeError::NoObject {
                    context: format!("call to `{}`", call.name),
                })
            }
            other => {
                return Err(RuntimeError::internal(format!(
                    "method `{}` called on {}",
                    call.name,
                    other.type_name()
                )))
            }
        };
        let target = match call.receiver.kind {
            ExprKind::Super => target,
            _ => self.dispatch(&object, target)?,
        };
        self.invoke(target, values, &call.args, Some(object))
    }

    /// Method of the receiver's current class (or nearest ancestor) with the
    /// name and signature of `target`.
    fn dispatch(&self, object: &ObjectRef, target: DeclId) -> RuntimeResult<DeclId> {
        let decl = self.ctx.symbols.get(target);
        let signature = decl.callable().map(Callable::signature);
        let class = object.borrow().class;
        let found = self
            .ctx
            .symbols
            .get(class)
            .class_info()
            .and_then(|info| {
                self.ctx
                    .scopes
                    .member_overloads(info.scope, &decl.name)
                    .into_iter()
                    .map(|(_, id)| id)
                    .find(|id| self.ctx.symbols.get(*id).callable().map(Callable::signature) == signature)
            });
        found.ok_or_else(|| RuntimeError::ObjectTypeMismatch {
            class: object.borrow().class_name.clone(),
            member: decl.name.clone(),
        })
    }

    /// Runs a callable in a fresh call frame. `args` are the argument
    /// expressions, used to copy `out`/`inout`/`ref` values back into bare
    /// variable arguments.
    fn invoke(
        &mut self,
        target: DeclId,
        values: Vec<Value>,
        args: &[Expr],
        this: Option<ObjectRef>,
    ) -> RuntimeResult<Value> {
        let function = self
            .state
            .functions
            .get(&target)
            .cloned()
            .ok_or_else(|| unresolved(&self.ctx.symbols.get(target).name))?;
        if self.call_depth >= self.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.max_call_depth,
            });
        }
        trace!(function = %function.name, depth = self.call_depth, "call");
        self.call_depth += 1;
        self.state.env.push_call(this);
        let result = self.run_body(&function, values);
        let copies = self.copy_back_values(&function);
        self.state.env.pop();
        self.call_depth -= 1;
        let signal = result?;
        for (position, value) in copies {
            let Some(ExprKind::Name(name)) = args.get(position).map(|arg| &arg.kind) else {
                continue;
            };
            if let Some(id) = name.decl {
                let place = self.name_place(id, &name.name)?;
                self.store(place, value)?;
            }
        }
        match signal {
            Signal::Return(value) => Ok(value),
            _ => Ok(self.default_value(&function.ret)),
        }
    }

    fn run_body(&mut self, function: &FunctionDecl, values: Vec<Value>) -> RuntimeResult<Signal> {
        for (param, value) in function.params.iter().zip(values) {
            let id = param.id.ok_or_else(|| unresolved(&param.name))?;
            let value = match param.mode {
                ParamMode::Out => self.default_value(&param.ty),
                _ => value,
            };
            self.state.env.bind(id, value);
        }
        self.exec_stmts(&function.body.stmts)
    }

    fn copy_back_values(&self, function: &FunctionDecl) -> Vec<(usize, Value)> {
        function
            .params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.mode.copies_back())
            .filter_map(|(position, param)| Some((position, self.state.env.get(param.id?)?)))
            .collect()
    }

    fn builtin(&mut self, builtin: Builtin, call: &MethodCall) -> RuntimeResult<Value> {
        let receiver = self.eval(&call.receiver)?;
        let args = self.eval_args(&call.args)?;
        match (builtin, receiver) {
            (Builtin::Length, Value::Str(text)) => Ok(Value::Int(text.chars().count() as i64)),
            (builtin, Value::List(list)) => list_builtin(builtin, &list, args),
            (_, Value::Void) => Err(RuntimeError::NoObject {
                context: format!("call to `{}`", call.name),
            }),
            (_, other) => Err(RuntimeError::internal(format!(
                "`{}` called on {}",
                call.name,
                other.type_name()
            ))),
        }
    }

    fn construct(
        &mut self,
        class: &Type,
        args: &NewArgs,
        constructor: Option<DeclId>,
    ) -> RuntimeResult<Value> {
        match args {
            NewArgs::Named(fields) => self.construct_object(class, fields).map(Value::Object),
            NewArgs::Positional(exprs) => {
                let target = constructor.ok_or_else(|| unresolved(&format!("{class}.new")))?;
                let values = self.eval_args(exprs)?;
                let object = self.construct_object(class, &[])?;
                self.invoke(target, values, exprs, Some(Rc::clone(&object)))?;
                Ok(Value::Object(object))
            }
        }
    }

    /// Sets the supplied fields, then every remaining field (ancestors
    /// first) from its initializer or its type's default.
    fn construct_object(&mut self, class_ty: &Type, fields: &[FieldInit]) -> RuntimeResult<ObjectRef> {
        let class = self
            .ctx
            .class_of(class_ty)
            .ok_or_else(|| unresolved(&class_ty.to_string()))?;
        let object = Value::object(class, self.ctx.symbols.get(class).name.clone());
        let scope = self.ctx.symbols.get(class).class_info().map(|info| info.scope);
        let mut supplied = HashSet::new();
        for field in fields {
            let value = self.eval(&field.value)?;
            let id = scope
                .and_then(|scope| self.ctx.scopes.lookup_member(scope, &field.name))
                .filter(|id| self.ctx.symbols.get(*id).is_field())
                .ok_or_else(|| RuntimeError::ObjectTypeMismatch {
                    class: class_ty.to_string(),
                    member: field.name.clone(),
                })?;
            object.borrow_mut().fields.insert(id, value);
            supplied.insert(id);
        }
        for ancestor in self.ctx.symbols.class_chain(class).into_iter().rev() {
            let Some(decl) = self.state.classes.get(&ancestor).cloned() else {
                continue;
            };
            for field in &decl.fields {
                let Some(id) = field.id else {
                    continue;
                };
                if supplied.contains(&id) {
                    continue;
                }
                let value = match &field.init {
                    Some(init) => {
                        self.state.env.push_call(Some(Rc::clone(&object)));
                        let value = self.eval(init);
                        self.state.env.pop();
                        value?
                    }
                    None => self.default_value(&field.ty),
                };
                object.borrow_mut().fields.insert(id, value);
            }
        }
        for id in self.ctx.symbols.all_fields(class) {
            if !object.borrow().fields.contains_key(&id) {
                let default = self.default_value(&self.ctx.symbols.get(id).ty);
                object.borrow_mut().fields.insert(id, default);
            }
        }
        Ok(object)
    }

    fn new_array(&self, element: &Type, sizes: &[i64]) -> RuntimeResult<Value> {
        let Some((&size, rest)) = sizes.split_first() else {
            return Ok(self.default_value(element));
        };
        let count = usize::try_from(size).map_err(|_| RuntimeError::IndexOutOfRange { index: size, size: 0 })?;
        let items = (0..count)
            .map(|_| self.new_array(element, rest))
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Value::list(CollectionKind::Array, items))
    }

    fn cast(&self, value: Value, target: &Type) -> RuntimeResult<Value> {
        let invalid = |value: &Value| RuntimeError::InvalidCast {
            value: value.to_string(),
            target: target.to_string(),
        };
        match (value, target) {
            (Value::Int(v), Type::Scalar(Scalar::Real)) => Ok(Value::Real(v as f64)),
            (Value::Real(v), Type::Discrete(Discrete::Int)) => Ok(Value::Int(v.trunc() as i64)),
            (Value::Char(c), Type::Discrete(Discrete::Int)) => Ok(Value::Int(c as u32 as i64)),
            (Value::Int(v), Type::Discrete(Discrete::Char)) => u32::try_from(v)
                .ok()
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(|| invalid(&Value::Int(v))),
            (Value::Enum(value), Type::Discrete(Discrete::Int)) => Ok(Value::Int(value.ordinal as i64)),
            (Value::Int(v), Type::Enum { name, .. }) => usize::try_from(v)
                .ok()
                .and_then(|ordinal| self.enum_value(name, ordinal))
                .ok_or_else(|| invalid(&Value::Int(v))),
            (value @ (Value::List(_) | Value::Object(_) | Value::Void), target)
                if target.is_textual() =>
            {
                Err(invalid(&value))
            }
            (value, target) if target.is_textual() => Ok(Value::Str(value.to_string())),
            (Value::Str(text), target) if target.is_primitive() => {
                input::convert(&text, target).ok_or_else(|| invalid(&Value::Str(text.clone())))
            }
            (Value::Object(object), target) if target.is_object() => {
                let class = object.borrow().class;
                match self.ctx.class_of(target) {
                    Some(wanted) if self.ctx.symbols.is_subclass(class, wanted) => Ok(Value::Object(object)),
                    _ => Err(invalid(&Value::Object(object))),
                }
            }
            (value, _) => Ok(value),
        }
    }
}

fn unresolved(name: &str) -> RuntimeError {
    RuntimeError::internal(format!("`{name}` is not bound at runtime"))
}

fn describe_target(target: &Expr) -> String {
    match &target.kind {
        ExprKind::Name(name) => name.name.clone(),
        ExprKind::Field { name, .. } => name.clone(),
        ExprKind::Index { .. } => "collection element".into(),
        _ => "input target".into(),
    }
}

/// What a loop does with the signal its body produced.
fn after_body(signal: Signal) -> ControlFlow<Signal> {
    match signal {
        Signal::Break => ControlFlow::Break(Signal::None),
        Signal::Return(value) => ControlFlow::Break(Signal::Return(value)),
        Signal::None | Signal::Continue => ControlFlow::Continue(()),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Bool(v) => Value::Bool(*v),
        Literal::Char(v) => Value::Char(*v),
        Literal::Int(v) => Value::Int(*v),
        Literal::Real(v) => Value::Real(*v),
        Literal::String(v) | Literal::Text(v) => Value::Str(v.clone()),
    }
}

fn truth(value: &Value) -> RuntimeResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| RuntimeError::internal(format!("expected Bool, found {}", value.type_name())))
}

fn checked_index(list: &ListRef, position: i64) -> RuntimeResult<usize> {
    let size = list.borrow().items.len();
    match usize::try_from(position) {
        Ok(index) if (1..=size).contains(&index) => Ok(index - 1),
        _ => Err(RuntimeError::IndexOutOfRange {
            index: position,
            size,
        }),
    }
}

/// Ascending range values. `<` on either side of `..` drops that bound.
fn range_values(
    start: &Value,
    end: &Value,
    kind: RangeKind,
) -> RuntimeResult<Box<dyn Iterator<Item = Value>>> {
    let skip_start = matches!(kind, RangeKind::ExcludeStart | RangeKind::Exclusive);
    let skip_end = matches!(kind, RangeKind::ExcludeEnd | RangeKind::Exclusive);
    match (start, end) {
        (Value::Int(start), Value::Int(end)) => {
            let low = match (skip_start, start.checked_add(1)) {
                (false, _) => *start,
                (true, Some(next)) => next,
                // Nothing lies above `i64::MAX`.
                (true, None) => return Ok(Box::new(std::iter::empty::<Value>())),
            };
            let values: Box<dyn Iterator<Item = i64>> = if skip_end {
                Box::new(low..*end)
            } else {
                Box::new(low..=*end)
            };
            Ok(Box::new(values.map(Value::Int)))
        }
        (Value::Char(start), Value::Char(end)) => {
            let low = *start as u32 + u32::from(skip_start);
            let high = *end as u32;
            let values: Box<dyn Iterator<Item = u32>> = if skip_end {
                Box::new(low..high)
            } else {
                Box::new(low..=high)
            };
            Ok(Box::new(values.filter_map(char::from_u32).map(Value::Char)))
        }
        (Value::Real(start), Value::Real(end)) => {
            let end = *end;
            let first = if skip_start { start + 1.0 } else { *start };
            let values = std::iter::successors(Some(first), |x| Some(x + 1.0))
                .take_while(move |x| if skip_end { *x < end } else { *x <= end });
            Ok(Box::new(values.map(Value::Real)))
        }
        _ => Err(RuntimeError::internal(format!(
            "range over {} and {}",
            start.type_name(),
            end.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: Value) -> RuntimeResult<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Real(v)) => Ok(Value::Real(-v)),
        (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
        (op, value) => Err(RuntimeError::internal(format!(
            "operator {} on {}",
            op.symbol(),
            value.type_name()
        ))),
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> RuntimeResult<Value> {
    if op.is_equality() {
        let equal = lhs.same(&rhs);
        return Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }));
    }
    if op.is_ordering() {
        let ordering = lhs.compare(&rhs).ok_or_else(|| {
            RuntimeError::internal(format!("cannot order {} and {}", lhs.type_name(), rhs.type_name()))
        })?;
        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::LtEq => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        };
        return Ok(Value::Bool(result));
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b).map(Value::Int),
        (Value::Real(a), Value::Real(b)) => real_arithmetic(op, a, b).map(Value::Real),
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(a + &b)),
        (a, b) => Err(RuntimeError::internal(format!(
            "operator {} on {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> RuntimeResult<i64> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => Err(RuntimeError::DivisionByZero),
        BinaryOp::Div => Ok(a.wrapping_div(b)),
        BinaryOp::Rem => Ok(a.wrapping_rem(b)),
        _ => Err(RuntimeError::internal(format!("operator {} on Int", op.symbol()))),
    }
}

fn real_arithmetic(op: BinaryOp, a: f64, b: f64) -> RuntimeResult<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => Err(RuntimeError::DivisionByZero),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::Rem => Ok(a % b),
        _ => Err(RuntimeError::internal(format!("operator {} on Real", op.symbol()))),
    }
}

fn list_builtin(builtin: Builtin, list: &ListRef, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut args = args.into_iter();
    let mut list = list.borrow_mut();
    let size = list.items.len();
    match builtin {
        Builtin::Size => Ok(Value::Int(size as i64)),
        Builtin::Contains => {
            let needle = args.next().unwrap_or(Value::Void);
            Ok(Value::Bool(list.items.iter().any(|item| item.same(&needle))))
        }
        Builtin::Append => {
            list.items.push(args.next().unwrap_or(Value::Void));
            Ok(Value::Void)
        }
        Builtin::Insert => {
            let position = args.next().and_then(|v| v.as_int()).unwrap_or(0);
            let value = args.next().unwrap_or(Value::Void);
            match usize::try_from(position) {
                Ok(index) if (1..=size + 1).contains(&index) => {
                    list.items.insert(index - 1, value);
                    Ok(Value::Void)
                }
                _ => Err(RuntimeError::IndexOutOfRange {
                    index: position,
                    size,
                }),
            }
        }
        Builtin::Remove => {
            let position = args.next().and_then(|v| v.as_int()).unwrap_or(0);
            match usize::try_from(position) {
                Ok(index) if (1..=size).contains(&index) => {
                    list.items.remove(index - 1);
                    Ok(Value::Void)
                }
                _ => Err(RuntimeError::RemoveFailed {
                    index: position,
                    size,
                }),
            }
        }
        Builtin::Length => Err(RuntimeError::internal("length() on a collection")),
    }
}
