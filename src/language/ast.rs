use crate::language::{
    scope::ScopeId,
    span::Span,
    symbols::DeclId,
    types::{CollectionKind, Type},
};

/// A whole program (or one interactive input) as handed over by the parser.
///
/// Passes decorate the nodes in place: declaration ids, scope ids and
/// expression types start out empty and are filled in by resolution and
/// checking.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}

#[derive(Clone, Debug)]
pub enum Item {
    Import(Import),
    Class(ClassDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    Global(VarDecl),
    Main(Block),
    Statement(Stmt),
}

#[derive(Clone, Debug)]
pub struct Import {
    pub file: String,
    pub unit: Option<Box<Program>>,
    pub span: Span,
}

impl Import {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            unit: None,
            span: Span::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeParam {
    pub name: String,
    pub bound: Option<Type>,
    pub span: Span,
    pub id: Option<DeclId>,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: None,
            span: Span::default(),
            id: None,
        }
    }

    pub fn bounded(name: impl Into<String>, bound: Type) -> Self {
        Self {
            bound: Some(bound),
            ..Self::new(name)
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<Type>,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<FunctionDecl>,
    pub auto_constructor: bool,
    pub span: Span,
    pub id: Option<DeclId>,
    pub scope: Option<ScopeId>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            superclass: None,
            fields: Vec::new(),
            methods: Vec::new(),
            auto_constructor: false,
            span: Span::default(),
            id: None,
            scope: None,
        }
    }

    pub fn extends(mut self, superclass: Type) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn type_param(mut self, param: TypeParam) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn field(mut self, field: VarDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: FunctionDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_auto_constructor(mut self) -> Self {
        self.auto_constructor = true;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub name: String,
    pub constants: Vec<EnumConstant>,
    pub span: Span,
    pub id: Option<DeclId>,
}

impl EnumDecl {
    pub fn new(name: impl Into<String>, constants: &[&str]) -> Self {
        Self {
            name: name.into(),
            constants: constants
                .iter()
                .map(|name| EnumConstant {
                    name: (*name).to_string(),
                    span: Span::default(),
                    id: None,
                })
                .collect(),
            span: Span::default(),
            id: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnumConstant {
    pub name: String,
    pub span: Span,
    pub id: Option<DeclId>,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
    pub operator: Option<BinaryOp>,
    pub span: Span,
    pub id: Option<DeclId>,
    pub scope: Option<ScopeId>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Type, body: Block) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            params,
            ret,
            body,
            operator: None,
            span: Span::default(),
            id: None,
            scope: None,
        }
    }

    /// An operator overload method such as `operator+`.
    pub fn operator(op: BinaryOp, params: Vec<Param>, ret: Type, body: Block) -> Self {
        let mut decl = Self::new(operator_method_name(op), params, ret, body);
        decl.operator = Some(op);
        decl
    }

    pub fn type_param(mut self, param: TypeParam) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

pub fn operator_method_name(op: BinaryOp) -> String {
    format!("operator{}", op.symbol())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamMode {
    In,
    Out,
    InOut,
    Ref,
}

impl ParamMode {
    pub fn copies_back(self) -> bool {
        !matches!(self, ParamMode::In)
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub mode: ParamMode,
    pub span: Span,
    pub id: Option<DeclId>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self::with_mode(name, ty, ParamMode::In)
    }

    pub fn with_mode(name: impl Into<String>, ty: Type, mode: ParamMode) -> Self {
        Self {
            name: name.into(),
            ty,
            mode,
            span: Span::default(),
            id: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub property: bool,
    pub span: Span,
    pub id: Option<DeclId>,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: Type, init: Option<Expr>) -> Self {
        Self {
            name: name.into(),
            ty,
            init,
            property: false,
            span: Span::default(),
            id: None,
        }
    }

    pub fn as_property(mut self) -> Self {
        self.property = true;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
    pub scope: Option<ScopeId>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            span: Span::default(),
            scope: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Var(VarDecl),
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        condition: Expr,
    },
    For(ForStmt),
    ForEach(ForEachStmt),
    Choice(ChoiceStmt),
    Break,
    Continue,
    Return(Option<Expr>),
    Stop,
    Block(Block),
    Input(Vec<Expr>),
    Output(Vec<Expr>),
    /// Unflattened `in >> a >> b` / `out << a << b` chain.
    Stream(Expr),
    Retype {
        target: Expr,
        class: Type,
        fields: Vec<FieldInit>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// `a .. b`
    Inclusive,
    /// `a <.. b`
    ExcludeStart,
    /// `a ..< b`
    ExcludeEnd,
    /// `a <..< b`
    Exclusive,
}

impl RangeKind {
    pub fn symbol(self) -> &'static str {
        match self {
            RangeKind::Inclusive => "..",
            RangeKind::ExcludeStart => "<..",
            RangeKind::ExcludeEnd => "..<",
            RangeKind::Exclusive => "<..<",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RangeExpr {
    pub start: Expr,
    pub end: Expr,
    pub kind: RangeKind,
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    pub var: VarDecl,
    pub range: RangeExpr,
    pub body: Block,
    pub scope: Option<ScopeId>,
}

#[derive(Clone, Debug)]
pub struct ForEachStmt {
    pub var: VarDecl,
    pub collection: Expr,
    pub body: Block,
    pub scope: Option<ScopeId>,
}

#[derive(Clone, Debug)]
pub struct ChoiceStmt {
    pub scrutinee: Expr,
    pub arms: Vec<ChoiceArm>,
    pub default: Option<Block>,
}

#[derive(Clone, Debug)]
pub struct ChoiceArm {
    pub labels: Vec<ChoiceLabel>,
    pub body: Block,
}

#[derive(Clone, Debug)]
pub enum ChoiceLabel {
    Value(Expr),
    Range(Expr, Expr),
}

#[derive(Clone, Debug)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

impl FieldInit {
    pub fn new(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value,
            span: Span::default(),
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn var(name: impl Into<String>, ty: Type, init: Option<Expr>) -> Self {
        Self::new(StmtKind::Var(VarDecl::new(name, ty, init)))
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assign { target, value })
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn if_then(condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Self {
        Self::new(StmtKind::If {
            condition,
            then_branch: Block::new(then_branch),
            else_branch: else_branch.map(Block::new),
        })
    }

    pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::While {
            condition,
            body: Block::new(body),
        })
    }

    pub fn do_while(body: Vec<Stmt>, condition: Expr) -> Self {
        Self::new(StmtKind::DoWhile {
            body: Block::new(body),
            condition,
        })
    }

    pub fn for_range(
        var: impl Into<String>,
        ty: Type,
        start: Expr,
        kind: RangeKind,
        end: Expr,
        body: Vec<Stmt>,
    ) -> Self {
        Self::new(StmtKind::For(ForStmt {
            var: VarDecl::new(var, ty, None),
            range: RangeExpr { start, end, kind },
            body: Block::new(body),
            scope: None,
        }))
    }

    pub fn for_each(var: impl Into<String>, ty: Type, collection: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::ForEach(ForEachStmt {
            var: VarDecl::new(var, ty, None),
            collection,
            body: Block::new(body),
            scope: None,
        }))
    }

    pub fn choice(scrutinee: Expr, arms: Vec<ChoiceArm>, default: Option<Vec<Stmt>>) -> Self {
        Self::new(StmtKind::Choice(ChoiceStmt {
            scrutinee,
            arms,
            default: default.map(Block::new),
        }))
    }

    pub fn break_loop() -> Self {
        Self::new(StmtKind::Break)
    }

    pub fn continue_loop() -> Self {
        Self::new(StmtKind::Continue)
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn stop() -> Self {
        Self::new(StmtKind::Stop)
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(Block::new(stmts)))
    }

    pub fn input(targets: Vec<Expr>) -> Self {
        Self::new(StmtKind::Input(targets))
    }

    pub fn output(values: Vec<Expr>) -> Self {
        Self::new(StmtKind::Output(values))
    }

    pub fn stream(chain: Expr) -> Self {
        Self::new(StmtKind::Stream(chain))
    }

    pub fn retype(target: Expr, class: Type, fields: Vec<FieldInit>) -> Self {
        Self::new(StmtKind::Retype {
            target,
            class,
            fields,
        })
    }
}

impl ChoiceArm {
    pub fn new(labels: Vec<ChoiceLabel>, body: Vec<Stmt>) -> Self {
        Self {
            labels,
            body: Block::new(body),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<Type>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Name(NameRef),
    This,
    Super,
    /// Console endpoint at the head of a stream chain.
    Console,
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        overload: Option<DeclId>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Stream {
        op: StreamOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call(Call),
    MethodCall(MethodCall),
    Field {
        object: Box<Expr>,
        name: String,
        decl: Option<DeclId>,
    },
    Index {
        base: Box<Expr>,
        indices: Vec<Expr>,
    },
    New {
        class: Type,
        args: NewArgs,
        constructor: Option<DeclId>,
    },
    ArrayNew {
        element: Type,
        sizes: Vec<Expr>,
    },
    Collection {
        kind: CollectionKind,
        elements: Vec<Expr>,
    },
    Cast {
        target: Type,
        operand: Box<Expr>,
    },
    InstanceOf {
        operand: Box<Expr>,
        class: Type,
    },
}

#[derive(Clone, Debug)]
pub struct NameRef {
    pub name: String,
    pub decl: Option<DeclId>,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub name: String,
    pub type_args: Vec<Type>,
    pub args: Vec<Expr>,
    pub scope: Option<ScopeId>,
    pub target: Option<DeclId>,
}

impl Call {
    /// Overload-table name: the instantiation key for explicit type arguments.
    pub fn lookup_name(&self) -> String {
        if self.type_args.is_empty() {
            self.name.clone()
        } else {
            Type::generic(self.name.clone(), self.type_args.clone()).to_string()
        }
    }
}

#[derive(Clone, Debug)]
pub struct MethodCall {
    pub receiver: Box<Expr>,
    pub name: String,
    pub args: Vec<Expr>,
    pub target: Option<DeclId>,
    pub builtin: Option<Builtin>,
}

/// Collection and string operations served by the runtime itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Size,
    Append,
    Insert,
    Remove,
    Contains,
    Length,
}

#[derive(Clone, Debug)]
pub enum NewArgs {
    Named(Vec<FieldInit>),
    Positional(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Char(char),
    Int(i64),
    Real(f64),
    String(String),
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOp {
    In,
    Out,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            span: Span::default(),
            ty: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn real(value: f64) -> Self {
        Self::new(ExprKind::Literal(Literal::Real(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn char(value: char) -> Self {
        Self::new(ExprKind::Literal(Literal::Char(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(Literal::String(value.into())))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(Literal::Text(value.into())))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Name(NameRef {
            name: name.into(),
            decl: None,
        }))
    }

    pub fn this() -> Self {
        Self::new(ExprKind::This)
    }

    pub fn super_ref() -> Self {
        Self::new(ExprKind::Super)
    }

    pub fn console() -> Self {
        Self::new(ExprKind::Console)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            overload: None,
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn stream(op: StreamOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Stream {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::generic_call(name, Vec::new(), args)
    }

    pub fn generic_call(name: impl Into<String>, type_args: Vec<Type>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call(Call {
            name: name.into(),
            type_args,
            args,
            scope: None,
            target: None,
        }))
    }

    pub fn method(receiver: Expr, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::MethodCall(MethodCall {
            receiver: Box::new(receiver),
            name: name.into(),
            args,
            target: None,
            builtin: None,
        }))
    }

    pub fn field(object: Expr, name: impl Into<String>) -> Self {
        Self::new(ExprKind::Field {
            object: Box::new(object),
            name: name.into(),
            decl: None,
        })
    }

    pub fn index(base: Expr, indices: Vec<Expr>) -> Self {
        Self::new(ExprKind::Index {
            base: Box::new(base),
            indices,
        })
    }

    pub fn new_named(class: Type, fields: Vec<FieldInit>) -> Self {
        Self::new(ExprKind::New {
            class,
            args: NewArgs::Named(fields),
            constructor: None,
        })
    }

    pub fn new_positional(class: Type, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::New {
            class,
            args: NewArgs::Positional(args),
            constructor: None,
        })
    }

    pub fn array_new(element: Type, sizes: Vec<Expr>) -> Self {
        Self::new(ExprKind::ArrayNew { element, sizes })
    }

    pub fn list(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::Collection {
            kind: CollectionKind::List,
            elements,
        })
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::Collection {
            kind: CollectionKind::Array,
            elements,
        })
    }

    pub fn cast(target: Type, operand: Expr) -> Self {
        Self::new(ExprKind::Cast {
            target,
            operand: Box::new(operand),
        })
    }

    pub fn instance_of(operand: Expr, class: Type) -> Self {
        Self::new(ExprKind::InstanceOf {
            operand: Box::new(operand),
            class,
        })
    }

    pub fn as_name(&self) -> Option<&NameRef> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn ty(&self) -> Type {
        self.ty.clone().unwrap_or(Type::Unknown)
    }
}
