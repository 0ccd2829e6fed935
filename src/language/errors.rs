use crate::language::span::Span;
use miette::SourceSpan;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Scope,
    Type,
    Semantic,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Scope => write!(f, "scope error"),
            ErrorCategory::Type => write!(f, "type error"),
            ErrorCategory::Semantic => write!(f, "semantic error"),
        }
    }
}

/// Stable numeric codes for static diagnostics. Runtime errors use the 4xx
/// range, see `runtime::error::RuntimeError::code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Redeclaration = 101,
    Undeclared = 102,
    SelfReference = 103,
    SuperOutsideInheritance = 104,
    ThisOutsideClass = 105,
    DuplicateOverload = 106,
    UnknownMember = 107,
    InheritanceCycle = 108,
    NotAClass = 109,
    ImportFailed = 110,

    IncompatibleAssignment = 201,
    IncompatibleOperands = 202,
    InvalidCast = 203,
    ArgumentMismatch = 204,
    ReturnMismatch = 205,
    MissingReturnValue = 206,
    UnexpectedReturnValue = 207,
    ConditionNotBool = 208,
    GenericArity = 209,
    GenericBound = 210,
    NotIndexable = 211,
    IndexNotInt = 212,
    UnknownType = 213,
    NotAnObject = 214,
    InvalidRetype = 215,
    ChoiceLabelMismatch = 216,
    InvalidRange = 217,
    NotIterable = 218,
    UnaryOperand = 219,
    NotAssignable = 220,
    VoidOutput = 221,
    NotAValue = 222,
    InvalidInputTarget = 223,

    OperatorArity = 301,
    MalformedStream = 302,
    OutsideLoop = 303,
}

impl ErrorCode {
    pub fn number(self) -> u16 {
        self as u16
    }

    pub fn category(self) -> ErrorCategory {
        match self.number() / 100 {
            1 => ErrorCategory::Scope,
            2 => ErrorCategory::Type,
            _ => ErrorCategory::Semantic,
        }
    }

    /// Message template; `{0}`, `{1}`, ... are replaced by the diagnostic's arguments.
    pub fn template(self) -> &'static str {
        match self {
            ErrorCode::Redeclaration => "`{0}` is already declared in this scope",
            ErrorCode::Undeclared => "`{0}` is not declared",
            ErrorCode::SelfReference => "`{0}` is used in its own initializer",
            ErrorCode::SuperOutsideInheritance => "`super` used outside a class with a superclass",
            ErrorCode::ThisOutsideClass => "`this` used outside a method",
            ErrorCode::DuplicateOverload => "`{0}({1})` is already defined",
            ErrorCode::UnknownMember => "`{0}` has no member `{1}`",
            ErrorCode::InheritanceCycle => "class `{0}` inherits from itself",
            ErrorCode::NotAClass => "`{0}` is not a class",
            ErrorCode::ImportFailed => "cannot import `{0}`: {1}",
            ErrorCode::IncompatibleAssignment => "cannot assign `{1}` to `{0}`",
            ErrorCode::IncompatibleOperands => "operator `{0}` cannot combine `{1}` and `{2}`",
            ErrorCode::InvalidCast => "cannot cast `{0}` to `{1}`",
            ErrorCode::ArgumentMismatch => "no overload of `{0}` accepts ({1})",
            ErrorCode::ReturnMismatch => "cannot return `{1}` from a function returning `{0}`",
            ErrorCode::MissingReturnValue => "`{0}` must return a value of type `{1}`",
            ErrorCode::UnexpectedReturnValue => "`{0}` does not return a value",
            ErrorCode::ConditionNotBool => "condition has type `{0}`, expected `Bool`",
            ErrorCode::GenericArity => "`{0}` expects {1} type argument(s), found {2}",
            ErrorCode::GenericBound => "`{0}` does not satisfy the bound `{1}` of `{2}`",
            ErrorCode::NotIndexable => "`{0}` cannot be indexed with {1} index(es)",
            ErrorCode::IndexNotInt => "index has type `{0}`, expected `Int`",
            ErrorCode::UnknownType => "unknown type `{0}`",
            ErrorCode::NotAnObject => "`{0}` is not an object",
            ErrorCode::InvalidRetype => "cannot retype `{0}` as `{1}`",
            ErrorCode::ChoiceLabelMismatch => "label of type `{0}` does not match `{1}`",
            ErrorCode::InvalidRange => "cannot range over `{0}` and `{1}`",
            ErrorCode::NotIterable => "`{0}` is not iterable",
            ErrorCode::UnaryOperand => "operator `{0}` cannot be applied to `{1}`",
            ErrorCode::NotAssignable => "expression is not assignable",
            ErrorCode::VoidOutput => "cannot output a value of type `Void`",
            ErrorCode::NotAValue => "`{0}` is not a value",
            ErrorCode::InvalidInputTarget => "cannot read input into `{0}`",
            ErrorCode::OperatorArity => "operator `{0}` must take exactly one parameter",
            ErrorCode::MalformedStream => "malformed stream statement: {0}",
            ErrorCode::OutsideLoop => "`{0}` outside of a loop",
        }
    }

    pub fn fix_template(self) -> Option<&'static str> {
        match self {
            ErrorCode::Redeclaration => Some("rename one of the `{0}` declarations"),
            ErrorCode::Undeclared => Some("declare `{0}` before using it"),
            ErrorCode::SelfReference => Some("initialize `{0}` from other values"),
            ErrorCode::IncompatibleAssignment => Some("convert the value with a cast to `{0}`"),
            ErrorCode::MissingReturnValue => Some("return a `{1}` value"),
            ErrorCode::ConditionNotBool => Some("compare the value to produce a `Bool`"),
            ErrorCode::OutsideLoop => Some("move `{0}` inside a loop body"),
            ErrorCode::UnknownType => Some("declare a class or enumeration named `{0}`"),
            _ => None,
        }
    }
}

fn interpolate(template: &str, args: &[String]) -> String {
    let mut rendered = template.to_string();
    for (idx, arg) in args.iter().enumerate() {
        rendered = rendered.replace(&format!("{{{idx}}}"), arg);
    }
    rendered
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub args: Vec<String>,
    pub span: Span,
    pub fix: Option<String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, span: Span) -> Self {
        Self {
            code,
            args: Vec::new(),
            span,
            fix: code.fix_template().map(str::to_string),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn message(&self) -> String {
        interpolate(self.code.template(), &self.args)
    }

    pub fn help(&self) -> Option<String> {
        self.fix.as_deref().map(|fix| interpolate(fix, &self.args))
    }

    pub fn to_source_span(&self) -> SourceSpan {
        self.span.into()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} E{}: {}",
            self.code.category(),
            self.code.number(),
            self.message()
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(errors: Vec<Diagnostic>) -> Self {
        Self { errors }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter()
    }

    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|err| err.code).collect()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|err| err.code == code)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
