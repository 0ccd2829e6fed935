use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Discrete {
    Bool,
    Char,
    Int,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    String,
    Text,
    Real,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Array,
    List,
}

/// Structural type of a declaration or expression.
///
/// `Param` only appears inside generic templates and `Unknown` is the
/// placeholder left behind by a failed check.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Discrete(Discrete),
    Scalar(Scalar),
    Array { base: Box<Type>, dims: usize },
    List { base: Box<Type>, dims: usize },
    Class { name: String, args: Vec<Type> },
    Enum { name: String, underlying: Discrete },
    Multi { initial: Box<Type>, members: Vec<Type> },
    Param(String),
    Unknown,
}

impl Type {
    pub fn bool() -> Self {
        Type::Discrete(Discrete::Bool)
    }

    pub fn char() -> Self {
        Type::Discrete(Discrete::Char)
    }

    pub fn int() -> Self {
        Type::Discrete(Discrete::Int)
    }

    pub fn real() -> Self {
        Type::Scalar(Scalar::Real)
    }

    pub fn string() -> Self {
        Type::Scalar(Scalar::String)
    }

    pub fn text() -> Self {
        Type::Scalar(Scalar::Text)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Type::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Class {
            name: name.into(),
            args,
        }
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Type::Enum {
            name: name.into(),
            underlying: Discrete::Int,
        }
    }

    /// One-dimensional list of `element`; a list element folds into an extra dimension.
    pub fn list(element: Type) -> Self {
        Type::collection(CollectionKind::List, element, 1)
    }

    pub fn array(element: Type, dims: usize) -> Self {
        Type::collection(CollectionKind::Array, element, dims)
    }

    pub fn collection(kind: CollectionKind, element: Type, dims: usize) -> Self {
        let (base, dims) = match (kind, element) {
            (CollectionKind::List, Type::List { base, dims: inner }) => (base, dims + inner),
            (CollectionKind::Array, Type::Array { base, dims: inner }) => (base, dims + inner),
            (_, other) => (Box::new(other), dims),
        };
        match kind {
            CollectionKind::List => Type::List { base, dims },
            CollectionKind::Array => Type::Array { base, dims },
        }
    }

    pub fn collection_parts(&self) -> Option<(CollectionKind, &Type, usize)> {
        match self {
            Type::List { base, dims } => Some((CollectionKind::List, base, *dims)),
            Type::Array { base, dims } => Some((CollectionKind::Array, base, *dims)),
            _ => None,
        }
    }

    /// Type produced by applying `count` indices to a collection.
    pub fn indexed(&self, count: usize) -> Option<Type> {
        let (kind, base, dims) = self.collection_parts()?;
        if count == 0 || count > dims {
            return None;
        }
        if count == dims {
            Some(base.clone())
        } else {
            Some(Type::collection(kind, base.clone(), dims - count))
        }
    }

    pub fn element(&self) -> Option<Type> {
        self.indexed(1)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Discrete(Discrete::Bool))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Discrete(Discrete::Int) | Type::Scalar(Scalar::Real)
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Type::Scalar(Scalar::String | Scalar::Text))
    }

    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            Type::Discrete(Discrete::Int | Discrete::Char) | Type::Scalar(_)
        )
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Discrete(_) | Type::Scalar(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Class { .. } | Type::Multi { .. })
    }

    pub fn contains_param(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Array { base, .. } | Type::List { base, .. } => base.contains_param(),
            Type::Class { args, .. } => args.iter().any(Type::contains_param),
            Type::Multi { initial, members } => {
                initial.contains_param() || members.iter().any(Type::contains_param)
            }
            _ => false,
        }
    }

    /// Key of the class a value of this type starts out as; `Box<Int>` for
    /// an applied generic.
    pub fn class_key(&self) -> Option<String> {
        match self {
            Type::Class { .. } => Some(self.to_string()),
            Type::Multi { initial, .. } => initial.class_key(),
            _ => None,
        }
    }

    pub fn member_keys(&self) -> Vec<String> {
        match self {
            Type::Class { .. } => vec![self.to_string()],
            Type::Multi { members, .. } => members.iter().filter_map(Type::class_key).collect(),
            _ => Vec::new(),
        }
    }

    /// Widens a class (or existing multi) type with another class.
    pub fn with_member(&self, class: &Type) -> Type {
        let (initial, mut members) = match self {
            Type::Multi { initial, members } => (initial.clone(), members.clone()),
            other => (Box::new(other.clone()), vec![other.clone()]),
        };
        if !members.iter().any(|member| member.class_key() == class.class_key()) {
            members.push(class.clone());
        }
        Type::Multi { initial, members }
    }

    /// Overload-key code for this type.
    pub fn signature(&self) -> String {
        match self {
            Type::Void => "V".into(),
            Type::Discrete(Discrete::Bool) => "B".into(),
            Type::Discrete(Discrete::Char) => "C".into(),
            Type::Discrete(Discrete::Int) => "I".into(),
            Type::Scalar(Scalar::String) => "S".into(),
            Type::Scalar(Scalar::Text) => "T".into(),
            Type::Scalar(Scalar::Real) => "R".into(),
            Type::Array { base, dims } => format!("A{}{}", dims, base.signature()),
            Type::List { base, dims } => format!("L{}{}", dims, base.signature()),
            Type::Class { name, args } => {
                if args.is_empty() {
                    name.clone()
                } else {
                    let rendered: Vec<String> = args.iter().map(Type::signature).collect();
                    format!("{}<{}>", name, rendered.join(","))
                }
            }
            Type::Enum { name, .. } => name.clone(),
            Type::Multi { initial, .. } => initial.signature(),
            Type::Param(name) => name.clone(),
            Type::Unknown => "?".into(),
        }
    }

    fn is_bare_param(&self, param: &str) -> bool {
        match self {
            Type::Param(name) => name == param,
            Type::Class { name, args } => args.is_empty() && name == param,
            _ => false,
        }
    }

    /// Substitutes the bare type parameter `param` with `arg`.
    ///
    /// A reference back to the generic class `owner` only has its outermost
    /// bare arguments specialized; its nested type arguments are left alone.
    pub fn instantiate(&self, param: &str, arg: &Type, owner: &str) -> Type {
        if self.is_bare_param(param) {
            return arg.clone();
        }
        match self {
            Type::Class { name, args } if name == owner => Type::Class {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|ty| {
                        if ty.is_bare_param(param) {
                            arg.clone()
                        } else {
                            ty.clone()
                        }
                    })
                    .collect(),
            },
            Type::Class { name, args } => Type::Class {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|ty| ty.instantiate(param, arg, owner))
                    .collect(),
            },
            Type::List { base, dims } => Type::collection(
                CollectionKind::List,
                base.instantiate(param, arg, owner),
                *dims,
            ),
            Type::Array { base, dims } => Type::collection(
                CollectionKind::Array,
                base.instantiate(param, arg, owner),
                *dims,
            ),
            Type::Multi { initial, members } => Type::Multi {
                initial: Box::new(initial.instantiate(param, arg, owner)),
                members: members
                    .iter()
                    .map(|ty| ty.instantiate(param, arg, owner))
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "Void"),
            Type::Discrete(Discrete::Bool) => write!(f, "Bool"),
            Type::Discrete(Discrete::Char) => write!(f, "Char"),
            Type::Discrete(Discrete::Int) => write!(f, "Int"),
            Type::Scalar(Scalar::String) => write!(f, "String"),
            Type::Scalar(Scalar::Text) => write!(f, "Text"),
            Type::Scalar(Scalar::Real) => write!(f, "Real"),
            Type::Array { base, dims } => {
                if *dims == 1 {
                    write!(f, "Array<{base}>")
                } else {
                    write!(f, "Array<{base}, {dims}>")
                }
            }
            Type::List { base, dims } => {
                if *dims == 1 {
                    write!(f, "List<{base}>")
                } else {
                    write!(f, "List<{base}, {dims}>")
                }
            }
            Type::Class { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (idx, arg) in args.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Enum { name, .. } => write!(f, "{name}"),
            Type::Multi { members, .. } => {
                write!(f, "Multi<")?;
                for (idx, member) in members.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ">")
            }
            Type::Param(name) => write!(f, "{name}"),
            Type::Unknown => write!(f, "?"),
        }
    }
}

/// Parameter signature used as an overload key: one code per parameter.
pub fn parameter_signature<'a>(types: impl IntoIterator<Item = &'a Type>) -> String {
    let codes: Vec<String> = types.into_iter().map(Type::signature).collect();
    codes.join(",")
}

/// The compatibility predicate shared by every pass.
///
/// No numeric promotion is performed: `Int` and `Real` never mix.
pub fn assignment_compatible(lhs: &Type, rhs: &Type) -> bool {
    match (lhs, rhs) {
        (Type::Unknown, _) | (_, Type::Unknown) => true,
        (
            Type::Class {
                name: left_name,
                args: left_args,
            },
            Type::Class {
                name: right_name,
                args: right_args,
            },
        ) => {
            left_name == right_name
                && left_args.len() == right_args.len()
                && left_args
                    .iter()
                    .zip(right_args)
                    .all(|(left, right)| assignment_compatible(left, right))
        }
        (Type::Enum { name: left, .. }, Type::Enum { name: right, .. }) => left == right,
        (
            Type::List {
                base: left_base,
                dims: left_dims,
            },
            Type::List {
                base: right_base,
                dims: right_dims,
            },
        )
        | (
            Type::Array {
                base: left_base,
                dims: left_dims,
            },
            Type::Array {
                base: right_base,
                dims: right_dims,
            },
        ) => {
            if left_base.is_void() || right_base.is_void() {
                return true;
            }
            left_dims == right_dims && assignment_compatible(left_base, right_base)
        }
        (left, right) if left.is_object() && right.is_object() => {
            let left_members = left.member_keys();
            let right_members = right.member_keys();
            let left_class = left.class_key();
            let right_class = right.class_key();
            right_class.is_some_and(|class| left_members.contains(&class))
                || left_class.is_some_and(|class| right_members.contains(&class))
        }
        (left, right) => {
            std::mem::discriminant(left) == std::mem::discriminant(right)
                && left.signature() == right.signature()
                && left.to_string() == right.to_string()
        }
    }
}
