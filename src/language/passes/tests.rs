use super::*;
use crate::language::{
    ast::*,
    errors::ErrorCode,
    types::Type,
};
use pretty_assertions::assert_eq;

fn check_with(items: Vec<Item>, options: PipelineOptions) -> (Context, Program, Diagnostics) {
    let mut ctx = Context::new();
    let mut program = Program::new(items);
    let diags = run_pipeline(&mut ctx, &mut program, &options);
    (ctx, program, diags)
}

fn codes(items: Vec<Item>) -> Vec<ErrorCode> {
    check_with(items, PipelineOptions::default()).2.codes()
}

fn main(stmts: Vec<Stmt>) -> Item {
    Item::Main(Block::new(stmts))
}

fn int_var(name: &str, init: Option<Expr>) -> Stmt {
    Stmt::var(name, Type::int(), init)
}

fn class_methods(program: &Program, class: &str) -> Vec<(String, Vec<String>)> {
    program
        .items
        .iter()
        .find_map(|item| match item {
            Item::Class(decl) if decl.name == class => Some(decl),
            _ => None,
        })
        .map(|decl| {
            decl.methods
                .iter()
                .map(|method| {
                    let params = method.params.iter().map(|p| p.name.clone()).collect();
                    (method.name.clone(), params)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn redeclaration_in_one_scope_is_rejected() {
    let items = vec![main(vec![int_var("x", Some(Expr::int(1))), int_var("x", None)])];
    assert_eq!(codes(items), vec![ErrorCode::Redeclaration]);
}

#[test]
fn nested_blocks_may_shadow() {
    let items = vec![main(vec![
        int_var("x", Some(Expr::int(1))),
        Stmt::block(vec![int_var("x", Some(Expr::int(2)))]),
    ])];
    assert!(codes(items).is_empty());
}

#[test]
fn self_reference_is_caught_outside_calls() {
    let twice = FunctionDecl::new(
        "twice",
        vec![Param::new("n", Type::int())],
        Type::int(),
        Block::new(vec![Stmt::ret(Some(Expr::name("n")))]),
    );
    let direct = vec![main(vec![int_var(
        "x",
        Some(Expr::binary(BinaryOp::Add, Expr::name("x"), Expr::int(1))),
    )])];
    assert_eq!(codes(direct), vec![ErrorCode::SelfReference]);

    let through_call = vec![
        Item::Function(twice),
        main(vec![int_var("x", Some(Expr::call("twice", vec![Expr::name("x")])))]),
    ];
    assert!(codes(through_call).is_empty());
}

#[test]
fn undeclared_names_are_reported() {
    let items = vec![main(vec![Stmt::output(vec![Expr::name("y")])])];
    assert_eq!(codes(items), vec![ErrorCode::Undeclared]);
}

#[test]
fn loop_control_needs_an_enclosing_loop() {
    assert_eq!(
        codes(vec![main(vec![Stmt::break_loop(), Stmt::continue_loop()])]),
        vec![ErrorCode::OutsideLoop, ErrorCode::OutsideLoop]
    );
    let inside = vec![main(vec![Stmt::while_loop(
        Expr::bool(true),
        vec![Stmt::if_then(Expr::bool(true), vec![Stmt::break_loop()], None)],
    )])];
    assert!(codes(inside).is_empty());

    // A function body does not inherit the loop it is declared next to.
    let escaping = vec![Item::Function(FunctionDecl::new(
        "f",
        vec![],
        Type::Void,
        Block::new(vec![Stmt::break_loop()]),
    ))];
    assert_eq!(codes(escaping), vec![ErrorCode::OutsideLoop]);
}

#[test]
fn this_and_super_need_a_class_context() {
    assert_eq!(
        codes(vec![main(vec![Stmt::expr(Expr::this())])]),
        vec![ErrorCode::ThisOutsideClass]
    );
    let class = ClassDecl::new("A").method(FunctionDecl::new(
        "m",
        vec![],
        Type::Void,
        Block::new(vec![Stmt::expr(Expr::method(Expr::super_ref(), "m", vec![]))]),
    ));
    assert_eq!(codes(vec![Item::Class(class)]), vec![ErrorCode::SuperOutsideInheritance]);
}

#[test]
fn overloads_must_differ_in_parameter_signature() {
    let f = |param: Type| {
        Item::Function(FunctionDecl::new(
            "f",
            vec![Param::new("v", param)],
            Type::Void,
            Block::default(),
        ))
    };
    assert_eq!(
        codes(vec![f(Type::int()), f(Type::int()), f(Type::real())]),
        vec![ErrorCode::DuplicateOverload]
    );
}

#[test]
fn generic_overloads_collide_on_renamed_parameters() {
    let f = |type_param: &str, params: usize| {
        let param_ty = Type::Param(type_param.into());
        Item::Function(
            FunctionDecl::new(
                "f",
                (0..params).map(|idx| Param::new(format!("v{idx}"), param_ty.clone())).collect(),
                Type::Void,
                Block::default(),
            )
            .type_param(TypeParam::new(type_param)),
        )
    };
    assert_eq!(
        codes(vec![f("T", 1), f("U", 1), f("T", 2)]),
        vec![ErrorCode::DuplicateOverload]
    );
}

#[test]
fn inheritance_cycles_are_broken() {
    let items = vec![
        Item::Class(ClassDecl::new("A").extends(Type::class("B"))),
        Item::Class(ClassDecl::new("B").extends(Type::class("A"))),
    ];
    assert_eq!(codes(items), vec![ErrorCode::InheritanceCycle]);
}

#[test]
fn operators_take_exactly_one_parameter() {
    let class = ClassDecl::new("V").method(FunctionDecl::operator(
        BinaryOp::Add,
        vec![],
        Type::class("V"),
        Block::new(vec![Stmt::ret(Some(Expr::this()))]),
    ));
    assert_eq!(codes(vec![Item::Class(class)]), vec![ErrorCode::OperatorArity]);
}

#[test]
fn stream_chains_flatten_into_io_statements() {
    let chain = Expr::stream(
        StreamOp::Out,
        Expr::stream(StreamOp::Out, Expr::console(), Expr::int(1)),
        Expr::string("a"),
    );
    let (_, program, diags) = check_with(
        vec![main(vec![Stmt::stream(chain)])],
        PipelineOptions::until(Phase::Rewrite),
    );
    assert!(diags.is_empty());
    let Some(Item::Main(block)) = program.items.first() else {
        panic!("main block expected");
    };
    match &block.stmts[0].kind {
        StmtKind::Output(values) => assert_eq!(values.len(), 2),
        other => panic!("expected output, got {other:?}"),
    }
}

#[test]
fn malformed_streams_are_reported() {
    let no_console = Expr::stream(StreamOp::Out, Expr::int(1), Expr::int(2));
    let mixed = Expr::stream(
        StreamOp::In,
        Expr::stream(StreamOp::Out, Expr::console(), Expr::int(1)),
        Expr::name("x"),
    );
    let literal_target = Expr::stream(StreamOp::In, Expr::console(), Expr::int(3));
    let items = vec![main(vec![
        int_var("x", None),
        Stmt::stream(no_console),
        Stmt::stream(mixed),
        Stmt::stream(literal_target),
    ])];
    assert_eq!(
        codes(items),
        vec![ErrorCode::MalformedStream, ErrorCode::MalformedStream, ErrorCode::MalformedStream]
    );
}

#[test]
fn properties_and_auto_constructors_are_synthesized() {
    let base = ClassDecl::new("Base").field(VarDecl::new("id", Type::int(), None));
    let item = ClassDecl::new("Item")
        .extends(Type::class("Base"))
        .field(VarDecl::new("label", Type::string(), None).as_property())
        .with_auto_constructor();
    let (_, program, diags) = check_with(
        vec![Item::Class(base), Item::Class(item)],
        PipelineOptions::default(),
    );
    assert!(diags.is_empty(), "{:?}", diags.codes());
    assert_eq!(
        class_methods(&program, "Item"),
        vec![
            ("get_label".to_string(), vec![]),
            ("set_label".to_string(), vec!["value".to_string()]),
            ("new".to_string(), vec!["id".to_string(), "label".to_string()]),
        ]
    );
}

#[test]
fn generic_classes_are_instantiated_once_per_key() {
    let class = ClassDecl::new("Box")
        .type_param(TypeParam::new("T"))
        .field(VarDecl::new("value", Type::Param("T".into()), None));
    let boxed = || Type::generic("Box", vec![Type::int()]);
    let (ctx, program, diags) = check_with(
        vec![
            Item::Class(class),
            main(vec![
                Stmt::var("a", boxed(), None),
                Stmt::var(
                    "b",
                    boxed(),
                    Some(Expr::new_named(boxed(), vec![FieldInit::new("value", Expr::int(1))])),
                ),
            ]),
        ],
        PipelineOptions::default(),
    );
    assert!(diags.is_empty(), "{:?}", diags.codes());
    assert!(ctx.instance("Box<Int>").is_some());
    let instances = program
        .items
        .iter()
        .filter(|item| matches!(item, Item::Class(decl) if decl.name == "Box<Int>"))
        .count();
    assert_eq!(instances, 1);
}

#[test]
fn generic_misuse_is_reported() {
    let holder = ClassDecl::new("Holder")
        .type_param(TypeParam::bounded("T", Type::class("Shape")))
        .field(VarDecl::new("item", Type::Param("T".into()), None));
    let items = vec![
        Item::Class(ClassDecl::new("Shape")),
        Item::Class(ClassDecl::new("Circle").extends(Type::class("Shape"))),
        Item::Class(holder),
        main(vec![
            Stmt::var("ok", Type::generic("Holder", vec![Type::class("Circle")]), None),
            Stmt::var("bad", Type::generic("Holder", vec![Type::int()]), None),
            Stmt::var("bare", Type::class("Holder"), None),
            Stmt::var("nothing", Type::class("Nope"), None),
        ]),
    ];
    assert_eq!(
        codes(items),
        vec![ErrorCode::GenericBound, ErrorCode::GenericArity, ErrorCode::UnknownType]
    );
}

#[test]
fn last_phase_bounds_the_pipeline() {
    let items = || vec![main(vec![Stmt::var("x", Type::int(), Some(Expr::bool(true)))])];
    let (_, _, resolved_only) = check_with(items(), PipelineOptions::until(Phase::Resolve));
    assert!(resolved_only.is_empty());
    let (_, _, full) = check_with(items(), PipelineOptions::default());
    assert_eq!(full.codes(), vec![ErrorCode::IncompatibleAssignment]);
}

#[test]
fn interactive_failure_rolls_back_and_keeps_one_error() {
    let mut ctx = Context::new();
    let mut bad = Program::new(vec![Item::Global(VarDecl::new(
        "x",
        Type::int(),
        Some(Expr::binary(BinaryOp::Add, Expr::name("nope"), Expr::name("nada"))),
    ))]);
    let diags = run_pipeline(&mut ctx, &mut bad, &PipelineOptions::interactive());
    assert_eq!(diags.codes(), vec![ErrorCode::Undeclared]);
    let global = ctx.scopes.global();
    assert!(ctx.scopes.lookup_from(global, "x").is_none());

    let mut good = Program::new(vec![Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(1))))]);
    let diags = run_pipeline(&mut ctx, &mut good, &PipelineOptions::interactive());
    assert!(diags.is_empty());
    assert!(ctx.scopes.lookup_from(global, "x").is_some());
}

#[test]
fn batch_mode_collects_every_error() {
    let items = vec![main(vec![
        Stmt::output(vec![Expr::name("a")]),
        Stmt::output(vec![Expr::name("b")]),
        Stmt::var("x", Type::int(), Some(Expr::string("s"))),
    ])];
    assert_eq!(
        codes(items),
        vec![ErrorCode::Undeclared, ErrorCode::Undeclared, ErrorCode::IncompatibleAssignment]
    );
}

#[test]
fn imports_are_visible_to_the_importer() {
    let unit = Program::new(vec![Item::Function(FunctionDecl::new(
        "helper",
        vec![],
        Type::int(),
        Block::new(vec![Stmt::ret(Some(Expr::int(1)))]),
    ))]);
    let mut import = Import::new("helpers");
    import.unit = Some(Box::new(unit));
    let items = vec![
        Item::Import(import),
        main(vec![Stmt::output(vec![Expr::call("helper", vec![])])]),
    ];
    assert!(codes(items).is_empty());
}
