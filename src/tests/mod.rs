use crate::language::{
    ast::*,
    errors::ErrorCode,
    types::Type,
};
use crate::runtime::{RuntimeError, ScriptedConsole};
use crate::{ImportResolver, Session, SessionError, SessionOptions};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Output = Rc<RefCell<Vec<String>>>;

fn scripted_with(options: SessionOptions, inputs: &[&str]) -> (Session, Output) {
    crate::logging::init_tracing();
    let console = ScriptedConsole::new(inputs.iter().copied());
    let output = console.output();
    (Session::with_console(options, Box::new(console)), output)
}

fn scripted(inputs: &[&str]) -> (Session, Output) {
    scripted_with(SessionOptions::default(), inputs)
}

fn lines(output: &Output) -> Vec<String> {
    output.borrow().clone()
}

fn main(stmts: Vec<Stmt>) -> Item {
    Item::Main(Block::new(stmts))
}

fn out(values: Vec<Expr>) -> Stmt {
    Stmt::output(values)
}

/// `console >> a >> b` / `console << a << b` as the parser leaves it.
fn stream(op: StreamOp, operands: Vec<Expr>) -> Stmt {
    let chain = operands
        .into_iter()
        .fold(Expr::console(), |left, right| Expr::stream(op, left, right));
    Stmt::stream(chain)
}

fn rejected_codes(result: Result<(), SessionError>) -> Vec<ErrorCode> {
    match result {
        Err(SessionError::Rejected(diags)) => diags.codes(),
        other => panic!("expected rejection, got {other:?}"),
    }
}

fn add(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, left, right)
}

#[test]
fn ref_parameter_updates_a_global() {
    let incr = FunctionDecl::new(
        "incr",
        vec![Param::with_mode("v", Type::int(), ParamMode::Ref)],
        Type::Void,
        Block::new(vec![Stmt::assign(Expr::name("v"), add(Expr::name("v"), Expr::int(1)))]),
    );
    let program = Program::new(vec![
        Item::Global(VarDecl::new("g", Type::int(), Some(Expr::int(0)))),
        Item::Function(incr),
        main(vec![
            Stmt::expr(Expr::call("incr", vec![Expr::name("g")])),
            stream(StreamOp::Out, vec![Expr::name("g")]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["1"]);
    assert_eq!(session.global("g").map(|v| v.to_string()).as_deref(), Some("1"));
}

#[test]
fn range_loop_collects_into_a_list() {
    let xs = || Expr::name("xs");
    let program = Program::new(vec![main(vec![
        Stmt::var("xs", Type::list(Type::int()), Some(Expr::list(vec![]))),
        Stmt::for_range(
            "i",
            Type::int(),
            Expr::int(1),
            RangeKind::ExcludeStart,
            Expr::int(3),
            vec![Stmt::expr(Expr::method(xs(), "append", vec![Expr::name("i")]))],
        ),
        Stmt::expr(Expr::method(xs(), "append", vec![Expr::int(4)])),
        Stmt::expr(Expr::method(xs(), "remove", vec![Expr::int(1)])),
        out(vec![xs()]),
        out(vec![Expr::method(xs(), "size", vec![])]),
    ])]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["[3, 4]", "2"]);
}

#[test]
fn copy_back_only_reaches_bare_variables() {
    let bump = FunctionDecl::new(
        "bump",
        vec![Param::with_mode("v", Type::int(), ParamMode::InOut)],
        Type::Void,
        Block::new(vec![Stmt::assign(Expr::name("v"), add(Expr::name("v"), Expr::int(1)))]),
    );
    let fill = FunctionDecl::new(
        "fill",
        vec![Param::with_mode("v", Type::int(), ParamMode::Out)],
        Type::Void,
        Block::new(vec![
            out(vec![Expr::name("v")]),
            Stmt::assign(Expr::name("v"), Expr::int(7)),
        ]),
    );
    let program = Program::new(vec![
        Item::Function(bump),
        Item::Function(fill),
        main(vec![
            Stmt::var("n", Type::int(), Some(Expr::int(1))),
            Stmt::var("xs", Type::list(Type::int()), Some(Expr::list(vec![Expr::int(5)]))),
            Stmt::expr(Expr::call("bump", vec![Expr::name("n")])),
            Stmt::expr(Expr::call(
                "bump",
                vec![Expr::index(Expr::name("xs"), vec![Expr::int(1)])],
            )),
            out(vec![Expr::name("n"), Expr::string(" "), Expr::name("xs")]),
            Stmt::expr(Expr::call("fill", vec![Expr::name("n")])),
            out(vec![Expr::name("n")]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    // `out` parameters start from their default, not the argument.
    assert_eq!(lines(&output), vec!["2 [5]", "0", "7"]);
}

#[test]
fn break_continue_and_return_stay_in_their_construct() {
    let first_over = FunctionDecl::new(
        "first_over",
        vec![
            Param::new("xs", Type::list(Type::int())),
            Param::new("limit", Type::int()),
        ],
        Type::int(),
        Block::new(vec![
            Stmt::for_each(
                "x",
                Type::int(),
                Expr::name("xs"),
                vec![Stmt::if_then(
                    Expr::binary(BinaryOp::Gt, Expr::name("x"), Expr::name("limit")),
                    vec![Stmt::ret(Some(Expr::name("x")))],
                    None,
                )],
            ),
            Stmt::ret(Some(Expr::int(-1))),
        ]),
    );
    let total = || Expr::name("total");
    let program = Program::new(vec![
        Item::Function(first_over),
        main(vec![
            Stmt::var("total", Type::int(), Some(Expr::int(0))),
            Stmt::while_loop(
                Expr::bool(true),
                vec![
                    Stmt::assign(total(), add(total(), Expr::int(1))),
                    Stmt::if_then(
                        Expr::binary(BinaryOp::Eq, total(), Expr::int(3)),
                        vec![Stmt::break_loop()],
                        None,
                    ),
                ],
            ),
            out(vec![total()]),
            Stmt::var("odd", Type::int(), Some(Expr::int(0))),
            Stmt::for_range(
                "i",
                Type::int(),
                Expr::int(1),
                RangeKind::Inclusive,
                Expr::int(5),
                vec![
                    Stmt::if_then(
                        Expr::binary(
                            BinaryOp::Eq,
                            Expr::binary(BinaryOp::Rem, Expr::name("i"), Expr::int(2)),
                            Expr::int(0),
                        ),
                        vec![Stmt::continue_loop()],
                        None,
                    ),
                    Stmt::assign(Expr::name("odd"), add(Expr::name("odd"), Expr::name("i"))),
                ],
            ),
            out(vec![Expr::name("odd")]),
            out(vec![Expr::call(
                "first_over",
                vec![
                    Expr::list(vec![Expr::int(1), Expr::int(5), Expr::int(9)]),
                    Expr::int(4),
                ],
            )]),
            out(vec![Expr::call("first_over", vec![Expr::list(vec![Expr::int(1)]), Expr::int(4)])]),
            Stmt::ret(None),
            out(vec![Expr::string("unreachable")]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["3", "9", "5", "-1"]);
}

#[test]
fn break_in_a_nested_block_leaves_only_the_inner_loop() {
    let inner = || Expr::name("inner");
    let rounds = || Expr::name("rounds");
    let program = Program::new(vec![main(vec![
        Stmt::var("inner", Type::int(), Some(Expr::int(0))),
        Stmt::var("rounds", Type::int(), Some(Expr::int(0))),
        Stmt::for_range(
            "i",
            Type::int(),
            Expr::int(1),
            RangeKind::Inclusive,
            Expr::int(3),
            vec![
                Stmt::assign(inner(), Expr::int(0)),
                Stmt::while_loop(
                    Expr::bool(true),
                    vec![
                        Stmt::assign(inner(), add(inner(), Expr::int(1))),
                        Stmt::block(vec![Stmt::if_then(
                            Expr::binary(BinaryOp::Eq, inner(), Expr::int(2)),
                            vec![Stmt::block(vec![Stmt::break_loop()])],
                            None,
                        )]),
                    ],
                ),
                Stmt::assign(rounds(), add(rounds(), Expr::int(1))),
                out(vec![Expr::name("i"), inner()]),
            ],
        ),
        out(vec![rounds()]),
    ])]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["12", "22", "32", "3"]);
}

#[test]
fn self_initialization_is_rejected() {
    let program = Program::new(vec![main(vec![Stmt::var(
        "x",
        Type::int(),
        Some(add(Expr::name("x"), Expr::int(1))),
    )])]);
    let (mut session, output) = scripted(&[]);
    assert_eq!(rejected_codes(session.run_program(program)), vec![ErrorCode::SelfReference]);
    assert!(lines(&output).is_empty());
}

#[test]
fn overloads_are_selected_by_argument_types() {
    let describe = |param: Type, text: &str| {
        FunctionDecl::new(
            "describe",
            vec![Param::new("value", param)],
            Type::string(),
            Block::new(vec![Stmt::ret(Some(Expr::string(text)))]),
        )
    };
    let program = Program::new(vec![
        Item::Function(describe(Type::int(), "int")),
        Item::Function(describe(Type::real(), "real")),
        Item::Function(describe(Type::string(), "string")),
        main(vec![
            out(vec![Expr::call("describe", vec![Expr::int(1)])]),
            out(vec![Expr::call("describe", vec![Expr::real(1.0)])]),
            out(vec![Expr::call("describe", vec![Expr::string("s")])]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["int", "real", "string"]);
}

#[test]
fn operator_overloads_dispatch_on_the_left_operand() {
    let other = |field: &str| Expr::field(Expr::name("other"), field);
    let plus = FunctionDecl::operator(
        BinaryOp::Add,
        vec![Param::new("other", Type::class("Vec2"))],
        Type::class("Vec2"),
        Block::new(vec![Stmt::ret(Some(Expr::new_named(
            Type::class("Vec2"),
            vec![
                FieldInit::new("x", add(Expr::name("x"), other("x"))),
                FieldInit::new("y", add(Expr::name("y"), other("y"))),
            ],
        )))]),
    );
    let class = ClassDecl::new("Vec2")
        .field(VarDecl::new("x", Type::int(), None))
        .field(VarDecl::new("y", Type::int(), None))
        .method(plus)
        .with_auto_constructor();
    let program = Program::new(vec![
        Item::Class(class),
        main(vec![
            Stmt::var(
                "a",
                Type::class("Vec2"),
                Some(Expr::new_positional(Type::class("Vec2"), vec![Expr::int(1), Expr::int(2)])),
            ),
            Stmt::var(
                "b",
                Type::class("Vec2"),
                Some(Expr::new_positional(Type::class("Vec2"), vec![Expr::int(3), Expr::int(4)])),
            ),
            Stmt::var("c", Type::class("Vec2"), Some(add(Expr::name("a"), Expr::name("b")))),
            out(vec![
                Expr::field(Expr::name("c"), "x"),
                Expr::string(","),
                Expr::field(Expr::name("c"), "y"),
            ]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["4,6"]);
}

#[test]
fn properties_and_super_calls() {
    let base = ClassDecl::new("Base").method(FunctionDecl::new(
        "name",
        vec![],
        Type::string(),
        Block::new(vec![Stmt::ret(Some(Expr::string("base")))]),
    ));
    let derived = ClassDecl::new("Derived")
        .extends(Type::class("Base"))
        .field(VarDecl::new("count", Type::int(), None).as_property())
        .method(FunctionDecl::new(
            "name",
            vec![],
            Type::string(),
            Block::new(vec![Stmt::ret(Some(add(
                Expr::string("derived+"),
                Expr::method(Expr::super_ref(), "name", vec![]),
            )))]),
        ));
    let d = || Expr::name("d");
    let program = Program::new(vec![
        Item::Class(base),
        Item::Class(derived),
        main(vec![
            Stmt::var("d", Type::class("Derived"), Some(Expr::new_named(Type::class("Derived"), vec![]))),
            Stmt::expr(Expr::method(d(), "set_count", vec![Expr::int(5)])),
            out(vec![Expr::method(d(), "get_count", vec![])]),
            out(vec![Expr::method(d(), "name", vec![])]),
            out(vec![Expr::instance_of(d(), Type::class("Base"))]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["5", "derived+base", "true"]);
}

#[test]
fn retype_switches_dynamic_dispatch() {
    let speak = |text: &str| {
        FunctionDecl::new(
            "speak",
            vec![],
            Type::string(),
            Block::new(vec![Stmt::ret(Some(Expr::string(text)))]),
        )
    };
    let animal = ClassDecl::new("Animal").method(speak("..."));
    let dog = ClassDecl::new("Dog")
        .extends(Type::class("Animal"))
        .field(VarDecl::new("tricks", Type::int(), Some(Expr::int(2))))
        .method(speak("woof"));
    let a = || Expr::name("a");
    let program = Program::new(vec![
        Item::Class(animal),
        Item::Class(dog),
        main(vec![
            Stmt::var("a", Type::class("Animal"), Some(Expr::new_named(Type::class("Animal"), vec![]))),
            out(vec![Expr::method(a(), "speak", vec![])]),
            Stmt::retype(a(), Type::class("Dog"), vec![]),
            out(vec![Expr::method(a(), "speak", vec![])]),
            out(vec![Expr::field(a(), "tricks")]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["...", "woof", "2"]);
}

#[test]
fn generic_class_instantiates_per_argument() {
    let class = ClassDecl::new("Box")
        .type_param(TypeParam::new("T"))
        .field(VarDecl::new("value", Type::Param("T".into()), None))
        .method(FunctionDecl::new(
            "get",
            vec![],
            Type::Param("T".into()),
            Block::new(vec![Stmt::ret(Some(Expr::name("value")))]),
        ));
    let boxed = |arg: Type| Type::generic("Box", vec![arg]);
    let program = Program::new(vec![
        Item::Class(class),
        main(vec![
            Stmt::var(
                "b",
                boxed(Type::int()),
                Some(Expr::new_named(boxed(Type::int()), vec![FieldInit::new("value", Expr::int(5))])),
            ),
            Stmt::var(
                "s",
                boxed(Type::string()),
                Some(Expr::new_named(
                    boxed(Type::string()),
                    vec![FieldInit::new("value", Expr::string("five"))],
                )),
            ),
            out(vec![Expr::method(Expr::name("b"), "get", vec![])]),
            out(vec![Expr::method(Expr::name("s"), "get", vec![])]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["5", "five"]);
    assert!(session.context().instance("Box<Int>").is_some());
    assert!(session.context().instance("Box<String>").is_some());
}

#[test]
fn generic_function_overloads_are_chosen_by_argument_count() {
    let pick = |params: Vec<&str>, result: &str| {
        Item::Function(
            FunctionDecl::new(
                "pick",
                params
                    .iter()
                    .map(|name| Param::new(*name, Type::Param("T".into())))
                    .collect(),
                Type::Param("T".into()),
                Block::new(vec![Stmt::ret(Some(Expr::name(result)))]),
            )
            .type_param(TypeParam::new("T")),
        )
    };
    let program = Program::new(vec![
        pick(vec!["a"], "a"),
        pick(vec!["a", "b"], "b"),
        main(vec![
            out(vec![Expr::generic_call("pick", vec![Type::int()], vec![Expr::int(1)])]),
            out(vec![Expr::generic_call(
                "pick",
                vec![Type::int()],
                vec![Expr::int(1), Expr::int(2)],
            )]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["1", "2"]);
}

#[test]
fn enums_drive_choice_and_cast() {
    let color = |name: &str| Expr::field(Expr::name("Color"), name);
    let program = Program::new(vec![
        Item::Enum(EnumDecl::new("Color", &["Red", "Green", "Blue"])),
        main(vec![
            Stmt::var("c", Type::class("Color"), Some(color("Green"))),
            Stmt::choice(
                Expr::name("c"),
                vec![
                    ChoiceArm::new(
                        vec![ChoiceLabel::Value(color("Red"))],
                        vec![out(vec![Expr::string("r")])],
                    ),
                    ChoiceArm::new(
                        vec![ChoiceLabel::Value(color("Green")), ChoiceLabel::Value(color("Blue"))],
                        vec![out(vec![Expr::string("gb")])],
                    ),
                ],
                None,
            ),
            out(vec![Expr::name("c")]),
            out(vec![Expr::cast(Type::int(), Expr::name("c"))]),
        ]),
    ]);
    let (mut session, output) = scripted(&[]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["gb", "Green", "1"]);
}

#[test]
fn input_reads_scripted_tokens() {
    let names = ["a", "r", "b", "c", "s"];
    let mut stmts = vec![
        Stmt::var("a", Type::int(), None),
        Stmt::var("r", Type::real(), None),
        Stmt::var("b", Type::bool(), None),
        Stmt::var("c", Type::char(), None),
        Stmt::var("s", Type::string(), None),
        stream(StreamOp::In, names.iter().map(|name| Expr::name(*name)).collect()),
    ];
    stmts.extend(names.iter().map(|name| out(vec![Expr::name(*name)])));
    let (mut session, output) = scripted(&["42", "2.5", "true", "'x'", "hello"]);
    session.run_program(Program::new(vec![main(stmts)])).expect("program runs");
    assert_eq!(lines(&output), vec!["42", "2.5", "true", "x", "hello"]);
}

#[test]
fn bad_or_missing_input_is_a_runtime_error() {
    let program = || {
        Program::new(vec![main(vec![
            Stmt::var("a", Type::int(), None),
            Stmt::input(vec![Expr::name("a")]),
        ])])
    };
    let (mut session, _) = scripted(&["abc"]);
    let err = session.run_program(program()).err();
    assert!(matches!(
        err,
        Some(SessionError::Runtime(RuntimeError::InvalidInput { ref token, ref expected }))
            if token == "abc" && expected == "Int"
    ));

    let (mut session, _) = scripted(&[]);
    let err = session.run_program(program()).err();
    assert!(matches!(
        err,
        Some(SessionError::Runtime(RuntimeError::MissingInput { ref target })) if target == "a"
    ));
}

#[test]
fn runaway_recursion_hits_the_call_depth_limit() {
    let down = FunctionDecl::new(
        "down",
        vec![Param::new("n", Type::int())],
        Type::int(),
        Block::new(vec![Stmt::ret(Some(Expr::call(
            "down",
            vec![add(Expr::name("n"), Expr::int(1))],
        )))]),
    );
    let options = SessionOptions {
        max_call_depth: 16,
        ..SessionOptions::default()
    };
    let (mut session, output) = scripted_with(options, &[]);
    let program = Program::new(vec![
        Item::Function(down),
        main(vec![out(vec![Expr::call("down", vec![Expr::int(0)])])]),
    ]);
    let err = session.run_program(program).err();
    assert!(matches!(
        err,
        Some(SessionError::Runtime(RuntimeError::CallDepthExceeded { limit: 16 }))
    ));

    // The session is still usable after unwinding.
    session
        .eval(Item::Statement(out(vec![Expr::int(1)])))
        .expect("input runs");
    assert_eq!(lines(&output), vec!["1"]);
}

#[test]
fn interactive_inputs_share_declarations() {
    let (mut session, output) = scripted(&[]);
    session
        .eval(Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(1)))))
        .expect("declaration runs");
    session
        .eval(Item::Function(FunctionDecl::new(
            "twice",
            vec![Param::new("n", Type::int())],
            Type::int(),
            Block::new(vec![Stmt::ret(Some(Expr::binary(
                BinaryOp::Mul,
                Expr::name("n"),
                Expr::int(2),
            )))]),
        )))
        .expect("function declared");
    session
        .eval(Item::Statement(Stmt::assign(
            Expr::name("x"),
            Expr::call("twice", vec![Expr::name("x")]),
        )))
        .expect("assignment runs");
    session
        .eval(Item::Statement(out(vec![Expr::name("x")])))
        .expect("output runs");
    assert_eq!(lines(&output), vec!["2"]);
    assert_eq!(session.global("x").map(|v| v.to_string()).as_deref(), Some("2"));
}

#[test]
fn rejected_input_leaves_nothing_behind() {
    let (mut session, _) = scripted(&[]);
    session
        .eval(Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(1)))))
        .expect("declaration runs");

    let redeclared = session.eval(Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(9)))));
    assert_eq!(rejected_codes(redeclared), vec![ErrorCode::Redeclaration]);
    assert_eq!(session.global("x").map(|v| v.to_string()).as_deref(), Some("1"));

    let broken = session.eval(Item::Global(VarDecl::new(
        "y",
        Type::int(),
        Some(add(Expr::name("missing"), Expr::name("also_missing"))),
    )));
    // Interactive mode reports only the first problem.
    assert_eq!(rejected_codes(broken), vec![ErrorCode::Undeclared]);
    assert!(session.context().scopes.lookup_from(session.context().scopes.global(), "y").is_none());

    session
        .eval(Item::Global(VarDecl::new("y", Type::int(), Some(Expr::int(2)))))
        .expect("y can be declared after the rollback");
    assert_eq!(session.global("y").map(|v| v.to_string()).as_deref(), Some("2"));
}

#[test]
fn runtime_errors_keep_earlier_globals() {
    let (mut session, output) = scripted(&[]);
    session
        .eval(Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(3)))))
        .expect("declaration runs");
    let err = session
        .eval(Item::Statement(out(vec![Expr::binary(
            BinaryOp::Div,
            Expr::name("x"),
            Expr::int(0),
        )])))
        .err();
    assert!(matches!(err, Some(SessionError::Runtime(RuntimeError::DivisionByZero))));
    session
        .eval(Item::Statement(out(vec![Expr::name("x")])))
        .expect("output runs");
    assert_eq!(lines(&output), vec!["3"]);
}

#[test]
fn stop_refuses_input_until_reset() {
    let (mut session, output) = scripted(&[]);
    session
        .eval(Item::Global(VarDecl::new("x", Type::int(), Some(Expr::int(1)))))
        .expect("declaration runs");
    let stopped = session.eval(Item::Statement(Stmt::stop())).err();
    assert!(matches!(stopped, Some(SessionError::Runtime(RuntimeError::Stopped))));
    assert!(session.is_stopped());

    let refused = session.eval(Item::Statement(out(vec![Expr::int(1)]))).err();
    assert!(matches!(refused, Some(SessionError::Runtime(RuntimeError::Stopped))));
    assert!(lines(&output).is_empty());

    session.reset();
    assert!(!session.is_stopped());
    assert!(session.global("x").is_none());
    session
        .eval(Item::Statement(out(vec![Expr::int(1)])))
        .expect("input runs after reset");
    assert_eq!(lines(&output), vec!["1"]);
}

struct MapResolver(HashMap<String, Program>);

impl ImportResolver for MapResolver {
    fn load(&mut self, file: &str) -> Result<Program, String> {
        self.0
            .get(file)
            .cloned()
            .ok_or_else(|| format!("`{file}` not found"))
    }
}

#[test]
fn imports_expose_declarations_without_running_their_main() {
    let util = Program::new(vec![
        Item::Function(FunctionDecl::new(
            "twice",
            vec![Param::new("n", Type::int())],
            Type::int(),
            Block::new(vec![Stmt::ret(Some(Expr::binary(
                BinaryOp::Mul,
                Expr::name("n"),
                Expr::int(2),
            )))]),
        )),
        Item::Global(VarDecl::new("offset", Type::int(), Some(Expr::int(1)))),
        main(vec![out(vec![Expr::string("util main")])]),
    ]);
    let resolver = MapResolver(HashMap::from([("util".to_string(), util)]));
    let (session, output) = scripted(&[]);
    let mut session = session.with_resolver(Box::new(resolver));
    let program = Program::new(vec![
        Item::Import(Import::new("util")),
        main(vec![out(vec![add(
            Expr::call("twice", vec![Expr::int(21)]),
            Expr::name("offset"),
        )])]),
    ]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["43"]);
}

#[test]
fn unresolvable_import_is_reported() {
    let (mut session, _) = scripted(&[]);
    let program = Program::new(vec![Item::Import(Import::new("nowhere")), main(vec![])]);
    assert_eq!(rejected_codes(session.run_program(program)), vec![ErrorCode::ImportFailed]);
}

#[test]
fn subclass_of_an_imported_class_sees_the_importing_file() {
    let lib = Program::new(vec![Item::Class(
        ClassDecl::new("Base").field(VarDecl::new("base_value", Type::int(), Some(Expr::int(1)))),
    )]);
    let derived = ClassDecl::new("Derived")
        .extends(Type::class("Base"))
        .method(FunctionDecl::new(
            "m",
            vec![],
            Type::int(),
            Block::new(vec![Stmt::ret(Some(add(
                Expr::call("helper", vec![]),
                Expr::name("base_value"),
            )))]),
        ));
    let program = Program::new(vec![
        Item::Import(Import::new("lib")),
        Item::Function(FunctionDecl::new(
            "helper",
            vec![],
            Type::int(),
            Block::new(vec![Stmt::ret(Some(Expr::int(41)))]),
        )),
        Item::Class(derived),
        main(vec![
            Stmt::var(
                "d",
                Type::class("Derived"),
                Some(Expr::new_named(Type::class("Derived"), vec![])),
            ),
            out(vec![Expr::method(Expr::name("d"), "m", vec![])]),
        ]),
    ]);
    let resolver = MapResolver(HashMap::from([("lib".to_string(), lib)]));
    let (session, output) = scripted(&[]);
    let mut session = session.with_resolver(Box::new(resolver));
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["42"]);
}

#[test]
fn auto_constructor_takes_fields_of_earlier_and_imported_superclasses() {
    let positional_field = |class: &str, args: Vec<Expr>, field: &str| {
        Expr::field(Expr::new_positional(Type::class(class), args), field)
    };
    let lib = Program::new(vec![Item::Class(
        ClassDecl::new("Shape").field(VarDecl::new("sides", Type::int(), None)),
    )]);
    let resolver = MapResolver(HashMap::from([("lib".to_string(), lib)]));
    let (session, output) = scripted(&[]);
    let mut session = session.with_resolver(Box::new(resolver));

    session
        .eval(Item::Class(ClassDecl::new("Base").field(VarDecl::new("a", Type::int(), None))))
        .expect("base declared");
    session
        .eval(Item::Class(
            ClassDecl::new("Derived")
                .extends(Type::class("Base"))
                .field(VarDecl::new("b", Type::int(), None))
                .with_auto_constructor(),
        ))
        .expect("derived declared");
    session
        .eval(Item::Statement(out(vec![
            positional_field("Derived", vec![Expr::int(1), Expr::int(2)], "a"),
            positional_field("Derived", vec![Expr::int(1), Expr::int(2)], "b"),
        ])))
        .expect("constructor takes both fields");

    let program = Program::new(vec![
        Item::Import(Import::new("lib")),
        Item::Class(
            ClassDecl::new("Square")
                .extends(Type::class("Shape"))
                .field(VarDecl::new("side", Type::int(), None))
                .with_auto_constructor(),
        ),
        main(vec![out(vec![positional_field(
            "Square",
            vec![Expr::int(4), Expr::int(3)],
            "sides",
        )])]),
    ]);
    session.run_program(program).expect("program runs");
    assert_eq!(lines(&output), vec!["12", "4"]);
}

#[test]
fn rejected_retype_restores_the_declared_type() {
    let (mut session, _) = scripted(&[]);
    session.eval(Item::Class(ClassDecl::new("Animal"))).expect("animal declared");
    session
        .eval(Item::Class(
            ClassDecl::new("Dog")
                .extends(Type::class("Animal"))
                .field(VarDecl::new("tricks", Type::int(), Some(Expr::int(2)))),
        ))
        .expect("dog declared");
    session
        .eval(Item::Global(VarDecl::new(
            "a",
            Type::class("Animal"),
            Some(Expr::new_named(Type::class("Animal"), vec![])),
        )))
        .expect("a declared");

    let rejected = session.eval(Item::Statement(Stmt::block(vec![
        Stmt::retype(Expr::name("a"), Type::class("Dog"), vec![]),
        Stmt::retype(Expr::int(5), Type::class("Dog"), vec![]),
    ])));
    assert_eq!(rejected_codes(rejected), vec![ErrorCode::InvalidRetype]);

    let scopes = &session.context().scopes;
    let a = scopes.lookup_from(scopes.global(), "a").expect("a survives");
    assert_eq!(session.context().symbols.get(a).ty, Type::class("Animal"));
    let tricks = session.eval(Item::Statement(out(vec![Expr::field(Expr::name("a"), "tricks")])));
    assert_eq!(rejected_codes(tricks), vec![ErrorCode::UnknownMember]);
}
