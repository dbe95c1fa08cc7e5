//! FILENAME: interpreter/src/tests.rs
//! PURPOSE: Tests for block classification, two-pass dispatch, deferral,
//! command-mode transitions, and session error reporting.

use super::block::{Block, Classification};
use super::dispatcher::{Effect, Outcome, Session, SessionConfig};
use super::error::ErrorEntry;
use super::scope::Entry;
use mathparser::{
    FileLocator, FunctionRunner, MathNode, MathResult, ObjectScope, OutputInfo,
    Signature, Value,
};
use std::path::PathBuf;

// ======================= helpers =======================

struct DoubleRunner;

impl FunctionRunner for DoubleRunner {
    fn run(&self, _name: &str, args: &[Value]) -> MathResult<Value> {
        Ok(Value::Real(args[0].clone().into_real()? * 2.0))
    }
}

struct KnownFiles(&'static [&'static str]);

impl FileLocator for KnownFiles {
    fn find_script_function_file(&self, name: &str) -> Option<PathBuf> {
        if self.0.contains(&name) {
            Some(PathBuf::from(format!("{}.script", name)))
        } else {
            None
        }
    }
}

fn run_script(text: &str, config: SessionConfig) -> Session<'static> {
    let mut session = Session::new(config);
    session.run(&Block::from_text(text));
    session
}

fn real(session: &Session, name: &str) -> f64 {
    match session.scope().lookup(name) {
        Some(Value::Real(v)) => v,
        other => panic!("expected a real binding for {}, got {:?}", name, other),
    }
}

// ============ block splitting and classification ======

#[test]
fn from_text_merges_comment_runs_and_numbers_lines() {
    let blocks = Block::from_text(
        "% mission configuration\n\nCreate Variable x\nx = 2 % inline note\nPropagate prop(Sat)",
    );
    assert_eq!(blocks.len(), 4);
    assert_eq!((blocks[0].first_line, blocks[0].last_line), (1, 2));
    assert_eq!((blocks[1].first_line, blocks[1].last_line), (3, 3));
    assert_eq!((blocks[2].first_line, blocks[2].last_line), (4, 4));
    assert_eq!((blocks[3].first_line, blocks[3].last_line), (5, 5));

    assert_eq!(blocks[0].classify().unwrap(), Classification::Comment);
    assert_eq!(
        blocks[1].classify().unwrap(),
        Classification::Definition {
            type_name: "Variable".to_string(),
            names: vec!["x".to_string()],
        }
    );
    assert_eq!(
        blocks[2].classify().unwrap(),
        Classification::Assignment {
            lhs: "x".to_string(),
            rhs: "2".to_string(),
        }
    );
    assert_eq!(
        blocks[3].classify().unwrap(),
        Classification::Command {
            keyword: "Propagate".to_string(),
        }
    );
}

#[test]
fn unclassifiable_blocks_are_reported() {
    let block = Block::new("launch the thing", 7, 7);
    let err = block.classify().unwrap_err();
    assert!(err.to_string().contains("Cannot classify"));
}

// =================== definitions ======================

#[test]
fn definitions_create_default_bindings() {
    let session = run_script(
        "Create Variable a b\nCreate String s\nCreate Array M[2,3] v[3]\nCreate Spacecraft Sat",
        SessionConfig::default(),
    );
    assert!(session.error_list().is_empty());
    assert_eq!(session.scope().lookup("a"), Some(Value::Real(0.0)));
    assert_eq!(session.scope().lookup("s"), Some(Value::Text(String::new())));
    match session.scope().lookup("M") {
        Some(Value::Matrix(m)) => assert_eq!((m.rows(), m.cols()), (2, 3)),
        other => panic!("expected a matrix, got {:?}", other),
    }
    match session.scope().lookup("v") {
        Some(Value::Matrix(m)) => assert_eq!((m.rows(), m.cols()), (3, 1)),
        other => panic!("expected a matrix, got {:?}", other),
    }
    assert!(matches!(
        session.scope().entry("Sat"),
        Some(Entry::Object { type_name, .. }) if type_name == "Spacecraft"
    ));
}

#[test]
fn malformed_definitions_fail() {
    let session = run_script("Create Array bad", SessionConfig::default());
    assert_eq!(session.error_list().len(), 1);
    assert!(session.error_list()[0].message.contains("dimensions"));

    let session = run_script("Create Variable x[2,2]", SessionConfig::default());
    assert_eq!(session.error_list().len(), 1);
    assert!(session.error_list()[0]
        .message
        .contains("only valid on arrays"));
}

// ==================== assignments =====================

#[test]
fn literal_and_equation_assignments() {
    let session = run_script(
        "Create Variable x y\nCreate String s s2\nx = 2\ny = x + 3*4\ns = 'two body'\ns2 = s",
        SessionConfig::default(),
    );
    assert!(session.error_list().is_empty(), "{:?}", session.error_list());
    assert_eq!(real(&session, "x"), 2.0);
    assert_eq!(real(&session, "y"), 14.0);
    assert_eq!(
        session.scope().lookup("s"),
        Some(Value::Text("two body".to_string()))
    );
    assert_eq!(
        session.scope().lookup("s2"),
        Some(Value::Text("two body".to_string()))
    );
}

#[test]
fn matrix_literals_and_matrix_equations() {
    let session = run_script(
        "Create Array M[2,2] T[2,2]\nCreate Variable d e\nM = [1 2; 3 4]\nT = M'\nd = det(M)\ne = M(2,1)",
        SessionConfig::default(),
    );
    assert!(session.error_list().is_empty(), "{:?}", session.error_list());
    match session.scope().lookup("T") {
        Some(Value::Matrix(t)) => {
            assert_eq!(t.get(0, 1), 3.0);
            assert_eq!(t.get(1, 0), 2.0);
        }
        other => panic!("expected a matrix, got {:?}", other),
    }
    assert_eq!(real(&session, "d"), -2.0);
    assert_eq!(real(&session, "e"), 3.0);
}

#[test]
fn bound_array_element_reads_are_plain_assignments() {
    let session = run_script(
        "Create Array vec[4,1]\nCreate Variable x w\nvec = [10; 20; 30; 40]\nx = vec(4,1)\nw = vec(2)",
        SessionConfig::default(),
    );
    assert!(session.error_list().is_empty(), "{:?}", session.error_list());
    assert_eq!(real(&session, "x"), 40.0);
    assert_eq!(real(&session, "w"), 20.0);

    // an unknown callee still waits for a later definition
    let session = run_script("Create Variable x\nx = ghost(1,1)", SessionConfig::default());
    assert_eq!(session.error_list().len(), 1);
    assert!(session.error_list()[0].message.contains("ghost"));
}

#[test]
fn assignment_to_unknown_name_is_deferred_then_fatal() {
    let session = run_script("ghost = 5", SessionConfig::default());
    assert_eq!(session.error_list().len(), 1);
    assert!(session.error_list()[0].message.contains("ghost"));
    assert_eq!(session.error_list()[0].first_line, 1);
}

// ================= two-pass deferral ==================

#[test]
fn forward_reference_resolves_in_second_pass() {
    let session = run_script(
        "Create Variable a\na = b2 + 1\nCreate Variable b2\nb2 = 3",
        SessionConfig::default(),
    );
    assert!(session.error_list().is_empty(), "{:?}", session.error_list());
    assert_eq!(real(&session, "a"), 4.0);
}

#[test]
fn deferred_function_call_dispatches_on_retry_with_same_tree() {
    let runner = DoubleRunner;
    let mut session = Session::new(SessionConfig::default()).with_runner(&runner);
    for block in &Block::from_text("Create Variable x result\nx = 5") {
        assert!(matches!(session.parse(block), Outcome::Dispatched(_)));
    }

    // the call appears before Later is defined
    let call = Block::new("result = Later(x)", 3, 3);
    assert_eq!(session.parse(&call), Outcome::Deferred);

    let definition = Block::new("Create MatlabFunction Later", 4, 4);
    assert!(matches!(session.parse(&definition), Outcome::Dispatched(_)));
    session.declare_function_signature(
        "Later",
        Signature {
            input_count: 1,
            output: OutputInfo::Scalar,
        },
    );

    // the retry dispatches and evaluates through the runner
    assert!(matches!(session.parse(&call), Outcome::Dispatched(_)));
    assert_eq!(real(&session, "result"), 10.0);

    // the tree is the same as if Later had been defined first
    let tree = mathparser::parse("Later(x)", session.catalog()).unwrap();
    assert_eq!(
        tree,
        MathNode::UserCall {
            name: "Later".to_string(),
            args: vec![MathNode::Identifier {
                name: "x".to_string()
            }],
        }
    );
}

#[test]
fn locator_discovers_user_functions_referenced_in_equations() {
    let runner = DoubleRunner;
    let locator = KnownFiles(&["Twice"]);
    let mut session = Session::new(SessionConfig::default())
        .with_runner(&runner)
        .with_locator(&locator);
    session.declare_function_signature(
        "Twice",
        Signature {
            input_count: 1,
            output: OutputInfo::Scalar,
        },
    );
    session.run(&Block::from_text(
        "Create Variable x y\nx = 4\ny = 1 + Twice(x)",
    ));
    assert!(session.error_list().is_empty(), "{:?}", session.error_list());
    assert_eq!(real(&session, "y"), 9.0);
    assert!(session.catalog().is_user_function("Twice"));
}

// ================ failure semantics ===================

#[test]
fn error_list_orders_main_pass_before_retry_failures() {
    let session = run_script(
        "Create Variable q r\nq = (a+b\nr = zz",
        SessionConfig {
            continue_on_error: true,
        },
    );
    let errors = session.error_list();
    assert_eq!(errors.len(), 2);
    // the main-pass syntax error comes first
    assert_eq!(errors[0].first_line, 2);
    assert!(errors[0].message.contains("parenthesis"));
    // the unresolved-after-retry error follows, with its original line
    assert_eq!(errors[1].first_line, 3);
    assert!(errors[1].message.contains("zz"));
}

#[test]
fn first_failure_halts_main_pass_but_retry_still_runs() {
    let session = run_script(
        "Create Variable x\nx = yy\nq = (a+b\nCreate Variable yy",
        SessionConfig::default(),
    );
    let errors = session.error_list();
    assert_eq!(errors.len(), 2);
    // the halting failure is recorded first
    assert_eq!(errors[0].first_line, 3);
    // the definition after the failure never ran, so the deferred block
    // is still unresolved at retry time
    assert!(!session.scope().contains("yy"));
    assert_eq!(errors[1].first_line, 2);
    assert!(errors[1].message.contains("yy"));
}

#[test]
fn continue_on_error_keeps_dispatching() {
    let session = run_script(
        "Create Variable x\nq = (a+b\nx = 7",
        SessionConfig {
            continue_on_error: true,
        },
    );
    assert_eq!(session.error_list().len(), 1);
    assert_eq!(real(&session, "x"), 7.0);
}

// =================== command mode =====================

#[test]
fn settable_numeric_property_equation_flips_command_mode() {
    let mut session = Session::new(SessionConfig::default());
    for block in &Block::from_text(
        "Create Spacecraft Sat\nCreate Variable v\nv = 1\nSat.Name = 'Bob'",
    ) {
        assert!(matches!(session.parse(block), Outcome::Dispatched(_)));
    }
    assert!(!session.command_mode());

    // an equation into a textual property does not flip
    let block = Block::new("Sat.Name = v + 1", 5, 5);
    assert!(matches!(session.parse(&block), Outcome::Dispatched(_)));
    assert!(!session.command_mode());

    // an equation into a numeric property does, irreversibly
    let block = Block::new("Sat.X = v + 1", 6, 6);
    assert!(matches!(session.parse(&block), Outcome::Dispatched(_)));
    assert!(session.command_mode());
    assert_eq!(session.scope().lookup("Sat.X"), Some(Value::Real(2.0)));

    // later plain assignments carry the flag
    let block = Block::new("v = 2", 7, 7);
    match session.parse(&block) {
        Outcome::Dispatched(Effect::Assignment { command_mode, .. }) => {
            assert!(command_mode)
        }
        other => panic!("expected an assignment effect, got {:?}", other),
    }
}

#[test]
fn equation_into_unknown_object_property_defers() {
    let mut session = Session::new(SessionConfig::default());
    let block = Block::new("Ghost.X = 1 + 2", 1, 1);
    assert_eq!(session.parse(&block), Outcome::Deferred);
}

// ================= serialization ======================

#[test]
fn error_entries_and_blocks_round_trip_through_json() {
    let entry = ErrorEntry {
        first_line: 12,
        last_line: 14,
        message: "Syntax error: Unmatching parenthesis found in: (a+b".to_string(),
    };
    let json = serde_json::to_string(&entry).unwrap();
    assert_eq!(serde_json::from_str::<ErrorEntry>(&json).unwrap(), entry);

    let block = Block::new("x = 2", 3, 3);
    let json = serde_json::to_string(&block).unwrap();
    assert_eq!(serde_json::from_str::<Block>(&json).unwrap(), block);
}
