use super::*;
use pretty_assertions::assert_eq;

#[test]
fn nested_scopes_see_outer_declarations() {
    let mut table = ScopeTable::new();
    table.declare("g", DeclId(0));
    table.open(ScopeKind::Function);
    table.open(ScopeKind::Block);
    assert_eq!(table.lookup("g"), Some(DeclId(0)));
    table.declare("g", DeclId(1));
    assert_eq!(table.lookup("g"), Some(DeclId(1)));
    table.close();
    assert_eq!(table.lookup("g"), Some(DeclId(0)));
}

#[test]
fn closed_scope_is_unreachable_from_sibling() {
    let mut table = ScopeTable::new();
    let first = table.open(ScopeKind::Block);
    table.declare("x", DeclId(0));
    table.close();
    let second = table.open(ScopeKind::Block);
    assert!(!table.has_local("x"));
    assert_eq!(table.lookup("x"), None);
    table.declare("x", DeclId(1));
    table.close();
    assert_eq!(table.lookup_from(first, "x"), Some(DeclId(0)));
    assert_eq!(table.lookup_from(second, "x"), Some(DeclId(1)));
    assert_eq!(table.current(), table.global());
}

#[test]
fn overloads_are_keyed_by_signature() {
    let mut table = ScopeTable::new();
    table.declare_overload("f", "I", DeclId(0));
    table.declare_overload("f", "R", DeclId(1));
    assert!(table.has_overload_collision("f", "I"));
    assert!(!table.has_overload_collision("f", "S"));
    assert_eq!(table.lookup_overload("f", "R"), Some(DeclId(1)));
    assert_eq!(table.lookup("f"), None);

    table.open(ScopeKind::Block);
    assert!(!table.has_overload_collision("f", "I"));
    table.declare_overload("f", "I", DeclId(2));
    let visible = table.overloads_from(table.current(), "f");
    assert_eq!(
        visible,
        vec![("I".to_string(), DeclId(2)), ("R".to_string(), DeclId(1))]
    );
}

#[test]
fn import_chain_is_consulted_after_the_root() {
    let mut table = ScopeTable::new();
    let root = table.open_with_parent(ScopeKind::Import, None);
    table.declare("shared", DeclId(0));
    table.declare_overload("helper", "", DeclId(1));
    table.close();
    table.add_import(root);

    table.open(ScopeKind::Block);
    assert_eq!(table.lookup("shared"), Some(DeclId(0)));
    assert_eq!(table.lookup_overload("helper", ""), Some(DeclId(1)));
    table.declare("shared", DeclId(2));
    assert_eq!(table.lookup("shared"), Some(DeclId(2)));
}

#[test]
fn member_lookup_stays_inside_class_chain() {
    let mut table = ScopeTable::new();
    table.declare("global_only", DeclId(9));
    let base = table.open(ScopeKind::Class);
    table.declare("x", DeclId(0));
    table.declare_overload("area", "", DeclId(1));
    table.close();
    let derived = table.open(ScopeKind::Class);
    table.set_superclass(derived, base);
    table.declare("y", DeclId(2));
    table.close();

    assert_eq!(table.lookup_member(derived, "x"), Some(DeclId(0)));
    assert_eq!(table.lookup_member(derived, "y"), Some(DeclId(2)));
    assert_eq!(table.lookup_member(derived, "global_only"), None);
    assert_eq!(
        table.member_overloads(derived, "area"),
        vec![(String::new(), DeclId(1))]
    );
    assert_eq!(table.lookup_from(derived, "global_only"), Some(DeclId(9)));
}

#[test]
fn subclass_of_an_imported_class_still_sees_its_own_file() {
    let mut table = ScopeTable::new();
    table.declare_overload("helper", "", DeclId(0));
    let root = table.open_with_parent(ScopeKind::Import, None);
    table.declare("Base", DeclId(1));
    let base = table.open(ScopeKind::Class);
    table.declare("inherited", DeclId(2));
    table.close();
    table.close();
    table.add_import(root);

    let derived = table.open(ScopeKind::Class);
    table.set_superclass(derived, base);
    let method = table.open(ScopeKind::Function);
    table.close();
    table.close();

    assert_eq!(table.parent(derived), Some(table.global()));
    assert_eq!(table.lookup_from(method, "inherited"), Some(DeclId(2)));
    assert_eq!(table.lookup_overload_from(method, "helper", ""), Some(DeclId(0)));
    assert_eq!(table.overloads_from(method, "helper"), vec![(String::new(), DeclId(0))]);
    assert_eq!(table.lookup_from(method, "Base"), Some(DeclId(1)));
}

#[test]
fn rollback_discards_journaled_insertions() {
    let mut table = ScopeTable::new();
    table.declare("kept", DeclId(0));
    table.begin_journal();
    table.declare("kept", DeclId(5));
    table.declare("dropped", DeclId(1));
    table.declare_overload("f", "I", DeclId(2));
    table.open(ScopeKind::Block);
    table.rollback();

    assert_eq!(table.current(), table.global());
    assert_eq!(table.lookup("kept"), Some(DeclId(0)));
    assert_eq!(table.lookup("dropped"), None);
    assert!(!table.has_overload_collision("f", "I"));
}

#[test]
fn commit_keeps_insertions() {
    let mut table = ScopeTable::new();
    table.begin_journal();
    table.declare("x", DeclId(0));
    table.commit();
    table.rollback();
    assert_eq!(table.lookup("x"), Some(DeclId(0)));
}
