//! Reference discipline across handles, fields, and teardown.

use transom_runtime::hooks::release_fields;
use transom_runtime::{
    global_heap, register_type, CallArgs, FieldAccess, TypeSpec, Value, ValueKind,
};

#[test]
fn test_clone_retains_and_drop_releases() {
    let ty = register_type(TypeSpec::new("lc_plain")).unwrap();

    let obj = ty.instantiate(&CallArgs::empty()).unwrap();
    let id = obj.id();
    assert_eq!(obj.refcount(), 1);

    let alias = obj.clone();
    assert_eq!(obj.refcount(), 2);

    drop(alias);
    assert_eq!(obj.refcount(), 1);

    drop(obj);
    assert!(!global_heap().is_live(id));
}

#[test]
fn test_borrow_is_free_and_upgrade_retains() {
    let ty = register_type(TypeSpec::new("lc_borrow")).unwrap();

    let obj = ty.instantiate(&CallArgs::empty()).unwrap();
    let borrowed = obj.borrow();
    assert_eq!(obj.refcount(), 1);

    let upgraded = borrowed.upgrade().unwrap();
    assert_eq!(obj.refcount(), 2);
    assert_eq!(upgraded.id(), obj.id());
}

#[test]
fn test_ownership_moves_through_a_field_chain() {
    let holder = register_type(
        TypeSpec::new("lc_holder")
            .field("inner", ValueKind::Object, FieldAccess::ReadWrite)
            .drop_hook(release_fields),
    )
    .unwrap();
    let leaf_ty = register_type(TypeSpec::new("lc_leaf")).unwrap();

    let outer = holder.instantiate(&CallArgs::empty()).unwrap();
    let middle = holder.instantiate(&CallArgs::empty()).unwrap();
    let leaf = leaf_ty.instantiate(&CallArgs::empty()).unwrap();
    let (middle_id, leaf_id) = (middle.id(), leaf.id());

    holder.set_field(&middle, "inner", Value::Object(leaf)).unwrap();
    holder.set_field(&outer, "inner", Value::Object(middle)).unwrap();
    assert_eq!(global_heap().refcount(middle_id), Some(1));
    assert_eq!(global_heap().refcount(leaf_id), Some(1));

    // Pulling the middle out keeps it alive independent of the outer.
    let detached = holder.get_field(&outer, "inner").unwrap();
    drop(outer);
    assert!(global_heap().is_live(middle_id));
    assert!(global_heap().is_live(leaf_id));

    // The last reference going away tears down the rest of the chain.
    drop(detached);
    assert!(!global_heap().is_live(middle_id));
    assert!(!global_heap().is_live(leaf_id));
}

#[test]
fn test_overwrite_releases_previous_occupant() {
    let holder = register_type(
        TypeSpec::new("lc_swap")
            .field("inner", ValueKind::Object, FieldAccess::ReadWrite)
            .drop_hook(release_fields),
    )
    .unwrap();
    let leaf_ty = register_type(TypeSpec::new("lc_swap_leaf")).unwrap();

    let outer = holder.instantiate(&CallArgs::empty()).unwrap();
    let first = leaf_ty.instantiate(&CallArgs::empty()).unwrap();
    let first_id = first.id();
    holder.set_field(&outer, "inner", Value::Object(first)).unwrap();

    let second = leaf_ty.instantiate(&CallArgs::empty()).unwrap();
    let second_id = second.id();
    holder.set_field(&outer, "inner", Value::Object(second)).unwrap();

    assert!(!global_heap().is_live(first_id));
    assert!(global_heap().is_live(second_id));
}

#[test]
fn test_value_clone_retains() {
    let ty = register_type(TypeSpec::new("lc_value")).unwrap();

    let obj = ty.instantiate(&CallArgs::empty()).unwrap();
    let id = obj.id();
    let value = Value::Object(obj);
    assert_eq!(global_heap().refcount(id), Some(1));

    let copy = value.clone();
    assert_eq!(global_heap().refcount(id), Some(2));

    drop(value);
    drop(copy);
    assert!(!global_heap().is_live(id));
}

#[test]
fn test_object_ids_are_never_reused() {
    let ty = register_type(TypeSpec::new("lc_ids")).unwrap();

    let first = ty.instantiate(&CallArgs::empty()).unwrap();
    let first_id = first.id();
    drop(first);

    let second = ty.instantiate(&CallArgs::empty()).unwrap();
    assert_ne!(second.id(), first_id);
    assert!(!global_heap().is_live(first_id));
}
