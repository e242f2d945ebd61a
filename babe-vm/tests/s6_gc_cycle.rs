//! S6: the cyclic-garbage half of the GC scenario. Two `Node` instances
//! reference each other (a 2-cycle with no external roots) and are
//! reclaimed anyway, proving collection isn't plain reference counting.
//!
//! This intentionally does not cover the scenario's weak-reference half:
//! there is no weak-reference type anywhere in the object model or
//! `gc.rs` to clear, so only the cycle-reclamation property is testable
//! here. See DESIGN.md's test coverage notes for that gap.

mod common;

use common::{flags, ClassBuilder};

#[test]
fn a_reference_cycle_with_no_roots_is_reclaimed() {
    let dir = common::classpath_dir("s6");
    common::write_bootstrap_classes(&dir);

    // class Node { Object next; }
    let mut node = ClassBuilder::new("Node", Some("java/lang/Object"));
    node.add_field(flags::ACC_PUBLIC, "next", "Ljava/lang/Object;");
    std::fs::write(dir.join("Node.class"), node.build()).unwrap();

    let vm = common::boot_vm(&dir, "Node");

    let clazz = vm.class_pool.borrow().get(babe_vm::object::Reference::NULL, b"Node").expect("class is loaded");
    let a = vm.new_instance(&clazz).expect("allocate first node");
    let b = vm.new_instance(&clazz).expect("allocate second node");

    common::write_instance_ref(&vm, a, 0, b);
    common::write_instance_ref(&vm, b, 0, a);
    drop((a, b));

    let freed_before = vm.heap.borrow().free_total();
    let reclaimed = babe_vm::gc::collect(&vm);
    let freed_after = vm.heap.borrow().free_total();

    assert!(reclaimed > 0, "a rootless cycle must be reclaimed, not kept alive by its mutual references");
    assert!(freed_after > freed_before, "heap space from the cycle must be returned to the free list");
}
