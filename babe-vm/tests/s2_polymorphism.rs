//! S2: virtual dispatch. `invokevirtual` is resolved symbolically against
//! `Base.value()I` but the call lands on `Derived.value()I` because dispatch
//! is redone against the receiver's actual runtime class
//! (`interp::invoke_virtual`'s `find_method(&actual, ...)`).

mod common;

use common::{flags, read_static_int, ClassBuilder, CodeSpec};

#[test]
fn invokevirtual_dispatches_on_the_receivers_actual_class() {
    let dir = common::classpath_dir("s2");
    common::write_bootstrap_classes(&dir);

    // class Base { public int value() { return 1; } }
    let mut base = ClassBuilder::new("Base", Some("java/lang/Object"));
    let base_super_init = base.cp.methodref("java/lang/Object", "<init>", "()V");
    let mut base_init = vec![0x2a, 0xb7];
    base_init.extend_from_slice(&base_super_init.to_be_bytes());
    base_init.push(0xb1);
    base.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: base_init, exceptions: vec![] }));
    base.add_method(
        flags::ACC_PUBLIC,
        "value",
        "()I",
        Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: vec![0x04, 0xac], exceptions: vec![] }),
    );
    std::fs::write(dir.join("Base.class"), base.build()).unwrap();

    // class Derived extends Base { public int value() { return 2; } }
    let mut derived = ClassBuilder::new("Derived", Some("Base"));
    let derived_super_init = derived.cp.methodref("Base", "<init>", "()V");
    let mut derived_init = vec![0x2a, 0xb7];
    derived_init.extend_from_slice(&derived_super_init.to_be_bytes());
    derived_init.push(0xb1);
    derived.add_method(
        flags::ACC_PUBLIC,
        "<init>",
        "()V",
        Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: derived_init, exceptions: vec![] }),
    );
    derived.add_method(
        flags::ACC_PUBLIC,
        "value",
        "()I",
        Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: vec![0x05, 0xac], exceptions: vec![] }),
    );
    std::fs::write(dir.join("Derived.class"), derived.build()).unwrap();

    // class Poly {
    //   static int result;
    //   static void main(String[] args) { result = new Derived().value(); }
    // }
    let mut poly = ClassBuilder::new("Poly", Some("java/lang/Object"));
    poly.add_field(flags::ACC_PUBLIC | flags::ACC_STATIC, "result", "I");
    let new_derived = poly.cp.class("Derived");
    let derived_ctor = poly.cp.methodref("Derived", "<init>", "()V");
    let base_value = poly.cp.methodref("Base", "value", "()I");
    let result_ref = poly.cp.fieldref("Poly", "result", "I");

    let mut main_code = vec![0xbb];
    main_code.extend_from_slice(&new_derived.to_be_bytes());
    main_code.push(0x59); // dup
    main_code.push(0xb7); // invokespecial
    main_code.extend_from_slice(&derived_ctor.to_be_bytes());
    main_code.push(0xb6); // invokevirtual Base.value()I
    main_code.extend_from_slice(&base_value.to_be_bytes());
    main_code.push(0xb3); // putstatic
    main_code.extend_from_slice(&result_ref.to_be_bytes());
    main_code.push(0xb1);
    poly.add_method(
        flags::ACC_PUBLIC | flags::ACC_STATIC,
        "main",
        "([Ljava/lang/String;)V",
        Some(CodeSpec { max_stack: 2, max_locals: 1, bytes: main_code, exceptions: vec![] }),
    );
    std::fs::write(dir.join("Poly.class"), poly.build()).unwrap();

    let vm = common::boot_vm(&dir, "Poly");
    babe_vm::interp::run(&vm).expect("program runs to completion");

    assert_eq!(read_static_int(&vm, b"Poly", b"result"), 2, "Derived's override must win, not Base's");
}
