//! S1: arithmetic and a conditional branch, end to end through the
//! interpreter loop — `if_icmpgt` picking one of two `imul` expressions and
//! returning the result through `invokestatic`/`putstatic`.

mod common;

use common::{flags, read_static_int, ClassBuilder, CodeSpec};

#[test]
fn conditional_branch_picks_the_greater_operand_times_two() {
    let dir = common::classpath_dir("s1");
    common::write_bootstrap_classes(&dir);

    let mut cb = ClassBuilder::new("Arith", Some("java/lang/Object"));

    // int compute(int a, int b) { return (a > b ? a : b) * 2; }
    //
    //  0: iload_0
    //  1: iload_1
    //  2: if_icmpgt -> 9
    //  5: iload_1
    //  6: iconst_2
    //  7: imul
    //  8: ireturn
    //  9: iload_0
    // 10: iconst_2
    // 11: imul
    // 12: ireturn
    let compute_code = vec![0x1a, 0x1b, 0xa3, 0x00, 0x07, 0x1b, 0x05, 0x68, 0xac, 0x1a, 0x05, 0x68, 0xac];
    cb.add_method(
        flags::ACC_PUBLIC | flags::ACC_STATIC,
        "compute",
        "(II)I",
        Some(CodeSpec { max_stack: 2, max_locals: 2, bytes: compute_code, exceptions: vec![] }),
    );
    cb.add_field(flags::ACC_PUBLIC | flags::ACC_STATIC, "result", "I");

    let compute_ref = cb.cp.methodref("Arith", "compute", "(II)I");
    let result_ref = cb.cp.fieldref("Arith", "result", "I");

    let mut main_code = vec![0x10, 3, 0x10, 7, 0xb8];
    main_code.extend_from_slice(&compute_ref.to_be_bytes());
    main_code.push(0xb3);
    main_code.extend_from_slice(&result_ref.to_be_bytes());
    main_code.push(0xb1);
    cb.add_method(
        flags::ACC_PUBLIC | flags::ACC_STATIC,
        "main",
        "([Ljava/lang/String;)V",
        Some(CodeSpec { max_stack: 2, max_locals: 1, bytes: main_code, exceptions: vec![] }),
    );

    let bytes = cb.build();
    std::fs::write(dir.join("Arith.class"), bytes).unwrap();

    let vm = common::boot_vm(&dir, "Arith");
    babe_vm::interp::run(&vm).expect("program runs to completion");

    assert_eq!(read_static_int(&vm, b"Arith", b"result"), 14);
}
