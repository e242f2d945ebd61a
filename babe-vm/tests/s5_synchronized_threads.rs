//! S5: two green threads contending a monitor through a `synchronized`
//! instance method. The cooperative scheduler is deterministic (no real
//! OS-thread races are possible), so the iteration count is scaled down
//! from the scenario's "a million increments" to a couple thousand per
//! thread — the property under test (exact final count under mutual
//! exclusion) doesn't depend on the literal count, only on every
//! `increment()` call being serialized.
//!
//! Also exercises `interp::invoke_virtual`'s declaring-class dispatch fix:
//! `Thread.start()` is invoked on a `Worker` (a `Thread` subclass that only
//! overrides `run`, never `start`), so dispatch must resolve the native
//! method against `java/lang/Thread`, not `Worker`.

mod common;

use common::{flags, read_instance_int, read_static_ref, ClassBuilder, CodeSpec};

const ITERATIONS: i16 = 2000;

#[test]
fn synchronized_increment_is_exact_across_two_threads() {
    let dir = common::classpath_dir("s5");
    common::write_bootstrap_classes(&dir);

    // class Counter {
    //   int value;
    //   synchronized void increment() { value = value + 1; }
    // }
    let mut counter = ClassBuilder::new("Counter", Some("java/lang/Object"));
    counter.add_field(flags::ACC_PUBLIC, "value", "I");
    let counter_super_init = counter.cp.methodref("java/lang/Object", "<init>", "()V");
    let mut counter_init = vec![0x2a, 0xb7];
    counter_init.extend_from_slice(&counter_super_init.to_be_bytes());
    counter_init.push(0xb1);
    counter.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: counter_init, exceptions: vec![] }));
    let value_ref = counter.cp.fieldref("Counter", "value", "I");
    let mut increment_code = vec![0x2a, 0x2a, 0xb4];
    increment_code.extend_from_slice(&value_ref.to_be_bytes());
    increment_code.push(0x04);
    increment_code.push(0x60);
    increment_code.push(0xb5);
    increment_code.extend_from_slice(&value_ref.to_be_bytes());
    increment_code.push(0xb1);
    counter.add_method(
        flags::ACC_PUBLIC | flags::ACC_SYNCHRONIZED,
        "increment",
        "()V",
        Some(CodeSpec { max_stack: 3, max_locals: 1, bytes: increment_code, exceptions: vec![] }),
    );
    std::fs::write(dir.join("Counter.class"), counter.build()).unwrap();

    // class StaticHolder { static Object counter; }
    let mut holder = ClassBuilder::new("StaticHolder", Some("java/lang/Object"));
    holder.add_field(flags::ACC_PUBLIC | flags::ACC_STATIC, "counter", "Ljava/lang/Object;");
    std::fs::write(dir.join("StaticHolder.class"), holder.build()).unwrap();

    // class Worker extends Thread {
    //   void run() {
    //     for (int i = 0; i < ITERATIONS; i++) ((Counter) StaticHolder.counter).increment();
    //   }
    // }
    let mut worker = ClassBuilder::new("Worker", Some("java/lang/Thread"));
    let worker_super_init = worker.cp.methodref("java/lang/Thread", "<init>", "()V");
    let mut worker_init = vec![0x2a, 0xb7];
    worker_init.extend_from_slice(&worker_super_init.to_be_bytes());
    worker_init.push(0xb1);
    worker.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: worker_init, exceptions: vec![] }));

    let holder_counter_ref = worker.cp.fieldref("StaticHolder", "counter", "Ljava/lang/Object;");
    let increment_ref = worker.cp.methodref("Counter", "increment", "()V");
    let mut run_code = vec![0x03, 0x3c]; // iconst_0, istore_1
    let loop_start = run_code.len() as i64;
    run_code.push(0x1b); // iload_1
    run_code.push(0x11); // sipush
    run_code.extend_from_slice(&ITERATIONS.to_be_bytes());
    let if_icmpge_at = run_code.len();
    run_code.push(0xa2); // if_icmpge
    run_code.extend_from_slice(&0i16.to_be_bytes()); // patched
    run_code.push(0xb2); // getstatic
    run_code.extend_from_slice(&holder_counter_ref.to_be_bytes());
    run_code.push(0xb6); // invokevirtual
    run_code.extend_from_slice(&increment_ref.to_be_bytes());
    run_code.push(0x84); // iinc
    run_code.push(1);
    run_code.push(1);
    let goto_at = run_code.len();
    run_code.push(0xa7); // goto
    let goto_offset = (loop_start - goto_at as i64) as i16;
    run_code.extend_from_slice(&goto_offset.to_be_bytes());
    let end_pc = run_code.len() as i64;
    run_code.push(0xb1); // return
    let if_icmpge_offset = (end_pc - if_icmpge_at as i64) as i16;
    run_code[if_icmpge_at + 1..if_icmpge_at + 3].copy_from_slice(&if_icmpge_offset.to_be_bytes());

    worker.add_method(flags::ACC_PUBLIC, "run", "()V", Some(CodeSpec { max_stack: 2, max_locals: 2, bytes: run_code, exceptions: vec![] }));
    std::fs::write(dir.join("Worker.class"), worker.build()).unwrap();

    // class Main {
    //   static void main(String[] args) {
    //     StaticHolder.counter = new Counter();
    //     new Worker().start();
    //     new Worker().start();
    //   }
    // }
    let mut main = ClassBuilder::new("Main", Some("java/lang/Object"));
    let new_counter = main.cp.class("Counter");
    let counter_ctor = main.cp.methodref("Counter", "<init>", "()V");
    let holder_counter_ref2 = main.cp.fieldref("StaticHolder", "counter", "Ljava/lang/Object;");
    let new_worker = main.cp.class("Worker");
    let worker_ctor = main.cp.methodref("Worker", "<init>", "()V");
    let thread_start = main.cp.methodref("java/lang/Thread", "start", "()V");

    let mut main_code = vec![0xbb];
    main_code.extend_from_slice(&new_counter.to_be_bytes());
    main_code.push(0x59);
    main_code.push(0xb7);
    main_code.extend_from_slice(&counter_ctor.to_be_bytes());
    main_code.push(0xb3);
    main_code.extend_from_slice(&holder_counter_ref2.to_be_bytes());
    for _ in 0..2 {
        main_code.push(0xbb);
        main_code.extend_from_slice(&new_worker.to_be_bytes());
        main_code.push(0x59);
        main_code.push(0xb7);
        main_code.extend_from_slice(&worker_ctor.to_be_bytes());
        main_code.push(0xb6);
        main_code.extend_from_slice(&thread_start.to_be_bytes());
    }
    main_code.push(0xb1);
    main.add_method(
        flags::ACC_PUBLIC | flags::ACC_STATIC,
        "main",
        "([Ljava/lang/String;)V",
        Some(CodeSpec { max_stack: 2, max_locals: 1, bytes: main_code, exceptions: vec![] }),
    );
    std::fs::write(dir.join("Main.class"), main.build()).unwrap();

    let vm = common::boot_vm(&dir, "Main");
    babe_vm::interp::run(&vm).expect("every spawned thread runs to completion");

    let counter_ref = read_static_ref(&vm, b"StaticHolder", b"counter");
    assert_eq!(
        read_instance_int(&vm, counter_ref, 0),
        2 * ITERATIONS as i32,
        "synchronized increment() must serialize both threads with no lost updates"
    );
}
