//! S3: interface dispatch via `invokeinterface`, both the success path
//! (a class that actually implements the interface) and the failure path
//! (`IncompatibleClassChangeError` when the receiver's actual class does
//! not implement the resolved interface, per `interp::invoke_interface`'s
//! `is_assignable_from` check).

mod common;

use common::{flags, read_static_int, ClassBuilder, CodeSpec};

#[test]
fn invokeinterface_dispatches_and_rejects_non_implementors() {
    let dir = common::classpath_dir("s3");
    common::write_bootstrap_classes(&dir);

    // interface Greeter { int greet(); }
    let mut greeter = ClassBuilder::new("Greeter", Some("java/lang/Object"));
    greeter.set_access_flags(flags::ACC_PUBLIC | flags::ACC_INTERFACE | flags::ACC_ABSTRACT);
    greeter.add_method(flags::ACC_PUBLIC | flags::ACC_ABSTRACT, "greet", "()I", None);
    std::fs::write(dir.join("Greeter.class"), greeter.build()).unwrap();

    // class Impl implements Greeter { public int greet() { return 42; } }
    let mut imp = ClassBuilder::new("Impl", Some("java/lang/Object"));
    imp.add_interface("Greeter");
    let imp_super_init = imp.cp.methodref("java/lang/Object", "<init>", "()V");
    let mut imp_init = vec![0x2a, 0xb7];
    imp_init.extend_from_slice(&imp_super_init.to_be_bytes());
    imp_init.push(0xb1);
    imp.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: imp_init, exceptions: vec![] }));
    imp.add_method(
        flags::ACC_PUBLIC,
        "greet",
        "()I",
        Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: vec![0x10, 42, 0xac], exceptions: vec![] }),
    );
    std::fs::write(dir.join("Impl.class"), imp.build()).unwrap();

    // class NotImpl { public NotImpl() { super(); } } -- does not implement Greeter
    let mut not_impl = ClassBuilder::new("NotImpl", Some("java/lang/Object"));
    let not_impl_super_init = not_impl.cp.methodref("java/lang/Object", "<init>", "()V");
    let mut not_impl_init = vec![0x2a, 0xb7];
    not_impl_init.extend_from_slice(&not_impl_super_init.to_be_bytes());
    not_impl_init.push(0xb1);
    not_impl.add_method(
        flags::ACC_PUBLIC,
        "<init>",
        "()V",
        Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: not_impl_init, exceptions: vec![] }),
    );
    std::fs::write(dir.join("NotImpl.class"), not_impl.build()).unwrap();

    // class Iface {
    //   static int okResult;
    //   static int caught;
    //   static void main(String[] args) {
    //     okResult = new Impl().greet();
    //     NotImpl n = new NotImpl();
    //     try {
    //       n.greet();          // Greeter.greet()I, resolved symbolically against Greeter
    //     } catch (IncompatibleClassChangeError e) {
    //       caught = 1;
    //     }
    //   }
    // }
    let mut iface = ClassBuilder::new("Iface", Some("java/lang/Object"));
    iface.add_field(flags::ACC_PUBLIC | flags::ACC_STATIC, "okResult", "I");
    iface.add_field(flags::ACC_PUBLIC | flags::ACC_STATIC, "caught", "I");

    let new_impl = iface.cp.class("Impl");
    let impl_ctor = iface.cp.methodref("Impl", "<init>", "()V");
    let greet_ref = iface.cp.interface_methodref("Greeter", "greet", "()I");
    let ok_result_ref = iface.cp.fieldref("Iface", "okResult", "I");
    let new_not_impl = iface.cp.class("NotImpl");
    let not_impl_ctor = iface.cp.methodref("NotImpl", "<init>", "()V");
    let caught_ref = iface.cp.fieldref("Iface", "caught", "I");

    let mut code = vec![0xbb];
    code.extend_from_slice(&new_impl.to_be_bytes());
    code.push(0x59);
    code.push(0xb7);
    code.extend_from_slice(&impl_ctor.to_be_bytes());
    code.push(0xb9);
    code.extend_from_slice(&greet_ref.to_be_bytes());
    code.push(1);
    code.push(0);
    code.push(0xb3);
    code.extend_from_slice(&ok_result_ref.to_be_bytes());
    code.push(0xbb);
    code.extend_from_slice(&new_not_impl.to_be_bytes());
    code.push(0x59);
    code.push(0xb7);
    code.extend_from_slice(&not_impl_ctor.to_be_bytes());
    code.push(0x4c); // astore_1
    let try_start = code.len() as u16;
    code.push(0x2b); // aload_1
    code.push(0xb9);
    code.extend_from_slice(&greet_ref.to_be_bytes());
    code.push(1);
    code.push(0);
    code.push(0x57); // pop
    let try_end = code.len() as u16;
    let goto_at = code.len();
    code.push(0xa7);
    code.extend_from_slice(&0i16.to_be_bytes()); // patched below
    let handler_pc = code.len() as u16;
    code.push(0x57); // pop the exception
    code.push(0x04); // iconst_1
    code.push(0xb3);
    code.extend_from_slice(&caught_ref.to_be_bytes());
    let end_pc = code.len() as u16;
    code.push(0xb1); // return
    let goto_offset = (end_pc as i32 - goto_at as i32) as i16;
    code[goto_at + 1..goto_at + 3].copy_from_slice(&goto_offset.to_be_bytes());

    iface.add_method(
        flags::ACC_PUBLIC | flags::ACC_STATIC,
        "main",
        "([Ljava/lang/String;)V",
        Some(CodeSpec {
            max_stack: 2,
            max_locals: 2,
            bytes: code,
            exceptions: vec![(try_start, try_end, handler_pc, Some("java/lang/IncompatibleClassChangeError".to_string()))],
        }),
    );
    std::fs::write(dir.join("Iface.class"), iface.build()).unwrap();

    let vm = common::boot_vm(&dir, "Iface");
    babe_vm::interp::run(&vm).expect("program runs to completion");

    assert_eq!(read_static_int(&vm, b"Iface", b"okResult"), 42);
    assert_eq!(read_static_int(&vm, b"Iface", b"caught"), 1, "a non-implementing receiver must raise IncompatibleClassChangeError");
}
