//! The stack/frame engine (§4.E): locals, operand stack, and the
//! callback-wedge mechanism that lets `<clinit>` completion and native
//! invocation results reintegrate into the interpreter loop.
//!
//! Grounded on `exo-jvm/src/vm/class/mod.rs`'s `JavaMethodCode` (max_stack/
//! max_locals driving frame sizing) generalized away from the teacher's
//! fixed global operand-stack region: each `Frame` owns its own `Vec<Cell>`
//! locals and stack rather than slicing a shared arena, which is the
//! natural representation once frames are just Rust values on a `Vec` owned
//! by the thread instead of pointers into a C-style stack buffer.

use std::rc::Rc;

use crate::class::{ClazzRef, Method};
use crate::object::{Cell, Reference};

/// One method activation. `locals[0..max_locals]` and `stack[0..sp]` are the
/// frame's live state; `stack` is used as a growable operand stack bounded
/// by `method.body`'s `max_stack`.
pub struct Frame {
    pub method: Rc<Method>,
    pub clazz: ClazzRef,
    pub locals: Vec<Cell>,
    pub stack: Vec<Cell>,
    pub pc: usize,
    /// The object (instance methods) or Class mirror (static methods) whose
    /// monitor this frame acquired, for a `synchronized` method.
    pub sync_object: Option<Reference>,
    /// Set once this frame's `synchronized` monitor has actually been
    /// acquired; contention re-executes entry without double-acquiring.
    pub monitor_held: bool,
}

impl Frame {
    pub fn new(method: Rc<Method>, clazz: ClazzRef, max_locals: usize, args: &[Cell]) -> Self {
        let mut locals = vec![Cell::ZERO; max_locals.max(args.len())];
        locals[..args.len()].copy_from_slice(args);
        Self {
            method,
            clazz,
            locals,
            stack: Vec::new(),
            pc: 0,
            sync_object: None,
            monitor_held: false,
        }
    }

    pub fn push(&mut self, v: Cell) {
        self.stack.push(v);
    }

    pub fn pop(&mut self) -> Cell {
        self.stack.pop().expect("operand stack underflow: a verified method never pops past empty")
    }

    pub fn peek(&self) -> Cell {
        *self.stack.last().expect("operand stack underflow")
    }
}

/// A pending action to run once a particular frame pops, letting the
/// interpreter thread a continuation through class initialization or a
/// native call without growing the Rust call stack. The frame that installs
/// a wedge is conceptually "above" the callee; when the callee's frame pops,
/// `Thread::pop_frame` invokes the wedge with the callee's return cells.
pub enum CallbackWedge {
    /// `<clinit>` driving: resume initializing `clazz` after its superclass
    /// initializer frame (or its own `<clinit>` frame) returns.
    ResumeClinit(ClazzRef),
    /// A plain call: nothing extra to do once the callee returns; its return
    /// value is simply pushed onto the caller's stack by `Thread::pop_frame`.
    None,
}
