//! Call frames

use crate::bytecode::Chunk;
use crate::object::ObjectId;
use std::rc::Rc;

/// One active call: a closure, its instruction pointer and the stack base
/// of its slots (slot 0 holds the callee / `this`)
#[derive(Debug)]
pub struct CallFrame {
    /// The executing closure
    pub closure: ObjectId,
    /// The closure's function's chunk, shared out of the heap object so the
    /// dispatch loop reads code without re-borrowing the heap
    pub chunk: Rc<Chunk>,
    /// Next instruction index into the chunk
    pub ip: usize,
    /// Absolute value-stack index of slot 0
    pub slot_base: usize,
}
