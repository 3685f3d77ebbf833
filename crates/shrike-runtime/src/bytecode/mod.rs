//! Bytecode instruction set and chunks
//!
//! Every instruction is one 32-bit word: the low 16 bits are the main
//! opcode, the high 16 bits a flags bitmap distinguishing forms of
//! overloaded opcodes (`GET` local/global/upvalue/function/class, `INC`
//! prefix/postfix, ...). Operands occupy their own words. Constants are
//! stored inline per chunk and indexed by 16-bit positions.

mod disasm;

pub use disasm::disassemble;

use crate::value::Value;
use bitflags::bitflags;
use num_enum::TryFromPrimitive;
use std::rc::Rc;

/// Main opcodes (low 16 bits of an instruction word)
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum OpCode {
    /// Push `constants[operand]`
    Constant = 1,
    /// Push `nil`
    ConstantNil,
    /// Push `true`
    ConstantTrue,
    /// Push `false`
    ConstantFalse,
    /// Drop the top value
    Pop,
    /// Drop the top `operand` values
    PopN,
    /// Push a bound value; the flags pick local/global/upvalue/function/class
    Get,
    /// Write the top value into a binding (does not pop)
    Set,
    /// Bind a new name to the top value; flags pick local/global/function
    Define,
    /// Read an instance field (FIELD flag) or bind a method (METHOD flag)
    GetProperty,
    /// Write an instance field by index
    SetProperty,
    /// Resolve a member on a specific base class
    GetSuper,
    /// Pop two, push equality
    Equal,
    /// Pop two, push `left > right`
    Greater,
    /// Pop two, push `left < right`
    Less,
    /// Pop two, push `left >= right`
    GreaterEqual,
    /// Pop two, push `left <= right`
    LessEqual,
    /// Numeric add, or string concatenation
    Add,
    /// Numeric subtract
    Subtract,
    /// Numeric multiply
    Multiply,
    /// Numeric divide
    Divide,
    /// Exponentiation
    Pow,
    /// Remainder
    Mod,
    /// Arithmetic negation
    Negate,
    /// Increment a binding in place; flags pick form and prefix/postfix
    Inc,
    /// Decrement a binding in place
    Dec,
    /// Boolean negation
    Not,
    /// Write the top value to the console, then pop
    Print,
    /// Unconditional forward branch
    Jump,
    /// Forward branch when the top value is falsey (value stays)
    JumpIfFalse,
    /// Backward branch
    Loop,
    /// Call `stack[top - argc - 1]` with `argc` arguments
    Call,
    /// Method call by dispatch id: operands `[id, argc]`
    Invoke,
    /// Super-method call through a class: operands `[id, argc]`
    SuperInvoke,
    /// Wrap the function constant in a closure; capture pairs follow
    Closure,
    /// Promote the open upvalue at the top slot to closed, then pop
    CloseUpvalue,
    /// Return from the current frame
    Return,
    /// Allocate a class: operands `[name constant, field count]`
    Class,
    /// Copy the base class's method table into the subclass
    Inherit,
    /// Attach the top closure as a method: operand `[dispatch id]`
    Method,
    /// Pop `operand` values, push a list
    MakeList,
    /// Pop `2 * operand` values, push a map
    MapInit,
    /// Construct an instance: operands `[ctor dispatch id, argc]`
    Instance,
    /// Pop index and container, push the element
    ContainerGet,
    /// Pop value, index, container; write; push the value
    ContainerSet,
    /// Pop hi, lo, container; push the slice
    ContainerGetRange,
    /// Iterator step for `foreach`
    ContainerIterate,
}

bitflags! {
    /// Secondary flags (high 16 bits of an instruction word)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecondaryFlags: u16 {
        /// `++x` form: push the new value
        const PREFIX = 1 << 0;
        /// `x++` form: push the old value
        const POSTFIX = 1 << 1;
        /// Operand is a global name constant index
        const GLOBAL = 1 << 2;
        /// Operand is a frame slot
        const LOCAL = 1 << 3;
        /// Operand is an upvalue index
        const UPVALUE = 1 << 4;
        /// Operand is a function dispatch id (function table access)
        const FUNCTION = 1 << 5;
        /// Operand names a class
        const CLASS = 1 << 6;
        /// Property access targets a field slot
        const FIELD = 1 << 7;
        /// Property access binds a method
        const METHOD = 1 << 8;
        /// Marks a constructor in `Method` attachment
        const CTOR = 1 << 9;
    }
}

/// Compose an instruction word from opcode and flags
pub fn compose(op: OpCode, flags: SecondaryFlags) -> u32 {
    ((flags.bits() as u32) << 16) | op as u16 as u32
}

/// The main opcode of an instruction word
pub fn main_op(word: u32) -> Option<OpCode> {
    OpCode::try_from((word & 0xFFFF) as u16).ok()
}

/// The secondary flags of an instruction word
pub fn secondary(word: u32) -> SecondaryFlags {
    SecondaryFlags::from_bits_truncate((word >> 16) as u16)
}

/// Line-table entry meaning "same line as the previous instruction"
pub const INVALID_LINE: i64 = -1;

/// Bytecode of one function: code words, a co-indexed line table and a
/// constant pool. A chunk is owned by exactly one function object.
#[derive(Debug)]
pub struct Chunk {
    /// Instruction and operand words
    pub code: Vec<u32>,
    /// One entry per word; 1-based lines, runs compressed via `last_line`
    pub lines: Vec<i64>,
    /// Constant pool
    pub constants: Vec<Value>,
    /// File name for runtime error reports
    pub filename: Rc<str>,
    last_line: i64,
}

impl Chunk {
    /// Create an empty chunk for `filename`
    pub fn new(filename: Rc<str>) -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            filename,
            last_line: INVALID_LINE,
        }
    }

    /// Append a word. `INVALID_LINE` repeats the previous line.
    pub fn write(&mut self, word: u32, line: i64) {
        self.code.push(word);
        if line == INVALID_LINE {
            self.lines.push(self.last_line);
        } else {
            self.lines.push(line);
            self.last_line = line;
        }
    }

    /// Append an instruction word
    pub fn write_op(&mut self, op: OpCode, flags: SecondaryFlags, line: i64) {
        self.write(compose(op, flags), line);
    }

    /// Append a bare operand word on the previous instruction's line
    pub fn write_operand(&mut self, operand: u32) {
        self.write(operand, INVALID_LINE);
    }

    /// Add a constant, returning its 16-bit pool index.
    ///
    /// Returns `None` when the pool is full; the code generator reports
    /// that as a compile error.
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        if self.constants.len() > u16::MAX as usize {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u16)
    }

    /// Current emission offset (the next word's index)
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True when no words were emitted
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Overwrite the word at `offset` (jump patching)
    pub fn patch(&mut self, offset: usize, word: u32) {
        self.code[offset] = word;
    }

    /// Source line of the instruction at `offset`
    pub fn line_of(&self, offset: usize) -> i64 {
        self.lines.get(offset).copied().unwrap_or(INVALID_LINE)
    }

    /// Approximate in-memory size, used by the collection threshold
    pub fn byte_size(&self) -> usize {
        self.code.len() * 4
            + self.lines.len() * 8
            + self.constants.len() * std::mem::size_of::<Value>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk::new(Rc::from("test"))
    }

    #[test]
    fn test_word_layout() {
        let word = compose(OpCode::Get, SecondaryFlags::LOCAL);
        assert_eq!(main_op(word), Some(OpCode::Get));
        assert_eq!(secondary(word), SecondaryFlags::LOCAL);
    }

    #[test]
    fn test_bad_opcode_decodes_to_none() {
        assert_eq!(main_op(0xFFFF), None);
        assert_eq!(main_op(0), None);
    }

    #[test]
    fn test_line_run_length() {
        let mut c = chunk();
        c.write_op(OpCode::ConstantNil, SecondaryFlags::empty(), 3);
        c.write_operand(7);
        c.write_op(OpCode::Pop, SecondaryFlags::empty(), 5);
        assert_eq!(c.line_of(0), 3);
        assert_eq!(c.line_of(1), 3);
        assert_eq!(c.line_of(2), 5);
    }

    #[test]
    fn test_constant_pool() {
        let mut c = chunk();
        let idx = c.add_constant(Value::Int(42)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(c.constants[0], Value::Int(42));
    }

    #[test]
    fn test_patch() {
        let mut c = chunk();
        c.write_op(OpCode::Jump, SecondaryFlags::empty(), 1);
        c.write_operand(0xFFFF);
        c.patch(1, 2);
        assert_eq!(c.code[1], 2);
    }
}
