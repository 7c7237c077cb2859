//! The translated output form: instructions that name their operands as
//! registers instead of implicit operand stack positions

use crate::link::LinkId;
use crate::state::VarType;
use crate::Error;

/// Register class, selected from the width and kind of the value it holds
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegClass {
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl RegClass {
    /// Register class appropriate for a slot type; `Nothing` has no class
    pub fn of(ty: VarType) -> Option<RegClass> {
        match ty {
            VarType::Nothing => None,
            VarType::Integer => Some(RegClass::Int),
            VarType::Long => Some(RegClass::Long),
            VarType::Float => Some(RegClass::Float),
            VarType::Double => Some(RegClass::Double),
            VarType::Object => Some(RegClass::Object),
        }
    }
}

/// An explicit register operand
///
/// Under the 1:1 translation scheme, locals keep their indices and stack
/// position `p` becomes register `max_locals + p`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Register {
    pub index: u16,
    pub class: RegClass,
}

/// A constant operand materialized into a register
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Null,
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

/// Three-way numeric comparison flavors (`lcmp`, `fcmpl`, ...)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CmpKind {
    Long,
    FloatL,
    FloatG,
    DoubleL,
    DoubleG,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// One register-form instruction
///
/// Branch targets are indices into the owning [`RegisterCode`], not byte
/// offsets into the original instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterInstruction {
    Nop,
    Const {
        to: Register,
        value: ConstValue,
    },
    Copy {
        to: Register,
        from: Register,
    },
    BinOp {
        op: BinOp,
        to: Register,
        lhs: Register,
        rhs: Register,
    },
    Neg {
        to: Register,
        from: Register,
    },
    /// In-place increment of a local register (`iinc`)
    Inc {
        local: Register,
        amount: i16,
    },
    /// Three-way comparison producing -1/0/1 in an int register
    Cmp {
        kind: CmpKind,
        to: Register,
        lhs: Register,
        rhs: Register,
    },
    GetStatic {
        to: Register,
        field: LinkId,
    },
    PutStatic {
        value: Register,
        field: LinkId,
    },
    GetField {
        to: Register,
        object: Register,
        field: LinkId,
    },
    PutField {
        object: Register,
        value: Register,
        field: LinkId,
    },
    Invoke {
        kind: InvokeKind,
        method: LinkId,
        /// Receiver first for instance invokes
        arguments: Vec<Register>,
        result: Option<Register>,
    },
    /// Parallel register permutation for the stack-shuffling opcodes
    /// (`dup_x1`, `dup2`, `swap`)
    ///
    /// Each pair is `(to, from)`. All sources are read before any
    /// destination is written, so a swap is two moves with no scratch
    /// register.
    Shuffle {
        moves: Vec<(Register, Register)>,
    },
    Jump {
        target: u32,
    },
    /// Conditional branch comparing one register against zero or null
    JumpIf {
        condition: Condition,
        value: Register,
        target: u32,
    },
    /// Conditional branch comparing two registers
    JumpCompare {
        condition: Condition,
        lhs: Register,
        rhs: Register,
        target: u32,
    },
    Return {
        value: Option<Register>,
    },
}

/// The immutable result of translating one method body
///
/// Instructions are in program order; the line table parallels them,
/// mapping each instruction to its source line (zero where the input had no
/// line information).
#[derive(Debug)]
pub struct RegisterCode {
    instructions: Vec<RegisterInstruction>,
    lines: Vec<u16>,
}

impl RegisterCode {
    /// Build the container, validating that every element is present
    ///
    /// The builder reserves a slot per source instruction up front; a hole
    /// remaining at construction time means translation missed one and the
    /// container refuses to exist rather than hand out malformed code.
    pub fn new(
        instructions: Vec<Option<RegisterInstruction>>,
        lines: Vec<u16>,
    ) -> Result<RegisterCode, Error> {
        let mut filled = Vec::with_capacity(instructions.len());
        for (index, instruction) in instructions.into_iter().enumerate() {
            match instruction {
                Some(instruction) => filled.push(instruction),
                None => return Err(Error::AbsentInstruction { index }),
            }
        }
        Ok(RegisterCode {
            instructions: filled,
            lines,
        })
    }

    pub fn get(&self, index: usize) -> Option<&RegisterInstruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<RegisterInstruction> {
        self.instructions.iter()
    }

    /// Defensive copy of the instruction-to-source-line table
    pub fn lines(&self) -> Vec<u16> {
        self.lines.clone()
    }
}

impl<'a> IntoIterator for &'a RegisterCode {
    type Item = &'a RegisterInstruction;
    type IntoIter = std::slice::Iter<'a, RegisterInstruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_instruction_rejected() {
        let err = RegisterCode::new(vec![Some(RegisterInstruction::Nop), None], vec![0, 0])
            .unwrap_err();
        assert_eq!(err.code(), "TR09");
        assert!(matches!(err, Error::AbsentInstruction { index: 1 }));
    }

    #[test]
    fn lines_are_copied_out() {
        let code = RegisterCode::new(vec![Some(RegisterInstruction::Nop)], vec![7]).unwrap();
        let mut lines = code.lines();
        lines[0] = 99;
        assert_eq!(code.lines(), vec![7]);
    }
}
