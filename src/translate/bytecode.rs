//! Decoding the stack-form instruction stream
//!
//! Only the Java ME subset this translator understands is decoded; any other
//! opcode aborts the pass rather than being skipped, so unsupported input can
//! never turn into silently wrong register code.

use crate::register::{BinOp, CmpKind, Condition, InvokeKind};
use crate::state::VarType;
use crate::Error;

/// One decoded stack-form instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32),
    LConst(i64),
    FConst(f32),
    DConst(f64),
    /// `ldc`/`ldc_w`: single-slot constant pool load
    Ldc(u16),
    /// `ldc2_w`: two-slot (long/double) constant pool load
    Ldc2(u16),
    Load {
        ty: VarType,
        index: u16,
    },
    Store {
        ty: VarType,
        index: u16,
    },
    Pop,
    Pop2,
    Dup,
    DupX1,
    Dup2,
    Swap,
    Arith {
        op: BinOp,
        ty: VarType,
    },
    Neg {
        ty: VarType,
    },
    IInc {
        index: u16,
        amount: i16,
    },
    Cmp(CmpKind),
    /// Compare an int against zero
    If {
        condition: Condition,
        target: u32,
    },
    IfICmp {
        condition: Condition,
        target: u32,
    },
    IfACmp {
        equal: bool,
        target: u32,
    },
    IfNull {
        is_null: bool,
        target: u32,
    },
    Goto {
        target: u32,
    },
    Return {
        ty: Option<VarType>,
    },
    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    Invoke {
        kind: InvokeKind,
        index: u16,
    },
}

struct CodeCursor<'a> {
    code: &'a [u8],
    pc: usize,
    /// Start of the instruction currently being decoded, for diagnostics
    insn_pc: u32,
}

impl<'a> CodeCursor<'a> {
    fn truncated(&self) -> Error {
        Error::TruncatedInstruction { pc: self.insn_pc }
    }

    fn u8(&mut self) -> Result<u8, Error> {
        let byte = *self.code.get(self.pc).ok_or_else(|| self.truncated())?;
        self.pc += 1;
        Ok(byte)
    }

    fn i8(&mut self) -> Result<i8, Error> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let hi = self.u8()?;
        let lo = self.u8()?;
        Ok((u16::from(hi) << 8) | u16::from(lo))
    }

    fn i16(&mut self) -> Result<i16, Error> {
        Ok(self.u16()? as i16)
    }

    /// Branch offset relative to the current instruction's PC
    fn target(&mut self) -> Result<u32, Error> {
        let offset = self.i16()?;
        let target = i64::from(self.insn_pc) + i64::from(offset);
        u32::try_from(target).map_err(|_| Error::BadBranchTarget {
            pc: self.insn_pc,
            target: offset as u32,
        })
    }
}

/// Decode a whole method body into `(pc, instruction)` pairs
pub fn decode_method(code: &[u8]) -> Result<Vec<(u32, Instruction)>, Error> {
    let mut cursor = CodeCursor {
        code,
        pc: 0,
        insn_pc: 0,
    };
    let mut decoded = Vec::new();
    while cursor.pc < code.len() {
        cursor.insn_pc = cursor.pc as u32;
        let instruction = decode_one(&mut cursor)?;
        decoded.push((cursor.insn_pc, instruction));
    }
    Ok(decoded)
}

fn decode_one(c: &mut CodeCursor) -> Result<Instruction, Error> {
    use Instruction::*;

    let opcode = c.u8()?;
    let insn = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02..=0x08 => IConst(i32::from(opcode) - 3),
        0x09 | 0x0a => LConst(i64::from(opcode) - 0x09),
        0x0b..=0x0d => FConst(f32::from(opcode - 0x0b)),
        0x0e | 0x0f => DConst(f64::from(opcode - 0x0e)),
        0x10 => IConst(i32::from(c.i8()?)),
        0x11 => IConst(i32::from(c.i16()?)),
        0x12 => Ldc(u16::from(c.u8()?)),
        0x13 => Ldc(c.u16()?),
        0x14 => Ldc2(c.u16()?),

        0x15 => Load { ty: VarType::Integer, index: u16::from(c.u8()?) },
        0x16 => Load { ty: VarType::Long, index: u16::from(c.u8()?) },
        0x17 => Load { ty: VarType::Float, index: u16::from(c.u8()?) },
        0x18 => Load { ty: VarType::Double, index: u16::from(c.u8()?) },
        0x19 => Load { ty: VarType::Object, index: u16::from(c.u8()?) },
        0x1a..=0x1d => Load { ty: VarType::Integer, index: u16::from(opcode - 0x1a) },
        0x1e..=0x21 => Load { ty: VarType::Long, index: u16::from(opcode - 0x1e) },
        0x22..=0x25 => Load { ty: VarType::Float, index: u16::from(opcode - 0x22) },
        0x26..=0x29 => Load { ty: VarType::Double, index: u16::from(opcode - 0x26) },
        0x2a..=0x2d => Load { ty: VarType::Object, index: u16::from(opcode - 0x2a) },

        0x36 => Store { ty: VarType::Integer, index: u16::from(c.u8()?) },
        0x37 => Store { ty: VarType::Long, index: u16::from(c.u8()?) },
        0x38 => Store { ty: VarType::Float, index: u16::from(c.u8()?) },
        0x39 => Store { ty: VarType::Double, index: u16::from(c.u8()?) },
        0x3a => Store { ty: VarType::Object, index: u16::from(c.u8()?) },
        0x3b..=0x3e => Store { ty: VarType::Integer, index: u16::from(opcode - 0x3b) },
        0x3f..=0x42 => Store { ty: VarType::Long, index: u16::from(opcode - 0x3f) },
        0x43..=0x46 => Store { ty: VarType::Float, index: u16::from(opcode - 0x43) },
        0x47..=0x4a => Store { ty: VarType::Double, index: u16::from(opcode - 0x47) },
        0x4b..=0x4e => Store { ty: VarType::Object, index: u16::from(opcode - 0x4b) },

        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5c => Dup2,
        0x5f => Swap,

        0x60..=0x63 => arith(BinOp::Add, opcode - 0x60),
        0x64..=0x67 => arith(BinOp::Sub, opcode - 0x64),
        0x68..=0x6b => arith(BinOp::Mul, opcode - 0x68),
        0x6c..=0x6f => arith(BinOp::Div, opcode - 0x6c),
        0x70..=0x73 => arith(BinOp::Rem, opcode - 0x70),
        0x74 => Neg { ty: VarType::Integer },
        0x75 => Neg { ty: VarType::Long },
        0x76 => Neg { ty: VarType::Float },
        0x77 => Neg { ty: VarType::Double },
        0x78 => arith(BinOp::Shl, 0),
        0x79 => arith(BinOp::Shl, 1),
        0x7a => arith(BinOp::Shr, 0),
        0x7b => arith(BinOp::Shr, 1),
        0x7c => arith(BinOp::Ushr, 0),
        0x7d => arith(BinOp::Ushr, 1),
        0x7e => arith(BinOp::And, 0),
        0x7f => arith(BinOp::And, 1),
        0x80 => arith(BinOp::Or, 0),
        0x81 => arith(BinOp::Or, 1),
        0x82 => arith(BinOp::Xor, 0),
        0x83 => arith(BinOp::Xor, 1),
        0x84 => IInc {
            index: u16::from(c.u8()?),
            amount: i16::from(c.i8()?),
        },

        0x94 => Cmp(CmpKind::Long),
        0x95 => Cmp(CmpKind::FloatL),
        0x96 => Cmp(CmpKind::FloatG),
        0x97 => Cmp(CmpKind::DoubleL),
        0x98 => Cmp(CmpKind::DoubleG),

        0x99..=0x9e => If {
            condition: condition(opcode - 0x99),
            target: c.target()?,
        },
        0x9f..=0xa4 => IfICmp {
            condition: condition(opcode - 0x9f),
            target: c.target()?,
        },
        0xa5 | 0xa6 => IfACmp {
            equal: opcode == 0xa5,
            target: c.target()?,
        },
        0xa7 => Goto { target: c.target()? },

        0xac => Return { ty: Some(VarType::Integer) },
        0xad => Return { ty: Some(VarType::Long) },
        0xae => Return { ty: Some(VarType::Float) },
        0xaf => Return { ty: Some(VarType::Double) },
        0xb0 => Return { ty: Some(VarType::Object) },
        0xb1 => Return { ty: None },

        0xb2 => GetStatic(c.u16()?),
        0xb3 => PutStatic(c.u16()?),
        0xb4 => GetField(c.u16()?),
        0xb5 => PutField(c.u16()?),

        0xb6 => Invoke { kind: InvokeKind::Virtual, index: c.u16()? },
        0xb7 => Invoke { kind: InvokeKind::Special, index: c.u16()? },
        0xb8 => Invoke { kind: InvokeKind::Static, index: c.u16()? },
        0xb9 => {
            let index = c.u16()?;
            // Historical count and zero bytes carry no information
            c.u8()?;
            c.u8()?;
            Invoke {
                kind: InvokeKind::Interface,
                index,
            }
        }

        0xc6 => IfNull { is_null: true, target: c.target()? },
        0xc7 => IfNull { is_null: false, target: c.target()? },

        _ => {
            return Err(Error::UnsupportedOpcode {
                opcode,
                pc: c.insn_pc,
            })
        }
    };
    Ok(insn)
}

/// Typed arithmetic at a `i/l/f/d` opcode family offset
fn arith(op: BinOp, family: u8) -> Instruction {
    let ty = match family {
        0 => VarType::Integer,
        1 => VarType::Long,
        2 => VarType::Float,
        _ => VarType::Double,
    };
    Instruction::Arith { op, ty }
}

fn condition(offset: u8) -> Condition {
    match offset {
        0 => Condition::Eq,
        1 => Condition::Ne,
        2 => Condition::Lt,
        3 => Condition::Ge,
        4 => Condition::Gt,
        _ => Condition::Le,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_sequence() {
        // iconst_2, iconst_3, iadd, istore_1, return
        let decoded = decode_method(&[0x05, 0x06, 0x60, 0x3c, 0xb1]).unwrap();
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::IConst(2)),
                (1, Instruction::IConst(3)),
                (2, Instruction::Arith { op: BinOp::Add, ty: VarType::Integer }),
                (3, Instruction::Store { ty: VarType::Integer, index: 1 }),
                (4, Instruction::Return { ty: None }),
            ]
        );
    }

    #[test]
    fn branch_offsets_are_relative_to_the_branch() {
        // 0: iload_0, 1: ifeq +5 -> pc 6, 4: nop, 5: nop, 6: return
        let decoded = decode_method(&[0x1a, 0x99, 0x00, 0x05, 0x00, 0x00, 0xb1]).unwrap();
        assert_eq!(
            decoded[1],
            (1, Instruction::If { condition: Condition::Eq, target: 6 })
        );
    }

    #[test]
    fn unsupported_opcode_fails_loudly() {
        // 0xba is invokedynamic
        let err = decode_method(&[0x00, 0xba, 0x00, 0x01, 0x00, 0x00]).unwrap_err();
        assert_eq!(err.code(), "TR01");
        assert!(matches!(err, Error::UnsupportedOpcode { opcode: 0xba, pc: 1 }));
    }

    #[test]
    fn truncated_operands_rejected() {
        let err = decode_method(&[0x10]).unwrap_err();
        assert_eq!(err.code(), "TR02");
    }

    #[test]
    fn wide_and_short_load_forms_agree() {
        let wide = decode_method(&[0x15, 0x02]).unwrap();
        let short = decode_method(&[0x1c]).unwrap();
        assert_eq!(wide[0].1, short[0].1);
    }
}
