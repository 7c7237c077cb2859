use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::access_flags::MethodAccessFlags;
use crate::class_file::{
    CodeAttribute, Constant, ConstantIndex, ConstantPool, MemberParts, Method,
};
use crate::link::{LinkEntry, LinkId, LinkTable, MemberKind};
use crate::register::{
    ConstValue, InvokeKind, RegClass, Register, RegisterCode, RegisterInstruction,
};
use crate::state::{ProgramState, VarKind, VarType};
use crate::translate::bytecode::{decode_method, Instruction};
use crate::translate::settings::{MergePolicy, TranslationMethod, TranslatorSettings};
use crate::Error;

/// Element type of a field descriptor, or of one parameter slot in a method
/// descriptor
fn field_type(descriptor: &str) -> Result<VarType, Error> {
    let bad = || Error::BadDescriptor {
        descriptor: descriptor.to_owned(),
    };
    match descriptor.chars().next().ok_or_else(bad)? {
        'B' | 'C' | 'S' | 'Z' | 'I' => Ok(VarType::Integer),
        'J' => Ok(VarType::Long),
        'F' => Ok(VarType::Float),
        'D' => Ok(VarType::Double),
        'L' | '[' => Ok(VarType::Object),
        _ => Err(bad()),
    }
}

/// Split a method descriptor into its parameter types and return type
/// (`None` for `void`)
fn method_types(descriptor: &str) -> Result<(Vec<VarType>, Option<VarType>), Error> {
    let bad = || Error::BadDescriptor {
        descriptor: descriptor.to_owned(),
    };

    let mut chars = descriptor.chars();
    if chars.next() != Some('(') {
        return Err(bad());
    }

    let mut params = Vec::new();
    loop {
        let mut c = chars.next().ok_or_else(bad)?;
        if c == ')' {
            break;
        }
        // Array dimensions collapse into a single object value
        let is_array = c == '[';
        while c == '[' {
            c = chars.next().ok_or_else(bad)?;
        }
        let ty = match c {
            'B' | 'C' | 'S' | 'Z' | 'I' => VarType::Integer,
            'J' => VarType::Long,
            'F' => VarType::Float,
            'D' => VarType::Double,
            'L' => {
                // Consume through the terminating semicolon
                if !chars.by_ref().any(|c| c == ';') {
                    return Err(bad());
                }
                VarType::Object
            }
            _ => return Err(bad()),
        };
        params.push(if is_array { VarType::Object } else { ty });
    }

    let ret = match chars.next().ok_or_else(bad)? {
        'V' => None,
        'B' | 'C' | 'S' | 'Z' | 'I' => Some(VarType::Integer),
        'J' => Some(VarType::Long),
        'F' => Some(VarType::Float),
        'D' => Some(VarType::Double),
        'L' | '[' => Some(VarType::Object),
        _ => return Err(bad()),
    };
    Ok((params, ret))
}

/// The simulated operand stack during translation
///
/// Kept at slot granularity so that positions map directly onto stack
/// registers: a wide value occupies two slots, its own type followed by
/// `Nothing` for the high half.
struct Frame {
    slots: Vec<VarType>,
    limit: u16,
}

impl Frame {
    fn depth(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Push a value, returning the slot position it landed at
    fn push(&mut self, pc: u32, ty: VarType) -> Result<u16, Error> {
        let position = self.depth();
        if u32::from(position) + u32::from(ty.width()) > u32::from(self.limit) {
            return Err(Error::StackOverflow {
                pc,
                max_stack: self.limit,
            });
        }
        self.slots.push(ty);
        if ty.width() == 2 {
            self.slots.push(VarType::Nothing);
        }
        Ok(position)
    }

    /// Pop a value of a known type, returning the slot position it held
    fn pop_expect(&mut self, pc: u32, expected: VarType) -> Result<u16, Error> {
        if expected.width() == 2 {
            match self.slots.pop() {
                Some(VarType::Nothing) => {}
                Some(found) => return Err(Error::OperandTypeMismatch { pc, expected, found }),
                None => return Err(Error::StackUnderflow { pc }),
            }
        }
        match self.slots.pop() {
            Some(found) if found == expected => Ok(self.depth()),
            Some(found) => Err(Error::OperandTypeMismatch { pc, expected, found }),
            None => Err(Error::StackUnderflow { pc }),
        }
    }

    /// Pop a single-slot value of any type
    fn pop_cat1(&mut self, pc: u32) -> Result<(u16, VarType), Error> {
        match self.slots.pop() {
            Some(ty) if ty != VarType::Nothing && ty.width() == 1 => Ok((self.depth(), ty)),
            Some(found) => Err(Error::OperandTypeMismatch {
                pc,
                expected: VarType::Integer,
                found,
            }),
            None => Err(Error::StackUnderflow { pc }),
        }
    }

    /// Pop one raw slot regardless of what occupies it (`pop2` semantics)
    fn pop_slot(&mut self, pc: u32) -> Result<VarType, Error> {
        self.slots.pop().ok_or(Error::StackUnderflow { pc })
    }

    fn slot(&self, position: u16) -> Option<VarType> {
        self.slots.get(usize::from(position)).copied()
    }
}

/// Translator for one method body
///
/// Single use: [`MethodTranslator::translate`] consumes the translator, and
/// the [`ProgramState`] it drives enforces the same property dynamically.
pub struct MethodTranslator<'a> {
    pool: &'a ConstantPool,
    links: &'a mut LinkTable,
    owner: LinkId,
    method: &'a Method,
    code: &'a CodeAttribute,
    settings: TranslatorSettings,
    state: ProgramState,
}

impl<'a> MethodTranslator<'a> {
    pub fn new(
        pool: &'a ConstantPool,
        links: &'a mut LinkTable,
        owner: LinkId,
        method: &'a Method,
        settings: TranslatorSettings,
    ) -> Result<MethodTranslator<'a>, Error> {
        let code = method.code.as_ref().ok_or_else(|| Error::MissingCode {
            method: method.name.clone(),
        })?;
        Ok(MethodTranslator {
            pool,
            links,
            owner,
            method,
            code,
            settings,
            state: ProgramState::new(code.max_locals, code.max_stack),
        })
    }

    /// First register index of the operand stack bank
    fn stack_base(&self) -> u16 {
        match self.settings.method {
            TranslationMethod::Simple => self.code.max_locals,
        }
    }

    fn class_of(&self, pc: u32, ty: VarType) -> Result<RegClass, Error> {
        RegClass::of(ty).ok_or(Error::OperandTypeMismatch {
            pc,
            expected: VarType::Integer,
            found: ty,
        })
    }

    fn stack_register(&self, pc: u32, position: u16, ty: VarType) -> Result<Register, Error> {
        // max_locals + max_stack may exceed the register index space even
        // when both halves are individually in range
        let index = self.stack_base().checked_add(position).ok_or_else(|| {
            Error::RegisterOutOfRange {
                pc,
                index: u32::from(self.stack_base()) + u32::from(position),
            }
        })?;
        Ok(Register {
            index,
            class: self.class_of(pc, ty)?,
        })
    }

    fn local_register(&self, pc: u32, index: u16, ty: VarType) -> Result<Register, Error> {
        if u32::from(index) + u32::from(ty.width()) > u32::from(self.code.max_locals) {
            return Err(Error::BadLocalIndex { pc, index });
        }
        Ok(Register {
            index,
            class: self.class_of(pc, ty)?,
        })
    }

    /// Source line for a program counter, from the line number table
    fn line_for(&self, pc: u32) -> u16 {
        self.code
            .line_numbers
            .iter()
            .filter(|(start, _)| u32::from(*start) <= pc)
            .max_by_key(|(start, _)| *start)
            .map_or(0, |(_, line)| *line)
    }

    /// Record the type a store leaves in a local slot
    fn commit_local(&mut self, next_pc: u32, index: u16, ty: VarType) -> Result<(), Error> {
        let slot = self.state.slot_at(VarKind::Locals, next_pc, index)?;
        self.state.set_type(slot, ty)?;
        if ty.width() == 2 {
            let high = self.state.slot_at(VarKind::Locals, next_pc, index + 1)?;
            self.state.set_type(high, VarType::Nothing)?;
        }
        Ok(())
    }

    /// Record the type a push leaves in a stack slot
    fn commit_stack(&mut self, next_pc: u32, position: u16, ty: VarType) -> Result<(), Error> {
        let slot = self.state.slot_at(VarKind::Stack, next_pc, position)?;
        self.state.set_type(slot, ty)?;
        if ty.width() == 2 {
            let high = self.state.slot_at(VarKind::Stack, next_pc, position + 1)?;
            self.state.set_type(high, VarType::Nothing)?;
        }
        Ok(())
    }

    /// Commit the frame types this method starts with: receiver (if any)
    /// and declared parameters, at their local positions
    fn seed_entry_locals(&mut self) -> Result<Option<VarType>, Error> {
        let (params, ret) = method_types(&self.method.descriptor)?;
        let mut index: u16 = 0;
        if !self.method.access_flags.contains(MethodAccessFlags::STATIC) {
            self.commit_local(0, index, VarType::Object)?;
            index += 1;
        }
        for ty in params {
            self.commit_local(0, index, ty)?;
            index += ty.width();
        }
        Ok(ret)
    }

    fn check_merge(&self, target: u32, a: &[VarType], b: &[VarType]) -> Result<(), Error> {
        match self.settings.merge {
            MergePolicy::RequireIdentical => {
                if a != b {
                    return Err(Error::FrameMergeConflict { target });
                }
            }
        }
        Ok(())
    }

    /// Resolve a field reference, register it in the link table, and give
    /// back the value type its descriptor names
    fn link_field(&mut self, index: u16) -> Result<(LinkId, VarType), Error> {
        let parts = self.pool.field_ref(index)?;
        let ty = field_type(parts.descriptor)?;
        let id = self.links.link(LinkEntry::MemberRef {
            owner: self.owner,
            kind: MemberKind::Field,
            class: parts.class.clone(),
            name: parts.name.to_owned(),
            descriptor: parts.descriptor.to_owned(),
        })?;
        Ok((id, ty))
    }

    /// Resolve a method reference and register it in the link table
    fn link_method(
        &mut self,
        index: u16,
        kind: InvokeKind,
    ) -> Result<(LinkId, Vec<VarType>, Option<VarType>), Error> {
        let parts: MemberParts = self.pool.method_ref(index)?;
        let (params, ret) = method_types(parts.descriptor)?;
        let member_kind = if kind == InvokeKind::Interface || parts.is_interface {
            MemberKind::InterfaceMethod
        } else {
            MemberKind::Method
        };
        let id = self.links.link(LinkEntry::MemberRef {
            owner: self.owner,
            kind: member_kind,
            class: parts.class.clone(),
            name: parts.name.to_owned(),
            descriptor: parts.descriptor.to_owned(),
        })?;
        Ok((id, params, ret))
    }

    /// Translate the whole method body into register code
    ///
    /// Also hands back the finished [`ProgramState`], which holds the typing
    /// the simulation discovered at every program counter.
    pub fn translate(mut self) -> Result<(RegisterCode, ProgramState), Error> {
        let decoded = decode_method(&self.code.code)?;
        let index_of: HashMap<u32, usize> = decoded
            .iter()
            .enumerate()
            .map(|(i, (pc, _))| (*pc, i))
            .collect();

        let ret_type = self.seed_entry_locals()?;

        let mut out: Vec<Option<RegisterInstruction>> = vec![None; decoded.len()];
        let mut lines: Vec<u16> = Vec::with_capacity(decoded.len());

        let mut frame = Frame {
            slots: Vec::new(),
            limit: self.code.max_stack,
        };
        // Entry frames of visited program counters, for back edge checks
        let mut entry_frames: HashMap<u32, Vec<VarType>> = HashMap::new();
        // Frames registered by forward branches not yet reached
        let mut pending: HashMap<u32, Vec<VarType>> = HashMap::new();
        let mut reachable = true;

        for (i, (pc, insn)) in decoded.iter().enumerate() {
            let pc = *pc;
            let next_pc = decoded
                .get(i + 1)
                .map_or(self.code.code.len() as u32, |(next, _)| *next);

            // Reconcile the fall-through frame with any frame a branch
            // already registered for this program counter
            match pending.remove(&pc) {
                Some(incoming) if reachable => {
                    self.check_merge(pc, &incoming, &frame.slots)?;
                }
                Some(incoming) => {
                    frame.slots = incoming;
                    reachable = true;
                }
                None if !reachable => {
                    // Only reachable by an edge not seen yet (or dead
                    // code); it starts from an empty stack
                    frame.slots.clear();
                    reachable = true;
                }
                None => {}
            }
            entry_frames.insert(pc, frame.slots.clone());
            self.state.set_stack_top(pc, frame.depth())?;

            // Register the frame flowing across a branch edge; operand
            // pops happen before this runs
            macro_rules! flow_to {
                ($target:expr) => {{
                    let target: u32 = $target;
                    let target_index = *index_of
                        .get(&target)
                        .ok_or(Error::BadBranchTarget { pc, target })?
                        as u32;
                    if let Some(existing) = entry_frames.get(&target) {
                        self.check_merge(target, existing, &frame.slots)?;
                    } else {
                        match pending.entry(target) {
                            Entry::Occupied(entry) => {
                                self.check_merge(target, entry.get(), &frame.slots)?;
                            }
                            Entry::Vacant(entry) => {
                                entry.insert(frame.slots.clone());
                            }
                        }
                    }
                    target_index
                }};
            }

            let mut terminal = false;
            let translated = match insn {
                Instruction::Nop => RegisterInstruction::Nop,

                Instruction::AConstNull => {
                    let position = frame.push(pc, VarType::Object)?;
                    self.commit_stack(next_pc, position, VarType::Object)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, VarType::Object)?,
                        value: ConstValue::Null,
                    }
                }
                Instruction::IConst(value) => {
                    let position = frame.push(pc, VarType::Integer)?;
                    self.commit_stack(next_pc, position, VarType::Integer)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, VarType::Integer)?,
                        value: ConstValue::Integer(*value),
                    }
                }
                Instruction::LConst(value) => {
                    let position = frame.push(pc, VarType::Long)?;
                    self.commit_stack(next_pc, position, VarType::Long)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, VarType::Long)?,
                        value: ConstValue::Long(*value),
                    }
                }
                Instruction::FConst(value) => {
                    let position = frame.push(pc, VarType::Float)?;
                    self.commit_stack(next_pc, position, VarType::Float)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, VarType::Float)?,
                        value: ConstValue::Float(*value),
                    }
                }
                Instruction::DConst(value) => {
                    let position = frame.push(pc, VarType::Double)?;
                    self.commit_stack(next_pc, position, VarType::Double)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, VarType::Double)?,
                        value: ConstValue::Double(*value),
                    }
                }
                Instruction::Ldc(index) => {
                    let (value, ty) = match self.pool.get(ConstantIndex(*index))? {
                        Constant::Integer(v) => (ConstValue::Integer(*v), VarType::Integer),
                        Constant::Float(v) => (ConstValue::Float(*v), VarType::Float),
                        Constant::String(utf8) => (
                            ConstValue::String(self.pool.utf8(*utf8)?.to_owned()),
                            VarType::Object,
                        ),
                        _ => {
                            return Err(Error::WrongConstantType {
                                index: *index,
                                expected: "Integer, Float or String",
                            })
                        }
                    };
                    let position = frame.push(pc, ty)?;
                    self.commit_stack(next_pc, position, ty)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, ty)?,
                        value,
                    }
                }
                Instruction::Ldc2(index) => {
                    let (value, ty) = match self.pool.get(ConstantIndex(*index))? {
                        Constant::Long(v) => (ConstValue::Long(*v), VarType::Long),
                        Constant::Double(v) => (ConstValue::Double(*v), VarType::Double),
                        _ => {
                            return Err(Error::WrongConstantType {
                                index: *index,
                                expected: "Long or Double",
                            })
                        }
                    };
                    let position = frame.push(pc, ty)?;
                    self.commit_stack(next_pc, position, ty)?;
                    RegisterInstruction::Const {
                        to: self.stack_register(pc, position, ty)?,
                        value,
                    }
                }

                Instruction::Load { ty, index } => {
                    let from = self.local_register(pc, *index, *ty)?;
                    let position = frame.push(pc, *ty)?;
                    self.commit_stack(next_pc, position, *ty)?;
                    RegisterInstruction::Copy {
                        to: self.stack_register(pc, position, *ty)?,
                        from,
                    }
                }
                Instruction::Store { ty, index } => {
                    let to = self.local_register(pc, *index, *ty)?;
                    let position = frame.pop_expect(pc, *ty)?;
                    self.commit_local(next_pc, *index, *ty)?;
                    RegisterInstruction::Copy {
                        to,
                        from: self.stack_register(pc, position, *ty)?,
                    }
                }

                Instruction::Pop => {
                    frame.pop_cat1(pc)?;
                    RegisterInstruction::Nop
                }
                Instruction::Pop2 => {
                    frame.pop_slot(pc)?;
                    frame.pop_slot(pc)?;
                    RegisterInstruction::Nop
                }
                Instruction::Dup => {
                    let depth = frame.depth();
                    let ty = match depth.checked_sub(1).and_then(|p| frame.slot(p)) {
                        Some(ty) if ty != VarType::Nothing && ty.width() == 1 => ty,
                        Some(found) => {
                            return Err(Error::OperandTypeMismatch {
                                pc,
                                expected: VarType::Integer,
                                found,
                            })
                        }
                        None => return Err(Error::StackUnderflow { pc }),
                    };
                    let position = frame.push(pc, ty)?;
                    self.commit_stack(next_pc, position, ty)?;
                    RegisterInstruction::Copy {
                        to: self.stack_register(pc, position, ty)?,
                        from: self.stack_register(pc, position - 1, ty)?,
                    }
                }
                Instruction::DupX1 => {
                    // ..., b, a  ->  ..., a, b, a
                    let (_, a) = frame.pop_cat1(pc)?;
                    let (base, b) = frame.pop_cat1(pc)?;
                    frame.push(pc, a)?;
                    frame.push(pc, b)?;
                    frame.push(pc, a)?;
                    self.commit_stack(next_pc, base, a)?;
                    self.commit_stack(next_pc, base + 1, b)?;
                    self.commit_stack(next_pc, base + 2, a)?;
                    RegisterInstruction::Shuffle {
                        moves: vec![
                            (
                                self.stack_register(pc, base + 2, a)?,
                                self.stack_register(pc, base + 1, a)?,
                            ),
                            (
                                self.stack_register(pc, base + 1, b)?,
                                self.stack_register(pc, base, b)?,
                            ),
                            (
                                self.stack_register(pc, base, a)?,
                                self.stack_register(pc, base + 1, a)?,
                            ),
                        ],
                    }
                }
                Instruction::Dup2 => {
                    let depth = frame.depth();
                    if depth < 2 {
                        return Err(Error::StackUnderflow { pc });
                    }
                    let lower = frame.slot(depth - 2).ok_or(Error::StackUnderflow { pc })?;
                    if lower.width() == 2 {
                        // One wide value: a single register copy covers it
                        let position = frame.push(pc, lower)?;
                        self.commit_stack(next_pc, position, lower)?;
                        RegisterInstruction::Copy {
                            to: self.stack_register(pc, position, lower)?,
                            from: self.stack_register(pc, position - 2, lower)?,
                        }
                    } else {
                        let upper = frame.slot(depth - 1).ok_or(Error::StackUnderflow { pc })?;
                        if upper == VarType::Nothing || upper.width() == 2 {
                            return Err(Error::OperandTypeMismatch {
                                pc,
                                expected: VarType::Integer,
                                found: upper,
                            });
                        }
                        frame.push(pc, lower)?;
                        frame.push(pc, upper)?;
                        self.commit_stack(next_pc, depth, lower)?;
                        self.commit_stack(next_pc, depth + 1, upper)?;
                        RegisterInstruction::Shuffle {
                            moves: vec![
                                (
                                    self.stack_register(pc, depth, lower)?,
                                    self.stack_register(pc, depth - 2, lower)?,
                                ),
                                (
                                    self.stack_register(pc, depth + 1, upper)?,
                                    self.stack_register(pc, depth - 1, upper)?,
                                ),
                            ],
                        }
                    }
                }
                Instruction::Swap => {
                    // ..., b, a  ->  ..., a, b
                    let (_, a) = frame.pop_cat1(pc)?;
                    let (base, b) = frame.pop_cat1(pc)?;
                    frame.push(pc, a)?;
                    frame.push(pc, b)?;
                    self.commit_stack(next_pc, base, a)?;
                    self.commit_stack(next_pc, base + 1, b)?;
                    RegisterInstruction::Shuffle {
                        moves: vec![
                            (
                                self.stack_register(pc, base, a)?,
                                self.stack_register(pc, base + 1, a)?,
                            ),
                            (
                                self.stack_register(pc, base + 1, b)?,
                                self.stack_register(pc, base, b)?,
                            ),
                        ],
                    }
                }

                Instruction::Arith { op, ty } => {
                    use crate::register::BinOp;
                    // Shift distances are ints even for long shifts
                    let rhs_ty = match op {
                        BinOp::Shl | BinOp::Shr | BinOp::Ushr => VarType::Integer,
                        _ => *ty,
                    };
                    let rhs_pos = frame.pop_expect(pc, rhs_ty)?;
                    let lhs_pos = frame.pop_expect(pc, *ty)?;
                    let rhs = self.stack_register(pc, rhs_pos, rhs_ty)?;
                    let lhs = self.stack_register(pc, lhs_pos, *ty)?;
                    let position = frame.push(pc, *ty)?;
                    self.commit_stack(next_pc, position, *ty)?;
                    RegisterInstruction::BinOp {
                        op: *op,
                        to: self.stack_register(pc, position, *ty)?,
                        lhs,
                        rhs,
                    }
                }
                Instruction::Neg { ty } => {
                    let position = frame.pop_expect(pc, *ty)?;
                    let from = self.stack_register(pc, position, *ty)?;
                    frame.push(pc, *ty)?;
                    self.commit_stack(next_pc, position, *ty)?;
                    RegisterInstruction::Neg {
                        to: self.stack_register(pc, position, *ty)?,
                        from,
                    }
                }
                Instruction::IInc { index, amount } => {
                    let local = self.local_register(pc, *index, VarType::Integer)?;
                    self.commit_local(next_pc, *index, VarType::Integer)?;
                    RegisterInstruction::Inc {
                        local,
                        amount: *amount,
                    }
                }

                Instruction::Cmp(kind) => {
                    use crate::register::CmpKind;
                    let ty = match kind {
                        CmpKind::Long => VarType::Long,
                        CmpKind::FloatL | CmpKind::FloatG => VarType::Float,
                        CmpKind::DoubleL | CmpKind::DoubleG => VarType::Double,
                    };
                    let rhs_pos = frame.pop_expect(pc, ty)?;
                    let lhs_pos = frame.pop_expect(pc, ty)?;
                    let rhs = self.stack_register(pc, rhs_pos, ty)?;
                    let lhs = self.stack_register(pc, lhs_pos, ty)?;
                    let position = frame.push(pc, VarType::Integer)?;
                    self.commit_stack(next_pc, position, VarType::Integer)?;
                    RegisterInstruction::Cmp {
                        kind: *kind,
                        to: self.stack_register(pc, position, VarType::Integer)?,
                        lhs,
                        rhs,
                    }
                }

                Instruction::If { condition, target } => {
                    let position = frame.pop_expect(pc, VarType::Integer)?;
                    let value = self.stack_register(pc, position, VarType::Integer)?;
                    let target = flow_to!(*target);
                    RegisterInstruction::JumpIf {
                        condition: *condition,
                        value,
                        target,
                    }
                }
                Instruction::IfICmp { condition, target } => {
                    let rhs_pos = frame.pop_expect(pc, VarType::Integer)?;
                    let lhs_pos = frame.pop_expect(pc, VarType::Integer)?;
                    let rhs = self.stack_register(pc, rhs_pos, VarType::Integer)?;
                    let lhs = self.stack_register(pc, lhs_pos, VarType::Integer)?;
                    let target = flow_to!(*target);
                    RegisterInstruction::JumpCompare {
                        condition: *condition,
                        lhs,
                        rhs,
                        target,
                    }
                }
                Instruction::IfACmp { equal, target } => {
                    use crate::register::Condition;
                    let rhs_pos = frame.pop_expect(pc, VarType::Object)?;
                    let lhs_pos = frame.pop_expect(pc, VarType::Object)?;
                    let rhs = self.stack_register(pc, rhs_pos, VarType::Object)?;
                    let lhs = self.stack_register(pc, lhs_pos, VarType::Object)?;
                    let target = flow_to!(*target);
                    RegisterInstruction::JumpCompare {
                        condition: if *equal { Condition::Eq } else { Condition::Ne },
                        lhs,
                        rhs,
                        target,
                    }
                }
                Instruction::IfNull { is_null, target } => {
                    use crate::register::Condition;
                    let position = frame.pop_expect(pc, VarType::Object)?;
                    let value = self.stack_register(pc, position, VarType::Object)?;
                    let target = flow_to!(*target);
                    RegisterInstruction::JumpIf {
                        condition: if *is_null { Condition::Eq } else { Condition::Ne },
                        value,
                        target,
                    }
                }
                Instruction::Goto { target } => {
                    let target = flow_to!(*target);
                    terminal = true;
                    RegisterInstruction::Jump { target }
                }

                Instruction::Return { ty } => {
                    let value = match (ty, ret_type) {
                        (None, None) => None,
                        (Some(ty), Some(ret)) if *ty == ret => {
                            let position = frame.pop_expect(pc, *ty)?;
                            Some(self.stack_register(pc, position, *ty)?)
                        }
                        (found, expected) => {
                            return Err(Error::OperandTypeMismatch {
                                pc,
                                expected: expected.unwrap_or(VarType::Nothing),
                                found: (*found).unwrap_or(VarType::Nothing),
                            })
                        }
                    };
                    terminal = true;
                    RegisterInstruction::Return { value }
                }

                Instruction::GetStatic(index) => {
                    let (field, ty) = self.link_field(*index)?;
                    let position = frame.push(pc, ty)?;
                    self.commit_stack(next_pc, position, ty)?;
                    RegisterInstruction::GetStatic {
                        to: self.stack_register(pc, position, ty)?,
                        field,
                    }
                }
                Instruction::PutStatic(index) => {
                    let (field, ty) = self.link_field(*index)?;
                    let position = frame.pop_expect(pc, ty)?;
                    RegisterInstruction::PutStatic {
                        value: self.stack_register(pc, position, ty)?,
                        field,
                    }
                }
                Instruction::GetField(index) => {
                    let (field, ty) = self.link_field(*index)?;
                    let object_pos = frame.pop_expect(pc, VarType::Object)?;
                    let object = self.stack_register(pc, object_pos, VarType::Object)?;
                    let position = frame.push(pc, ty)?;
                    self.commit_stack(next_pc, position, ty)?;
                    RegisterInstruction::GetField {
                        to: self.stack_register(pc, position, ty)?,
                        object,
                        field,
                    }
                }
                Instruction::PutField(index) => {
                    let (field, ty) = self.link_field(*index)?;
                    let value_pos = frame.pop_expect(pc, ty)?;
                    let value = self.stack_register(pc, value_pos, ty)?;
                    let object_pos = frame.pop_expect(pc, VarType::Object)?;
                    let object = self.stack_register(pc, object_pos, VarType::Object)?;
                    RegisterInstruction::PutField {
                        object,
                        value,
                        field,
                    }
                }

                Instruction::Invoke { kind, index } => {
                    let (method, params, ret) = self.link_method(*index, *kind)?;
                    let has_receiver = *kind != InvokeKind::Static;

                    // Slot count totalled in u32: descriptors are not bounded
                    // by the stack limit
                    let arg_slots: u32 = params.iter().map(|p| u32::from(p.width())).sum::<u32>()
                        + u32::from(has_receiver);
                    let base = u32::from(frame.depth())
                        .checked_sub(arg_slots)
                        .ok_or(Error::StackUnderflow { pc })? as u16;

                    // Argument registers at their pre-call stack positions,
                    // receiver first
                    let mut arguments = Vec::with_capacity(params.len() + 1);
                    let mut position = base;
                    if has_receiver {
                        arguments.push(self.stack_register(pc, position, VarType::Object)?);
                        position += 1;
                    }
                    for ty in &params {
                        arguments.push(self.stack_register(pc, position, *ty)?);
                        position += ty.width();
                    }

                    // Consume them, type checking from the top down
                    for ty in params.iter().rev() {
                        frame.pop_expect(pc, *ty)?;
                    }
                    if has_receiver {
                        frame.pop_expect(pc, VarType::Object)?;
                    }

                    let result = match ret {
                        Some(ty) => {
                            let position = frame.push(pc, ty)?;
                            self.commit_stack(next_pc, position, ty)?;
                            Some(self.stack_register(pc, position, ty)?)
                        }
                        None => None,
                    };
                    RegisterInstruction::Invoke {
                        kind: *kind,
                        method,
                        arguments,
                        result,
                    }
                }
            };

            out[i] = Some(translated);
            lines.push(self.line_for(pc));

            if terminal {
                reachable = false;
            } else {
                self.state.set_stack_top(next_pc, frame.depth())?;
            }
        }

        self.state.finish()?;
        log::trace!(
            "translated {}{}: {} instructions",
            self.method.name,
            self.method.descriptor,
            decoded.len()
        );
        let code = RegisterCode::new(out, lines)?;
        Ok((code, self.state))
    }
}
