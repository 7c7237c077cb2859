//! Per-program-point type state for a single method body
//!
//! The translator walks the instruction stream and records, for every program
//! counter it touches, the inferred type of every local variable slot and
//! operand stack slot. State is kept sparse: only visited program counters
//! materialize an [`Atom`], and within an atom only slots whose type was
//! committed occupy storage. A slot with no committed type resolves its type
//! by walking backwards through earlier atoms at the same position.

use crate::Error;

/// Inferred type of the value occupying a slot
///
/// `Nothing` is the absence of a value: slots above the stack top, locals
/// never written, and the high half of a wide value all read as `Nothing`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VarType {
    Nothing,
    Integer,
    Long,
    Float,
    Double,
    Object,
}

impl VarType {
    /// Number of consecutive slots a value of this type occupies
    pub fn width(self) -> u16 {
        match self {
            VarType::Long | VarType::Double => 2,
            _ => 1,
        }
    }
}

/// Which of an atom's two collections a slot lives in
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VarKind {
    Locals,
    Stack,
}

/// Unique 64-bit slot identifier
///
/// An opaque key naming a slot without holding a reference into the state,
/// so unrelated call sites can resolve the same slot without re-deriving the
/// atom/collection chain. Bit layout:
///
/// ```text
/// bit  63     : 1 if the slot is a stack slot, 0 for a local
/// bits 62..32 : program counter (31 bits)
/// bits 31..0  : slot position
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlotId(u64);

/// Largest program counter representable in a [`SlotId`]
pub const MAX_PC: u32 = 0x7FFF_FFFF;

impl SlotId {
    const STACK_BIT: u64 = 0x8000_0000_0000_0000;

    /// Pack a (kind, pc, position) triple into an identifier
    pub fn new(kind: VarKind, pc: u32, position: u16) -> Result<SlotId, Error> {
        if pc > MAX_PC {
            return Err(Error::PcOutOfRange(pc));
        }
        let stack = match kind {
            VarKind::Stack => SlotId::STACK_BIT,
            VarKind::Locals => 0,
        };
        Ok(SlotId(stack | (u64::from(pc) << 32) | u64::from(position)))
    }

    pub fn kind(self) -> VarKind {
        if self.0 & SlotId::STACK_BIT != 0 {
            VarKind::Stack
        } else {
            VarKind::Locals
        }
    }

    pub fn pc(self) -> u32 {
        ((self.0 >> 32) & 0x7FFF_FFFF) as u32
    }

    pub fn position(self) -> u16 {
        (self.0 & 0xFFFF_FFFF) as u16
    }
}

/// A committed ("logical") slot: position plus the type written there
#[derive(Copy, Clone, Debug)]
struct LogicalSlot {
    position: u16,
    ty: VarType,
}

/// The locals or stack slot collection of one atom
///
/// Slots come in two tiers. A slot that has had a type committed is
/// *logical*: it occupies an entry in the position-ordered `committed` log
/// and never goes away. Every other addressable slot is *virtual*: it is
/// represented only by its [`SlotId`] handle and holds no storage at all, so
/// dropping the handle reclaims it. Whether a virtual slot is cached or not
/// never changes what `type_of` resolves.
#[derive(Debug)]
pub struct Variables {
    kind: VarKind,
    limit: u16,
    committed: Vec<LogicalSlot>,
    stack_top: u16,
}

impl Variables {
    fn new(kind: VarKind, limit: u16) -> Variables {
        Variables {
            kind,
            limit,
            committed: Vec::new(),
            stack_top: 0,
        }
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// Declared capacity (the method's max locals or max stack)
    pub fn limit(&self) -> u16 {
        self.limit
    }

    /// Number of live operand stack positions at this atom
    pub fn stack_top(&self) -> Result<u16, Error> {
        if self.kind != VarKind::Stack {
            return Err(Error::NotStackVariables);
        }
        Ok(self.stack_top)
    }

    /// Adjust how many stack positions are considered live
    pub fn set_stack_top(&mut self, top: u16) -> Result<(), Error> {
        if self.kind != VarKind::Stack {
            return Err(Error::NotStackVariables);
        }
        if top > self.limit {
            return Err(Error::StackTopOutOfRange {
                top,
                limit: self.limit,
            });
        }
        self.stack_top = top;
        Ok(())
    }

    /// Type committed directly at this position, if any
    fn committed_at(&self, position: u16) -> Option<VarType> {
        self.committed
            .binary_search_by_key(&position, |s| s.position)
            .ok()
            .map(|i| self.committed[i].ty)
    }

    /// Promote the slot at `position` to logical and record its type
    ///
    /// Idempotent for an equal type; a different type overwrites (straight
    /// line reassignment, not a control flow merge).
    fn commit(&mut self, position: u16, ty: VarType) {
        match self
            .committed
            .binary_search_by_key(&position, |s| s.position)
        {
            Ok(i) => self.committed[i].ty = ty,
            Err(i) => self.committed.insert(i, LogicalSlot { position, ty }),
        }
    }
}

/// Snapshot of locals and stack typing at one program counter
#[derive(Debug)]
pub struct Atom {
    pc: u32,
    locals: Variables,
    stack: Variables,
}

impl Atom {
    fn new(pc: u32, max_locals: u16, max_stack: u16) -> Atom {
        Atom {
            pc,
            locals: Variables::new(VarKind::Locals, max_locals),
            stack: Variables::new(VarKind::Stack, max_stack),
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn locals(&self) -> &Variables {
        &self.locals
    }

    pub fn stack(&self) -> &Variables {
        &self.stack
    }

    fn variables(&self, kind: VarKind) -> &Variables {
        match kind {
            VarKind::Locals => &self.locals,
            VarKind::Stack => &self.stack,
        }
    }

    fn variables_mut(&mut self, kind: VarKind) -> &mut Variables {
        match kind {
            VarKind::Locals => &mut self.locals,
            VarKind::Stack => &mut self.stack,
        }
    }
}

/// Type state of one method across all visited program counters
///
/// Scoped to a single translation pass: built up incrementally while the
/// translator visits instructions, consulted for slot types, and discarded
/// once the register code has been produced. All mutation goes through
/// `&mut self`, which is the single-writer discipline; translating different
/// methods concurrently means independent `ProgramState` values.
#[derive(Debug)]
pub struct ProgramState {
    max_locals: u16,
    max_stack: u16,
    /// Sorted by program counter; binary searched on every access
    atoms: Vec<Atom>,
    done: bool,
}

impl ProgramState {
    pub fn new(max_locals: u16, max_stack: u16) -> ProgramState {
        ProgramState {
            max_locals,
            max_stack,
            atoms: Vec::new(),
            done: false,
        }
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    /// Atoms materialized so far, in increasing PC order
    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.iter()
    }

    /// The atom for `pc`, if one has been materialized
    pub fn atom_at(&self, pc: u32) -> Option<&Atom> {
        self.atoms
            .binary_search_by_key(&pc, |a| a.pc)
            .ok()
            .map(|i| &self.atoms[i])
    }

    /// The atom for `pc`, created at its sorted position if absent
    pub fn atom_mut(&mut self, pc: u32, create: bool) -> Result<Option<&mut Atom>, Error> {
        if create {
            return self.atom_create(pc).map(Some);
        }
        if pc > MAX_PC {
            return Err(Error::PcOutOfRange(pc));
        }
        match self.atoms.binary_search_by_key(&pc, |a| a.pc) {
            Ok(i) => Ok(Some(&mut self.atoms[i])),
            Err(_) => Ok(None),
        }
    }

    fn atom_create(&mut self, pc: u32) -> Result<&mut Atom, Error> {
        if pc > MAX_PC {
            return Err(Error::PcOutOfRange(pc));
        }
        let index = match self.atoms.binary_search_by_key(&pc, |a| a.pc) {
            Ok(i) => i,
            Err(i) => {
                self.atoms
                    .insert(i, Atom::new(pc, self.max_locals, self.max_stack));
                i
            }
        };
        Ok(&mut self.atoms[index])
    }

    /// Handle for the slot at `(pc, position)`, materializing the atom
    ///
    /// The returned [`SlotId`] is the virtual form of the slot: it commits
    /// nothing until [`ProgramState::set_type`] is called with it.
    pub fn slot_at(&mut self, kind: VarKind, pc: u32, position: u16) -> Result<SlotId, Error> {
        let limit = match kind {
            VarKind::Locals => self.max_locals,
            VarKind::Stack => self.max_stack,
        };
        if position >= limit {
            return Err(Error::SlotOutOfRange {
                kind,
                position: u32::from(position),
                limit,
            });
        }
        self.atom_mut(pc, true)?;
        SlotId::new(kind, pc, position)
    }

    /// Resolve the type occupying a slot
    ///
    /// If no type was committed at the slot itself, the previous-PC chain is
    /// walked backwards (bounded by the atoms materialized below this PC)
    /// until a committed type is found; reaching the front of the program
    /// with no match resolves to `Nothing`. For stack slots, a position at
    /// or beyond the minimum stack top seen along the walk resolves to
    /// `Nothing` immediately; the stack boundary wins over anything
    /// committed further back.
    pub fn type_of(&self, id: SlotId) -> Result<VarType, Error> {
        let kind = id.kind();
        let position = id.position();
        let limit = match kind {
            VarKind::Locals => self.max_locals,
            VarKind::Stack => self.max_stack,
        };
        if position >= limit {
            return Err(Error::SlotOutOfRange {
                kind,
                position: u32::from(position),
                limit,
            });
        }

        // Index of the first atom past this PC; everything below it is the
        // backward chain, scanned in decreasing PC order
        let start = self.atoms.partition_point(|a| a.pc <= id.pc());
        let mut min_top = u16::MAX;
        for atom in self.atoms[..start].iter().rev() {
            let vars = atom.variables(kind);
            if kind == VarKind::Stack {
                min_top = min_top.min(vars.stack_top);
                if position >= min_top {
                    return Ok(VarType::Nothing);
                }
            }
            if let Some(ty) = vars.committed_at(position) {
                return Ok(ty);
            }
        }
        Ok(VarType::Nothing)
    }

    /// Commit a type to a slot, promoting it from virtual to logical
    pub fn set_type(&mut self, id: SlotId, ty: VarType) -> Result<(), Error> {
        let kind = id.kind();
        let position = id.position();
        let limit = match kind {
            VarKind::Locals => self.max_locals,
            VarKind::Stack => self.max_stack,
        };
        if position >= limit {
            return Err(Error::SlotOutOfRange {
                kind,
                position: u32::from(position),
                limit,
            });
        }
        let atom = self.atom_create(id.pc())?;
        atom.variables_mut(kind).commit(position, ty);
        Ok(())
    }

    /// Stack top at `pc`, or 0 if the atom was never materialized
    pub fn stack_top(&self, pc: u32) -> u16 {
        self.atom_at(pc).map_or(0, |a| a.stack.stack_top)
    }

    /// Set the live stack depth at `pc`
    pub fn set_stack_top(&mut self, pc: u32, top: u16) -> Result<(), Error> {
        self.atom_create(pc)?.stack.set_stack_top(top)
    }

    /// Mark the translation pass over this state as complete
    ///
    /// Single use: a second call is a caller bug and fails.
    pub fn finish(&mut self) -> Result<(), Error> {
        if self.done {
            return Err(Error::TranslationFinished);
        }
        self.done = true;
        log::trace!(
            "program state finished: {} atoms materialized",
            self.atoms.len()
        );
        Ok(())
    }
}
