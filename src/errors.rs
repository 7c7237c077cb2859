use crate::state::{VarKind, VarType};

/// Everything that can go wrong while parsing a class or translating a method
///
/// Variants carry the offending raw data so callers can report exactly what
/// was seen. Each variant also has a stable short code (see [`Error::code`])
/// which is the identifier to grep for and to match on across versions.
#[derive(Debug)]
pub enum Error {
    // ---- format errors ----
    /// The first four bytes were not the class file magic number
    BadMagic(u32),

    /// Combined `(major << 16) | minor` version not in the known table
    UnsupportedVersion(u32),

    /// The constant pool count field was zero
    EmptyConstantPool,

    /// A constant pool tag this format does not define
    UnknownConstantTag { tag: u8, index: u16 },

    /// Method handles, method types and `invokedynamic` call sites are not
    /// part of the supported class file subset
    DynamicInvocationUnsupported { tag: u8, index: u16 },

    /// Invalid modified UTF-8 payload in a constant pool entry
    MalformedUtf8 { offset: usize },

    /// Ran off the end of the class bytes
    UnexpectedEndOfInput { offset: usize },

    /// Constant index is zero, past the end of the pool, or the reserved
    /// gap slot after a `Long`/`Double`
    BadConstantIndex(u16),

    /// A `Long`/`Double` entry declared in the last pool slot, leaving no
    /// room for the reserved slot that must follow it
    WideConstantAtEnd { index: u16 },

    /// The entry at the index exists but has the wrong tag for the request
    WrongConstantType { index: u16, expected: &'static str },

    /// A class name symbol failed validation
    BadBinaryName(String),

    // ---- structural / link errors ----
    /// Access flag field contains bits outside the defined set
    UnknownFlagBits { bits: u16 },

    /// An interface must also be abstract
    InterfaceNotAbstract { bits: u16 },

    /// An interface cannot be final or enum and must not use the
    /// invoke-special-as-super semantic
    InterfaceBadModifiers { bits: u16 },

    /// An annotation must be an interface
    AnnotationNotInterface { bits: u16 },

    /// A class cannot be both abstract and final
    AbstractFinalClass { bits: u16 },

    /// More than one of public/private/protected set on a member
    ConflictingVisibility { bits: u16 },

    /// Interface field flags must be exactly public static final
    BadInterfaceField { bits: u16 },

    /// A field cannot be both final and volatile
    FinalVolatileField { bits: u16 },

    /// Interface methods must be public and abstract
    BadInterfaceMethod { bits: u16 },

    /// An abstract method has a flag incompatible with being abstract
    BadAbstractMethod { bits: u16 },

    /// Every class other than the root object type needs a superclass
    MissingSuperClass { name: String },

    /// The root object type must not have a superclass
    UnexpectedSuperClass { super_name: String },

    /// Second implements-link for the same owner and interface symbol
    DuplicateInterface { owner: u32, interface: String },

    // ---- engine usage errors (caller bugs) ----
    /// Program counter outside the 31-bit range a slot id can carry
    PcOutOfRange(u32),

    /// Slot position at or past the collection's declared limit
    SlotOutOfRange { kind: VarKind, position: u32, limit: u16 },

    /// Stack top outside `0..=max_stack`
    StackTopOutOfRange { top: u16, limit: u16 },

    /// Stack-only operation invoked on a locals collection
    NotStackVariables,

    /// Terminal production step invoked twice on the same engine
    TranslationFinished,

    // ---- translation errors ----
    /// Opcode outside the supported subset; the translator refuses to guess
    UnsupportedOpcode { opcode: u8, pc: u32 },

    /// Instruction stream ended in the middle of an instruction
    TruncatedInstruction { pc: u32 },

    /// An instruction consumed more operands than the stack holds
    StackUnderflow { pc: u32 },

    /// An instruction pushed past the method's declared max stack
    StackOverflow { pc: u32, max_stack: u16 },

    /// The operand at a stack position had the wrong type for the opcode
    OperandTypeMismatch { pc: u32, expected: VarType, found: VarType },

    /// A branch target was reached with two incompatible frames
    FrameMergeConflict { target: u32 },

    /// A branch target is not the start of an instruction
    BadBranchTarget { pc: u32, target: u32 },

    /// A local index operand is out of the declared max-locals range
    BadLocalIndex { pc: u32, index: u16 },

    /// Register code construction saw a hole where an instruction belongs
    AbsentInstruction { index: usize },

    /// A field or method descriptor that does not parse
    BadDescriptor { descriptor: String },

    /// Translation requested for a method with no code attribute
    MissingCode { method: String },

    /// Locals bank plus stack position landed past the register index space
    RegisterOutOfRange { pc: u32, index: u32 },
}

impl Error {
    /// The stable identifying code for this error
    ///
    /// Codes are four characters, grouped by prefix: `CF` class file format,
    /// `FL` flags, `LT` link table, `PS` program state, `TR` translation.
    /// Codes are never reused for a different meaning.
    pub fn code(&self) -> &'static str {
        match self {
            Error::BadMagic(_) => "CF01",
            Error::UnsupportedVersion(_) => "CF02",
            Error::EmptyConstantPool => "CF03",
            Error::UnknownConstantTag { .. } => "CF04",
            Error::DynamicInvocationUnsupported { .. } => "CF05",
            Error::MalformedUtf8 { .. } => "CF06",
            Error::UnexpectedEndOfInput { .. } => "CF07",
            Error::BadConstantIndex(_) => "CF08",
            Error::WrongConstantType { .. } => "CF09",
            Error::BadBinaryName(_) => "CF0a",
            Error::WideConstantAtEnd { .. } => "CF0b",

            Error::UnknownFlagBits { .. } => "FL01",
            Error::InterfaceNotAbstract { .. } => "FL02",
            Error::InterfaceBadModifiers { .. } => "FL03",
            Error::AnnotationNotInterface { .. } => "FL04",
            Error::AbstractFinalClass { .. } => "FL05",
            Error::ConflictingVisibility { .. } => "FL06",
            Error::BadInterfaceField { .. } => "FL07",
            Error::FinalVolatileField { .. } => "FL08",
            Error::BadInterfaceMethod { .. } => "FL09",
            Error::BadAbstractMethod { .. } => "FL0a",

            Error::MissingSuperClass { .. } => "LT01",
            Error::UnexpectedSuperClass { .. } => "LT02",
            Error::DuplicateInterface { .. } => "LT03",

            Error::PcOutOfRange(_) => "PS01",
            Error::SlotOutOfRange { .. } => "PS02",
            Error::StackTopOutOfRange { .. } => "PS03",
            Error::NotStackVariables => "PS04",
            Error::TranslationFinished => "PS05",

            Error::UnsupportedOpcode { .. } => "TR01",
            Error::TruncatedInstruction { .. } => "TR02",
            Error::StackUnderflow { .. } => "TR03",
            Error::StackOverflow { .. } => "TR04",
            Error::OperandTypeMismatch { .. } => "TR06",
            Error::FrameMergeConflict { .. } => "TR05",
            Error::BadBranchTarget { .. } => "TR07",
            Error::BadLocalIndex { .. } => "TR08",
            Error::AbsentInstruction { .. } => "TR09",
            Error::BadDescriptor { .. } => "TR0a",
            Error::MissingCode { .. } => "TR0b",
            Error::RegisterOutOfRange { .. } => "TR0c",
        }
    }
}
