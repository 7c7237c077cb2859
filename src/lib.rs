//! Class file to register code translation
//!
//! This crate parses a fixed Java ME subset of the JVM class file format and
//! translates method bodies from their stack-form instruction stream into
//! register-form code, tracking per-program-point slot typing along the way.
//!
//! The pipeline has three stages:
//!
//!  1. [`class_file::ClassFile::parse`] structurally validates the raw bytes
//!     (magic, version, constant pool, flags, members) and seeds a
//!     [`link::LinkTable`] with the class's exports, superclass and
//!     interfaces.
//!
//!  2. [`translate::MethodTranslator`] simulates each method's operand stack,
//!     recording typing discoveries in a [`state::ProgramState`] and
//!     appending every member reference the code makes to the link table.
//!
//!  3. The result is a [`register::RegisterCode`]: one register instruction
//!     per input instruction, with branch targets rewritten to instruction
//!     indices and locals/stack positions mapped onto a flat register bank.
//!
//! ```no_run
//! use class2reg::class_file::ClassFile;
//! use class2reg::translate::{translate_class, TranslatorSettings};
//!
//! # fn main() -> Result<(), class2reg::Error> {
//! let bytes = std::fs::read("Example.class").unwrap();
//! let mut parsed = ClassFile::parse(&bytes)?;
//! for (name, descriptor, code) in translate_class(&mut parsed, TranslatorSettings::default())? {
//!     println!("{}{}: {} instructions", name, descriptor, code.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod access_flags;
pub mod class_file;
mod errors;
pub mod link;
pub mod register;
pub mod state;
pub mod translate;

pub use errors::Error;
