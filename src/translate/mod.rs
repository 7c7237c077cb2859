//! Translating stack-form method bodies into register code
//!
//! Translation runs per method: a [`MethodTranslator`] simulates the operand
//! stack, records its typing discoveries in a
//! [`ProgramState`][crate::state::ProgramState], registers every member the
//! code refers to in the class's link table, and produces a
//! [`RegisterCode`][crate::register::RegisterCode] with exactly one register
//! instruction per input instruction.

mod bytecode;
mod function;
mod settings;

pub use bytecode::*;
pub use function::*;
pub use settings::*;

use crate::class_file::ParsedClass;
use crate::register::RegisterCode;
use crate::Error;

/// Translate every method of a parsed class that has a body
///
/// Abstract and native methods are skipped. Member references discovered in
/// the method bodies are appended to the class's link table, so translating
/// grows the table that parsing started. Returns `(name, descriptor, code)`
/// per translated method, in declaration order.
pub fn translate_class(
    parsed: &mut ParsedClass,
    settings: TranslatorSettings,
) -> Result<Vec<(String, String, RegisterCode)>, Error> {
    let mut translated = Vec::new();
    for method in &parsed.class.methods {
        if method.code.is_none() {
            continue;
        }
        let translator = MethodTranslator::new(
            &parsed.pool,
            &mut parsed.links,
            parsed.class.this_link,
            method,
            settings,
        )?;
        let (code, _state) = translator.translate()?;
        translated.push((method.name.clone(), method.descriptor.clone(), code));
    }
    Ok(translated)
}
