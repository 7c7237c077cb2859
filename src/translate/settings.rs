/// How stack positions are mapped onto registers
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranslationMethod {
    /// 1:1 scheme: locals keep their indices, stack position `p` becomes
    /// register `max_locals + p`, one register instruction per input
    /// instruction
    Simple,
}

/// What happens where two control flow edges converge on one target
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MergePolicy {
    /// Every predecessor must arrive with the same stack depth and the same
    /// slot types; any mismatch fails the translation. This never invents a
    /// type neither predecessor produced.
    RequireIdentical,
}

/// Translator configuration
///
/// Passed explicitly to [`MethodTranslator::new`][super::MethodTranslator];
/// there is no ambient or environment-driven selection.
#[derive(Copy, Clone, Debug)]
pub struct TranslatorSettings {
    pub method: TranslationMethod,
    pub merge: MergePolicy,
}

impl Default for TranslatorSettings {
    fn default() -> TranslatorSettings {
        TranslatorSettings {
            method: TranslationMethod::Simple,
            merge: MergePolicy::RequireIdentical,
        }
    }
}
