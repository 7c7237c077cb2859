use std::fmt;

use crate::class_file::{BinaryName, ClassReader};
use crate::Error;
use elsa::FrozenMap;

/// Raw index into the constant pool (one-indexed; zero is never valid)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

/// One parsed entry of the constant pool
///
/// This is the fixed Java ME subset of the full format: the dynamic
/// invocation constant kinds (method handles, method types, `invokedynamic`)
/// are rejected at parse time rather than represented.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Constant UTF-8 (really: modified UTF-8) raw string value
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long` (occupies two pool slots)
    Long(i64),

    /// Constant primitive of type `double` (occupies two pool slots)
    Double(f64),

    /// Class or interface, pointing at its name
    Class(Utf8ConstantIndex),

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Field reference
    FieldRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Method reference (combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Name and a descriptor (for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },
}

/// Member reference resolved down to its symbols
#[derive(Debug, Clone, Copy)]
pub struct MemberParts<'p> {
    pub class: &'p BinaryName,
    pub name: &'p str,
    pub descriptor: &'p str,
    pub is_interface: bool,
}

/// Index-addressable constant pool of one class
///
/// Entries are parsed eagerly (the tag stream has no random access), but
/// symbolic resolution (chasing a `Class` entry through to its UTF-8 name)
/// happens on first access and is cached for subsequent lookups. The cache
/// is append-only, so resolution hands out stable references from a shared
/// `&self`.
pub struct ConstantPool {
    /// One-indexed; `None` marks index zero and the reserved slot after
    /// every `Long`/`Double`
    entries: Vec<Option<Constant>>,

    /// Lazily resolved class name symbols, keyed by raw pool index
    resolved_names: FrozenMap<u16, Box<BinaryName>>,
}

// Manual impl: `FrozenMap` is not `Debug`, and the cache is derived data
// anyway, so only the entries are shown
impl fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantPool")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ConstantPool {
    /// Parse the tagged entry stream
    ///
    /// The count half-word must be positive and is followed by `count - 1`
    /// slots of entries, where `Long` and `Double` each occupy two slots.
    pub fn parse(reader: &mut ClassReader) -> Result<ConstantPool, Error> {
        let count = reader.u16()?;
        if count == 0 {
            return Err(Error::EmptyConstantPool);
        }

        let mut entries: Vec<Option<Constant>> = Vec::with_capacity(usize::from(count));
        entries.push(None); // index zero
        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u8()?;
            let constant = match tag {
                1 => Constant::Utf8(reader.modified_utf8()?),
                3 => Constant::Integer(reader.i32()?),
                4 => Constant::Float(reader.f32()?),
                5 => Constant::Long(reader.i64()?),
                6 => Constant::Double(reader.f64()?),
                7 => Constant::Class(Utf8ConstantIndex(ConstantIndex(reader.u16()?))),
                8 => Constant::String(Utf8ConstantIndex(ConstantIndex(reader.u16()?))),
                9 => Constant::FieldRef {
                    class: ClassConstantIndex(ConstantIndex(reader.u16()?)),
                    name_and_type: NameAndTypeConstantIndex(ConstantIndex(reader.u16()?)),
                },
                10 | 11 => Constant::MethodRef {
                    class: ClassConstantIndex(ConstantIndex(reader.u16()?)),
                    name_and_type: NameAndTypeConstantIndex(ConstantIndex(reader.u16()?)),
                    is_interface: tag == 11,
                },
                12 => Constant::NameAndType {
                    name: Utf8ConstantIndex(ConstantIndex(reader.u16()?)),
                    descriptor: Utf8ConstantIndex(ConstantIndex(reader.u16()?)),
                },
                15 | 16 | 18 => {
                    return Err(Error::DynamicInvocationUnsupported { tag, index })
                }
                _ => return Err(Error::UnknownConstantTag { tag, index }),
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            if wide && index == count - 1 {
                // The reserved second slot must also fit inside the pool
                return Err(Error::WideConstantAtEnd { index });
            }
            entries.push(Some(constant));
            index += 1;
            if wide {
                // The slot after an 8-byte constant is valid but unusable
                entries.push(None);
                index += 1;
            }
        }

        log::trace!("parsed constant pool with {} slots", count);
        Ok(ConstantPool {
            entries,
            resolved_names: FrozenMap::new(),
        })
    }

    /// Number of pool slots, including index zero and reserved gaps
    pub fn len(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// The typed entry at the index
    ///
    /// Index zero, indices past the pool, and the gap slot after a wide
    /// constant all fail with the same bad-index error.
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.entries
            .get(usize::from(index.0))
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::BadConstantIndex(index.0))
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::WrongConstantType {
                index: index.0 .0,
                expected: "Utf8",
            }),
        }
    }

    /// Resolve a class entry to its name symbol
    ///
    /// The `Class -> Utf8` indirection is chased on first access only; the
    /// owned symbol is cached and later calls return the same reference.
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&BinaryName, Error> {
        let raw = index.0 .0;
        if let Some(name) = self.resolved_names.get(&raw) {
            return Ok(name);
        }
        let utf8 = match self.get(index.0)? {
            Constant::Class(utf8) => *utf8,
            _ => {
                return Err(Error::WrongConstantType {
                    index: raw,
                    expected: "Class",
                })
            }
        };
        let name = BinaryName::from_string(self.utf8(utf8)?.to_owned())?;
        Ok(self.resolved_names.insert(raw, Box::new(name)))
    }

    /// Like [`ConstantPool::class_name`] but a raw index of zero reads as
    /// absent (legitimate only for the superclass of the root class)
    pub fn optional_class_name(&self, raw: u16) -> Result<Option<&BinaryName>, Error> {
        if raw == 0 {
            return Ok(None);
        }
        self.class_name(ClassConstantIndex(ConstantIndex(raw)))
            .map(Some)
    }

    /// Resolve a name-and-type entry into its two symbols
    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(&str, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::WrongConstantType {
                index: index.0 .0,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a field reference entry down to its symbols
    pub fn field_ref(&self, raw: u16) -> Result<MemberParts, Error> {
        match self.get(ConstantIndex(raw))? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MemberParts {
                    class: self.class_name(*class)?,
                    name,
                    descriptor,
                    is_interface: false,
                })
            }
            _ => Err(Error::WrongConstantType {
                index: raw,
                expected: "FieldRef",
            }),
        }
    }

    /// Resolve a method reference entry down to its symbols
    pub fn method_ref(&self, raw: u16) -> Result<MemberParts, Error> {
        match self.get(ConstantIndex(raw))? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MemberParts {
                    class: self.class_name(*class)?,
                    name,
                    descriptor,
                    is_interface: *is_interface,
                })
            }
            _ => Err(Error::WrongConstantType {
                index: raw,
                expected: "MethodRef",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes(entries: &[&[u8]]) -> Vec<u8> {
        // Count is slots, not entries; callers pass pre-encoded entries and
        // account for wide constants themselves
        let slots: u16 = 1 + entries
            .iter()
            .map(|e| if e[0] == 5 || e[0] == 6 { 2u16 } else { 1 })
            .sum::<u16>();
        let mut bytes = vec![(slots >> 8) as u8, slots as u8];
        for entry in entries {
            bytes.extend_from_slice(entry);
        }
        bytes
    }

    fn utf8_entry(s: &str) -> Vec<u8> {
        let mut entry = vec![1, (s.len() >> 8) as u8, s.len() as u8];
        entry.extend_from_slice(s.as_bytes());
        entry
    }

    #[test]
    fn empty_pool_rejected() {
        let mut reader = ClassReader::new(&[0, 0]);
        let err = ConstantPool::parse(&mut reader).unwrap_err();
        assert_eq!(err.code(), "CF03");
    }

    #[test]
    fn dynamic_invocation_tags_rejected() {
        for tag in [15u8, 16, 18] {
            let bytes = pool_bytes(&[&[tag, 0, 1, 0, 2]]);
            let mut reader = ClassReader::new(&bytes);
            let err = ConstantPool::parse(&mut reader).unwrap_err();
            assert_eq!(err.code(), "CF05");
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let bytes = pool_bytes(&[&[19, 0, 1]]);
        let mut reader = ClassReader::new(&bytes);
        let err = ConstantPool::parse(&mut reader).unwrap_err();
        assert_eq!(err.code(), "CF04");
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let long_entry: &[u8] = &[5, 0, 0, 0, 0, 0, 0, 0, 42];
        let int_entry: &[u8] = &[3, 0, 0, 0, 7];
        let bytes = pool_bytes(&[long_entry, int_entry]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();

        assert!(matches!(
            pool.get(ConstantIndex(1)),
            Ok(Constant::Long(42))
        ));
        // The gap slot is addressable but unusable
        let err = pool.get(ConstantIndex(2)).unwrap_err();
        assert_eq!(err.code(), "CF08");
        assert!(matches!(pool.get(ConstantIndex(3)), Ok(Constant::Integer(7))));
    }

    #[test]
    fn wide_constant_cannot_occupy_the_final_slot() {
        // Count of 2 leaves exactly one slot, but a Long needs two
        let mut bytes = vec![0, 2, 5];
        bytes.extend_from_slice(&[0; 8]);
        let mut reader = ClassReader::new(&bytes);
        let err = ConstantPool::parse(&mut reader).unwrap_err();
        assert_eq!(err.code(), "CF0b");

        // The same entry with room for its reserved slot parses fine
        let bytes = pool_bytes(&[&[5, 0, 0, 0, 0, 0, 0, 0, 42]]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn pool_debug_output_elides_the_name_cache() {
        let name = utf8_entry("java/lang/Object");
        let class_entry: &[u8] = &[7, 0, 1];
        let bytes = pool_bytes(&[&name, class_entry]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        pool.class_name(ClassConstantIndex(ConstantIndex(2))).unwrap();

        let rendered = format!("{:?}", pool);
        assert!(rendered.contains("entries"));
        assert!(!rendered.contains("resolved_names"));
    }

    #[test]
    fn index_zero_and_past_end_rejected() {
        let bytes = pool_bytes(&[&utf8_entry("x")]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.get(ConstantIndex(0)).unwrap_err().code(), "CF08");
        assert_eq!(pool.get(ConstantIndex(9)).unwrap_err().code(), "CF08");
    }

    #[test]
    fn class_name_resolution_is_cached() {
        let name = utf8_entry("java/lang/Object");
        let class_entry: &[u8] = &[7, 0, 1];
        let bytes = pool_bytes(&[&name, class_entry]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();

        let index = ClassConstantIndex(ConstantIndex(2));
        let first = pool.class_name(index).unwrap();
        assert!(first.is_object());
        let second = pool.class_name(index).unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn wrong_constant_type_reported() {
        let bytes = pool_bytes(&[&utf8_entry("zzz")]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        let err = pool
            .class_name(ClassConstantIndex(ConstantIndex(1)))
            .unwrap_err();
        assert_eq!(err.code(), "CF09");
    }
}
