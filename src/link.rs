//! Append-only registry of the symbolic cross-references a class makes
//!
//! Every export, superclass extension, interface implementation and member
//! reference gets an entry in discovery order. The assigned link ids are the
//! stable handles the register code uses in place of constant pool indices.

use crate::access_flags::ClassAccessFlags;
use crate::class_file::BinaryName;
use crate::Error;

/// Stable identifier of one link table entry
///
/// Ids are assigned from the table's size at insertion, so they are
/// monotonically increasing in discovery order and never reassigned.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LinkId(pub u32);

/// What kind of member a [`LinkEntry::MemberRef`] names
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// One symbolic cross-reference recorded for a class
#[derive(Debug, Clone)]
pub enum LinkEntry {
    /// The class itself, made visible to the register code consumer
    Export {
        name: BinaryName,
        flags: ClassAccessFlags,
    },

    /// `owner` extends `super_name`
    Extends {
        owner: LinkId,
        super_name: BinaryName,
    },

    /// `owner` implements `interface`
    Implements {
        owner: LinkId,
        interface: BinaryName,
    },

    /// A field or method of another (or the same) class that `owner`'s code
    /// refers to
    MemberRef {
        owner: LinkId,
        kind: MemberKind,
        class: BinaryName,
        name: String,
        descriptor: String,
    },
}

/// The link table of one class parse
///
/// Append only: entries are never removed or reordered, and an entry's id is
/// always strictly greater than every id assigned before it.
#[derive(Debug, Default)]
pub struct LinkTable {
    entries: Vec<LinkEntry>,
}

impl LinkTable {
    pub fn new() -> LinkTable {
        LinkTable::default()
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: LinkId) -> Option<&LinkEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Entries in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (LinkId, &LinkEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (LinkId(i as u32), e))
    }

    fn append(&mut self, entry: LinkEntry) -> LinkId {
        let id = LinkId(self.len());
        self.entries.push(entry);
        id
    }

    /// Register a class as an export and return its link id
    pub fn export(&mut self, name: BinaryName, flags: ClassAccessFlags) -> LinkId {
        log::trace!("export {}", name);
        self.append(LinkEntry::Export { name, flags })
    }

    /// Append a link entry, validating it against the table so far
    ///
    /// An `Implements` entry duplicating the owner/interface pair of an
    /// earlier one is rejected. The duplicate check is by id ordering: the
    /// candidate's id would not be strictly greater than the id already
    /// holding that pair, so the pair is refused. Member references instead
    /// de-duplicate silently: linking the same member twice returns the
    /// first id.
    pub fn link(&mut self, entry: LinkEntry) -> Result<LinkId, Error> {
        match &entry {
            LinkEntry::Implements { owner, interface } => {
                let duplicate = self.entries.iter().any(|existing| {
                    matches!(existing, LinkEntry::Implements { owner: o, interface: i }
                        if o == owner && i == interface)
                });
                if duplicate {
                    return Err(Error::DuplicateInterface {
                        owner: owner.0,
                        interface: interface.as_str().to_owned(),
                    });
                }
            }
            LinkEntry::MemberRef {
                owner,
                kind,
                class,
                name,
                descriptor,
            } => {
                let existing = self.iter().find(|(_, e)| {
                    matches!(e, LinkEntry::MemberRef {
                        owner: o, kind: k, class: c, name: n, descriptor: d,
                    } if o == owner && k == kind && c == class && n == name && d == descriptor)
                });
                if let Some((id, _)) = existing {
                    return Ok(id);
                }
            }
            _ => {}
        }
        Ok(self.append(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> BinaryName {
        BinaryName::from_string(String::from(s)).unwrap()
    }

    fn public() -> ClassAccessFlags {
        ClassAccessFlags::parse(0x0001).unwrap()
    }

    #[test]
    fn ids_are_monotonic_in_discovery_order() {
        let mut table = LinkTable::new();
        let class = table.export(name("Example"), public());
        assert_eq!(class, LinkId(0));
        let extends = table
            .link(LinkEntry::Extends {
                owner: class,
                super_name: name("java/lang/Object"),
            })
            .unwrap();
        assert_eq!(extends, LinkId(1));
        let implements = table
            .link(LinkEntry::Implements {
                owner: class,
                interface: name("java/lang/Runnable"),
            })
            .unwrap();
        assert_eq!(implements, LinkId(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn duplicate_interface_rejected_on_second_submission() {
        let mut table = LinkTable::new();
        let class = table.export(name("Example"), public());
        table
            .link(LinkEntry::Implements {
                owner: class,
                interface: name("java/lang/Runnable"),
            })
            .unwrap();
        let err = table
            .link(LinkEntry::Implements {
                owner: class,
                interface: name("java/lang/Runnable"),
            })
            .unwrap_err();
        assert_eq!(err.code(), "LT03");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_interface_different_owner_allowed() {
        let mut table = LinkTable::new();
        let a = table.export(name("A"), public());
        let b = table.export(name("B"), public());
        for owner in [a, b] {
            table
                .link(LinkEntry::Implements {
                    owner,
                    interface: name("java/lang/Runnable"),
                })
                .unwrap();
        }
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn member_refs_deduplicate_to_first_id() {
        let mut table = LinkTable::new();
        let class = table.export(name("Example"), public());
        let entry = || LinkEntry::MemberRef {
            owner: class,
            kind: MemberKind::Field,
            class: name("Example"),
            name: String::from("count"),
            descriptor: String::from("I"),
        };
        let first = table.link(entry()).unwrap();
        let second = table.link(entry()).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.len(), 2);
    }
}
