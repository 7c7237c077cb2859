use crate::access_flags::ClassAccessFlags;
use crate::class_file::constant_pool::ConstantIndex;
use crate::class_file::{
    parse_attributes, Attribute, BinaryName, ClassConstantIndex, ClassReader, ConstantPool,
    Field, Method, Version,
};
use crate::link::{LinkEntry, LinkId, LinkTable};
use crate::Error;

/// A structurally parsed class, plus the link table its parse populated
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_name: BinaryName,
    /// Absent exactly when this class is the root object type
    pub super_name: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Class-level attributes, retained raw
    pub attributes: Vec<Attribute>,
    /// This class's own link id (its export entry)
    pub this_link: LinkId,
}

/// Magic bytes at the front of every class file
const MAGIC: u32 = 0xCAFE_BABE;

/// Everything the structural parse produces: the class model, the constant
/// pool it still refers into, and the link table
#[derive(Debug)]
pub struct ParsedClass {
    pub class: ClassFile,
    pub pool: ConstantPool,
    pub links: LinkTable,
}

impl ClassFile {
    /// Parse a class from its raw bytes
    ///
    /// This is the fixed protocol over the stream: magic, version, constant
    /// pool, class flags, this-class symbol (exported), optional superclass
    /// (exactly one of root-object / superclass-present must hold),
    /// interfaces (linked, duplicates fatal), fields, methods, attributes.
    /// Any deviation fails at the point of detection with one documented
    /// error; the link table is only handed out on success, so a failed
    /// parse never exposes partial link state.
    pub fn parse(bytes: &[u8]) -> Result<ParsedClass, Error> {
        let mut reader = ClassReader::new(bytes);
        let mut links = LinkTable::new();

        // 1. Magic
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        // 2. Version half-words, checked against the known table
        let minor = reader.u16()?;
        let major = reader.u16()?;
        let version = Version::from_raw(major, minor)?;

        // 3. Constant pool
        let pool = ConstantPool::parse(&mut reader)?;

        // 4. Class flags and this class's own name symbol
        let access_flags = ClassAccessFlags::parse(reader.u16()?)?;
        let this_name = pool
            .class_name(ClassConstantIndex(ConstantIndex(reader.u16()?)))?
            .clone();

        // 5. The class is now visible as an export
        let this_link = links.export(this_name.clone(), access_flags);

        // 6. Superclass: absent iff this is the root object type
        let super_name = pool.optional_class_name(reader.u16()?)?.cloned();
        match (&super_name, this_name.is_object()) {
            (None, false) => {
                return Err(Error::MissingSuperClass {
                    name: this_name.as_str().to_owned(),
                })
            }
            (Some(super_name), true) => {
                return Err(Error::UnexpectedSuperClass {
                    super_name: super_name.as_str().to_owned(),
                })
            }
            _ => {}
        }
        if let Some(super_name) = &super_name {
            links.link(LinkEntry::Extends {
                owner: this_link,
                super_name: super_name.clone(),
            })?;
        }

        // 7. Interfaces, with the duplicate rule enforced by the table
        let interface_count = reader.u16()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        let mut last_link = this_link;
        for _ in 0..interface_count {
            let interface = pool
                .class_name(ClassConstantIndex(ConstantIndex(reader.u16()?)))?
                .clone();
            let id = links.link(LinkEntry::Implements {
                owner: this_link,
                interface: interface.clone(),
            })?;
            debug_assert!(id.0 > last_link.0);
            last_link = id;
            interfaces.push(interface);
        }

        // 8. Fields
        let field_count = reader.u16()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(Field::parse(&mut reader, &pool, access_flags)?);
        }

        // 9. Methods (translation of their code is a separate pass)
        let method_count = reader.u16()?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            methods.push(Method::parse(&mut reader, &pool, access_flags)?);
        }

        // 10. Trailing class attributes, scanned but not interpreted
        let attributes = parse_attributes(&mut reader, &pool)?;

        log::trace!(
            "parsed class {} ({} fields, {} methods, {} links)",
            this_name,
            fields.len(),
            methods.len(),
            links.len()
        );

        Ok(ParsedClass {
            class: ClassFile {
                version,
                access_flags,
                this_name,
                super_name,
                interfaces,
                fields,
                methods,
                attributes,
                this_link,
            },
            pool,
            links,
        })
    }
}
