use crate::access_flags::{ClassAccessFlags, MethodAccessFlags};
use crate::class_file::constant_pool::ConstantIndex;
use crate::class_file::{
    find_code, parse_attributes, Attribute, ClassReader, CodeAttribute, ConstantPool,
    Utf8ConstantIndex,
};
use crate::Error;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    /// The decoded code attribute; absent for abstract and native methods
    pub code: Option<CodeAttribute>,
    /// Remaining attributes, retained raw
    pub attributes: Vec<Attribute>,
}

impl Method {
    /// Parse one method record: flags, name, descriptor, attribute table
    pub fn parse(
        reader: &mut ClassReader,
        pool: &ConstantPool,
        class_flags: ClassAccessFlags,
    ) -> Result<Method, Error> {
        let access_flags = MethodAccessFlags::parse(reader.u16()?, class_flags)?;
        let name = pool
            .utf8(Utf8ConstantIndex(ConstantIndex(reader.u16()?)))?
            .to_owned();
        let descriptor = pool
            .utf8(Utf8ConstantIndex(ConstantIndex(reader.u16()?)))?
            .to_owned();

        let mut attributes = parse_attributes(reader, pool)?;
        let code = find_code(&attributes, pool)?;
        attributes.retain(|a| a.name != "Code");

        Ok(Method {
            access_flags,
            name,
            descriptor,
            code,
            attributes,
        })
    }
}
