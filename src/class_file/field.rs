use crate::access_flags::{ClassAccessFlags, FieldAccessFlags};
use crate::class_file::{
    find_constant_value, parse_attributes, Attribute, ClassReader, Constant, ConstantPool,
    Utf8ConstantIndex,
};
use crate::class_file::constant_pool::ConstantIndex;
use crate::Error;

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.5
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    /// Initial value from a `ConstantValue` attribute, if present
    pub constant_value: Option<Constant>,
    /// Remaining attributes, retained raw
    pub attributes: Vec<Attribute>,
}

impl Field {
    /// Parse one field record: flags, name, descriptor, attribute table
    pub fn parse(
        reader: &mut ClassReader,
        pool: &ConstantPool,
        class_flags: ClassAccessFlags,
    ) -> Result<Field, Error> {
        let access_flags = FieldAccessFlags::parse(reader.u16()?, class_flags)?;
        let name = pool
            .utf8(Utf8ConstantIndex(ConstantIndex(reader.u16()?)))?
            .to_owned();
        let descriptor = pool
            .utf8(Utf8ConstantIndex(ConstantIndex(reader.u16()?)))?
            .to_owned();

        let attributes = parse_attributes(reader, pool)?;
        let constant_value = match find_constant_value(&attributes)? {
            Some(index) => Some(pool.get(index)?.clone()),
            None => None,
        };

        Ok(Field {
            access_flags,
            name,
            descriptor,
            constant_value,
            attributes,
        })
    }
}
