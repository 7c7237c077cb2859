use crate::class_file::{ClassReader, ConstantIndex, ConstantPool};
use crate::Error;

/// A raw attribute record, name resolved but payload untouched
///
/// Attributes the parser does not recognize are scanned and retained like
/// this; their presence is a non-fatal pass-through.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub info: Vec<u8>,
}

/// One entry of a code attribute's exception table
#[derive(Debug, Clone, Copy)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero catches everything (a `finally` handler)
    pub catch_type: u16,
}

/// Decoded `Code` attribute of a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    /// `(start_pc, source_line)` pairs from any nested `LineNumberTable`
    pub line_numbers: Vec<(u16, u16)>,
    /// Nested attributes this parser has no use for
    pub attributes: Vec<Attribute>,
}

/// Read an attribute table: count, then name/length/payload records
pub fn parse_attributes(
    reader: &mut ClassReader,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, Error> {
    let count = reader.u16()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = reader.u16()?;
        let name = pool
            .utf8(crate::class_file::Utf8ConstantIndex(ConstantIndex(
                name_index,
            )))?
            .to_owned();
        let length = reader.u32()?;
        let info = reader.bytes(length as usize)?.to_vec();
        attributes.push(Attribute { name, info });
    }
    Ok(attributes)
}

/// Find and decode a `ConstantValue` attribute in a field's attribute table
pub fn find_constant_value(attributes: &[Attribute]) -> Result<Option<ConstantIndex>, Error> {
    for attribute in attributes {
        if attribute.name == "ConstantValue" {
            let mut reader = ClassReader::new(&attribute.info);
            return Ok(Some(ConstantIndex(reader.u16()?)));
        }
    }
    Ok(None)
}

/// Find and decode the `Code` attribute in a method's attribute table
pub fn find_code(
    attributes: &[Attribute],
    pool: &ConstantPool,
) -> Result<Option<CodeAttribute>, Error> {
    let attribute = match attributes.iter().find(|a| a.name == "Code") {
        Some(attribute) => attribute,
        None => return Ok(None),
    };
    let mut reader = ClassReader::new(&attribute.info);

    let max_stack = reader.u16()?;
    let max_locals = reader.u16()?;
    let code_length = reader.u32()?;
    let code = reader.bytes(code_length as usize)?.to_vec();

    let handler_count = reader.u16()?;
    let mut exception_table = Vec::with_capacity(usize::from(handler_count));
    for _ in 0..handler_count {
        exception_table.push(ExceptionHandler {
            start_pc: reader.u16()?,
            end_pc: reader.u16()?,
            handler_pc: reader.u16()?,
            catch_type: reader.u16()?,
        });
    }

    let nested = parse_attributes(&mut reader, pool)?;
    let mut line_numbers = Vec::new();
    let mut attributes = Vec::new();
    for attribute in nested {
        if attribute.name == "LineNumberTable" {
            let mut table = ClassReader::new(&attribute.info);
            let entries = table.u16()?;
            for _ in 0..entries {
                line_numbers.push((table.u16()?, table.u16()?));
            }
        } else {
            attributes.push(attribute);
        }
    }

    Ok(Some(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        line_numbers,
        attributes,
    }))
}
