//! Reading the class file format: raw bytes through to a structurally
//! validated class and its link table

mod attribute;
mod class;
pub mod constant_pool;
mod field;
mod method;
mod names;
mod reader;
mod version;

pub use attribute::*;
pub use class::*;
pub use constant_pool::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantPool, MemberParts,
    NameAndTypeConstantIndex, Utf8ConstantIndex,
};
pub use field::*;
pub use method::*;
pub use names::*;
pub use reader::*;
pub use version::*;
