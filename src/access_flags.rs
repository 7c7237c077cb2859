use crate::Error;
use bitflags::bitflags;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// At most one of public/private/protected may be set
fn check_visibility(bits: u16) -> Result<(), Error> {
    let vis = bits & 0x0007;
    if vis.count_ones() > 1 {
        return Err(Error::ConflictingVisibility { bits });
    }
    Ok(())
}

impl ClassAccessFlags {
    /// Decode and validate a raw class flag field
    ///
    /// The structural rules are invariants of the input format: an interface
    /// must be abstract and must not be final, enum, or super-special; an
    /// annotation must be an interface; a plain class cannot be both
    /// abstract and final. Any violation fails construction.
    pub fn parse(bits: u16) -> Result<ClassAccessFlags, Error> {
        let flags =
            ClassAccessFlags::from_bits(bits).ok_or(Error::UnknownFlagBits { bits })?;

        if flags.contains(ClassAccessFlags::INTERFACE) {
            if !flags.contains(ClassAccessFlags::ABSTRACT) {
                return Err(Error::InterfaceNotAbstract { bits });
            }
            if flags.intersects(
                ClassAccessFlags::FINAL | ClassAccessFlags::SUPER | ClassAccessFlags::ENUM,
            ) {
                return Err(Error::InterfaceBadModifiers { bits });
            }
        } else {
            if flags.contains(ClassAccessFlags::ANNOTATION) {
                return Err(Error::AnnotationNotInterface { bits });
            }
            if flags.contains(ClassAccessFlags::ABSTRACT | ClassAccessFlags::FINAL) {
                return Err(Error::AbstractFinalClass { bits });
            }
        }
        Ok(flags)
    }

    pub fn is_interface(self) -> bool {
        self.contains(ClassAccessFlags::INTERFACE)
    }
}

impl FieldAccessFlags {
    /// Decode and validate a raw field flag field, in the context of the
    /// flags of the class that declares it
    pub fn parse(bits: u16, class: ClassAccessFlags) -> Result<FieldAccessFlags, Error> {
        let flags =
            FieldAccessFlags::from_bits(bits).ok_or(Error::UnknownFlagBits { bits })?;
        check_visibility(bits)?;

        if flags.contains(FieldAccessFlags::FINAL | FieldAccessFlags::VOLATILE) {
            return Err(Error::FinalVolatileField { bits });
        }

        // Interface fields are constants: public static final, nothing else
        // besides synthetic
        if class.is_interface() {
            let required = FieldAccessFlags::PUBLIC
                | FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL;
            let allowed = required | FieldAccessFlags::SYNTHETIC;
            if !flags.contains(required) || !allowed.contains(flags) {
                return Err(Error::BadInterfaceField { bits });
            }
        }
        Ok(flags)
    }
}

impl MethodAccessFlags {
    /// Decode and validate a raw method flag field, in the context of the
    /// flags of the class that declares it
    pub fn parse(bits: u16, class: ClassAccessFlags) -> Result<MethodAccessFlags, Error> {
        let flags =
            MethodAccessFlags::from_bits(bits).ok_or(Error::UnknownFlagBits { bits })?;
        check_visibility(bits)?;

        if flags.contains(MethodAccessFlags::ABSTRACT)
            && flags.intersects(
                MethodAccessFlags::PRIVATE
                    | MethodAccessFlags::STATIC
                    | MethodAccessFlags::FINAL
                    | MethodAccessFlags::SYNCHRONIZED
                    | MethodAccessFlags::NATIVE
                    | MethodAccessFlags::STRICT,
            )
        {
            return Err(Error::BadAbstractMethod { bits });
        }

        if class.is_interface()
            && !flags.contains(MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT)
        {
            return Err(Error::BadInterfaceMethod { bits });
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_must_be_abstract() {
        let err = ClassAccessFlags::parse(0x0200).unwrap_err();
        assert_eq!(err.code(), "FL02");
    }

    #[test]
    fn interface_cannot_be_final_enum_or_super() {
        for extra in [0x0010u16, 0x4000, 0x0020] {
            let err = ClassAccessFlags::parse(0x0200 | 0x0400 | extra).unwrap_err();
            assert_eq!(err.code(), "FL03");
        }
    }

    #[test]
    fn annotation_requires_interface() {
        let err = ClassAccessFlags::parse(0x2000).unwrap_err();
        assert_eq!(err.code(), "FL04");
    }

    #[test]
    fn abstract_final_class_rejected() {
        let err = ClassAccessFlags::parse(0x0400 | 0x0010).unwrap_err();
        assert_eq!(err.code(), "FL05");
    }

    #[test]
    fn ordinary_class_flags_pass() {
        let flags = ClassAccessFlags::parse(0x0021).unwrap();
        assert!(flags.contains(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER));
    }

    #[test]
    fn interface_field_must_be_public_static_final() {
        let iface = ClassAccessFlags::parse(0x0600).unwrap();
        assert!(FieldAccessFlags::parse(0x0019, iface).is_ok());
        let err = FieldAccessFlags::parse(0x0009, iface).unwrap_err();
        assert_eq!(err.code(), "FL07");
    }

    #[test]
    fn conflicting_visibility_rejected() {
        let class = ClassAccessFlags::parse(0x0021).unwrap();
        let err = MethodAccessFlags::parse(0x0003, class).unwrap_err();
        assert_eq!(err.code(), "FL06");
    }

    #[test]
    fn abstract_native_method_rejected() {
        let class = ClassAccessFlags::parse(0x0021).unwrap();
        let err = MethodAccessFlags::parse(0x0400 | 0x0100, class).unwrap_err();
        assert_eq!(err.code(), "FL0a");
    }
}
