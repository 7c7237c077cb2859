use crate::Error;

/// Class file format version
///
/// The two 16-bit half-words at the front of the class file, combined into
/// one 32-bit number for comparisons and diagnostics.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.1
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// Oldest version accepted (JDK 1.0.2 era, the CLDC baseline)
    pub const OLDEST: Version = Version {
        major: 45,
        minor: 0,
    };

    /// Newest version accepted (Java 8; later formats need constant kinds
    /// this subset rejects anyway)
    pub const NEWEST: Version = Version {
        major: 52,
        minor: 0,
    };

    /// Combined `(major << 16) | minor` form
    pub fn combined(self) -> u32 {
        (u32::from(self.major) << 16) | u32::from(self.minor)
    }

    /// Look up the decoded half-words in the known version table
    pub fn from_raw(major: u16, minor: u16) -> Result<Version, Error> {
        let version = Version { major, minor };
        // Major 45 allows any minor (1.0/1.1 used 45.0 through 45.65535);
        // everything after that is only known with minor 0
        let known = match major {
            45 => true,
            46..=52 => minor == 0,
            _ => false,
        };
        if !known {
            return Err(Error::UnsupportedVersion(version.combined()));
        }
        Ok(version)
    }
}
