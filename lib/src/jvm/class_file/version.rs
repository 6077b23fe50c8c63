use super::Serialize;
use byteorder::WriteBytesExt;
use std::io::Result;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// Java SE 7, the first version whose verifier type-checks `StackMapTable` frames
    pub const JAVA7: Version = Version::major(51);

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version::major(52);

    /// Java SE 11
    pub const JAVA11: Version = Version::major(55);

    /// Java SE 17
    pub const JAVA17: Version = Version::major(61);

    pub const fn major(major_version: u16) -> Version {
        Version {
            minor_version: 0,
            major_version,
        }
    }

    /// Version matching a Java SE release number (`8`, `11`, `17`, ...)
    ///
    /// Only releases that require `StackMapTable` frames (Java 7 and later) are accepted.
    pub fn from_release(release: u16) -> Option<Version> {
        if (7..=99).contains(&release) {
            Some(Version::major(release + 44))
        } else {
            None
        }
    }
}

impl Version {
    /// Can classes of this version carry the `StackMapTable` frames the compiler emits?
    pub fn has_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA7.major_version
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::JAVA8
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases() {
        assert_eq!(Version::from_release(8), Some(Version::JAVA8));
        assert_eq!(Version::from_release(17), Some(Version::JAVA17));
        assert_eq!(Version::from_release(6), None);
        assert!(Version::JAVA7.has_stack_map_frames());
        assert!(!Version::major(50).has_stack_map_frames());

        let mut bytes = vec![];
        Version::JAVA11.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, [0, 0, 0, 55]);
    }
}
