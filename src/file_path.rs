use std::{
    ffi::{CString, OsStr},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use serde::{Deserialize, Serialize};
use zbus::zvariant::Type;

/// A file name represented as a nul-terminated byte array.
#[derive(Type, Debug, Default, Clone, PartialEq, Eq)]
#[zvariant(signature = "ay")]
pub struct FilePath(CString);

impl AsRef<Path> for FilePath {
    fn as_ref(&self) -> &Path {
        OsStr::from_bytes(self.0.as_bytes()).as_ref()
    }
}

impl FilePath {
    pub(crate) fn new<T: AsRef<Path>>(s: T) -> Result<Self, crate::Error> {
        let c_string = CString::new(s.as_ref().as_os_str().as_bytes())
            .map_err(|err| crate::Error::NulTerminated(err.nul_position()))?;

        Ok(Self(c_string))
    }
}

impl Serialize for FilePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.0.as_bytes_with_nul())
    }
}

impl<'de> Deserialize<'de> for FilePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        let c_string = CString::from_vec_with_nul(bytes)
            .map_err(|_| serde::de::Error::custom("Bytes are not nul-terminated"))?;

        Ok(Self(c_string))
    }
}

#[cfg(test)]
mod tests {
    use zbus::zvariant::{serialized::Context, to_bytes, LE};

    use super::*;

    #[test]
    fn serialized_with_the_nul_byte() {
        let ctxt = Context::new_dbus(LE, 0);
        let path = FilePath::new("abc").unwrap();
        let encoded = to_bytes(ctxt, &path).unwrap();
        let expected = to_bytes(ctxt, &vec![97u8, 98, 99, 0]).unwrap();
        assert_eq!(encoded.bytes(), expected.bytes());
        assert_eq!(path.as_ref(), Path::new("abc"));
    }

    #[test]
    fn rejects_inner_nul() {
        assert!(matches!(
            FilePath::new("a\0b"),
            Err(crate::Error::NulTerminated(1))
        ));
    }
}
