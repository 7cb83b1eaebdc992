//! Opens files named in the core's file table. Those paths were recorded inside the
//! prefix's overlay mount so, when run from outside it, the file has to be found in
//! the lower layer instead.
use crate::macho::{MACH_HEADER_SIZE, MachHeader};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

pub struct FileResolver {
    prefix: String,
    alternate_root: PathBuf,
}

impl FileResolver {
    pub fn new(prefix: impl Into<String>, alternate_root: impl Into<PathBuf>) -> Self {
        FileResolver {
            prefix: prefix.into(),
            alternate_root: alternate_root.into(),
        }
    }

    /// Tries path as is and then, if it is within the prefix, within the alternate root.
    pub fn open(&self, path: &str) -> io::Result<File> {
        match File::open(path) {
            Ok(file) => Ok(file),
            Err(err) => match self.alternate(path) {
                Some(alternate) => File::open(alternate),
                None => Err(err),
            },
        }
    }

    /// Where path would be if the prefix was replaced with the alternate root.
    pub fn alternate(&self, path: &str) -> Option<PathBuf> {
        if self.prefix.is_empty() {
            return None;
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        Some(self.alternate_root.join(rest.trim_start_matches('/')))
    }

    /// The leading Mach-O header of path, if it can be opened and has one.
    pub fn read_mach_header(&self, path: &str) -> Option<MachHeader> {
        let mut file = self.open(path).ok()?;
        let mut bytes = [0u8; MACH_HEADER_SIZE];
        file.read_exact(&mut bytes).ok()?;
        MachHeader::parse(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn alternate_paths() {
        let resolver = FileResolver::new("/home/me/.darling", "/usr/libexec/darling");
        assert_eq!(
            resolver.alternate("/home/me/.darling/usr/lib/libSystem.B.dylib"),
            Some(PathBuf::from("/usr/libexec/darling/usr/lib/libSystem.B.dylib"))
        );
        assert_eq!(resolver.alternate("/usr/lib/libc.so.6"), None);

        let resolver = FileResolver::new("", "/usr/libexec/darling");
        assert_eq!(resolver.alternate("/usr/lib/libc.so.6"), None);
    }

    #[test]
    fn opens_direct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct");
        fs::write(&path, b"direct").unwrap();

        let resolver = FileResolver::new("/nonexistent/prefix", dir.path());
        let mut contents = String::new();
        resolver
            .open(path.to_str().unwrap())
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "direct");
    }

    #[test]
    fn falls_back_to_alternate_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("usr/lib")).unwrap();
        fs::write(root.path().join("usr/lib/libfoo.dylib"), b"lower layer").unwrap();

        let resolver = FileResolver::new("/nonexistent/prefix", root.path());
        let mut contents = String::new();
        resolver
            .open("/nonexistent/prefix/usr/lib/libfoo.dylib")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "lower layer");

        assert!(resolver.open("/nonexistent/prefix/usr/lib/missing.dylib").is_err());
        assert!(resolver.open("/nonexistent/elsewhere/libfoo.dylib").is_err());
    }

    #[test]
    fn mach_headers() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("exe");
        let mut bytes = Vec::new();
        MachHeader {
            cpu_type: 0x01000007,
            cpu_subtype: 3,
            filetype: crate::macho::MH_EXECUTE,
            ncmds: 0,
            sizeofcmds: 0,
            flags: 0x200085,
        }
        .write_to(&mut bytes);
        fs::write(&exe, &bytes).unwrap();
        let short = dir.path().join("short");
        fs::write(&short, &bytes[..16]).unwrap();

        let resolver = FileResolver::new("/nowhere", dir.path());
        let header = resolver.read_mach_header(exe.to_str().unwrap()).unwrap();
        assert_eq!(header.flags, 0x200085);
        assert!(resolver.read_mach_header(short.to_str().unwrap()).is_none());
        assert!(resolver.read_mach_header("/nonexistent/exe").is_none());
    }
}
