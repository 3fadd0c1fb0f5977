//! Translation between POSIX mode bits, a language-neutral file mode
//! representation, and ZIP external-attribute words.

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;

const DEFAULT_FILE_MODE: u32 = 0o100644;
const DEFAULT_DIR_MODE: u32 = 0o040755;

/// A POSIX `mode_t`-shaped value: file-type bits plus permission bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct StatMode(u32);

impl StatMode {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn regular_file(perm: u32) -> Self {
        Self(S_IFREG | (perm & 0o7777))
    }

    pub fn directory(perm: u32) -> Self {
        Self(S_IFDIR | (perm & 0o7777))
    }

    pub fn symlink() -> Self {
        Self(S_IFLNK | 0o777)
    }

    pub fn is_dir(self) -> bool {
        self.0 & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(self) -> bool {
        self.0 & S_IFMT == S_IFLNK
    }

    pub fn is_regular(self) -> bool {
        self.0 & S_IFMT == S_IFREG
    }

    pub fn permissions(self) -> u32 {
        self.0 & 0o7777
    }

    /// Ors in the owner/group/other execute bits, leaving the rest untouched.
    #[must_use]
    pub fn set_executable_bits(self) -> Self {
        Self(self.0 | 0o111)
    }

    /// Extracts a mode from a ZIP entry's external attributes, assuming the
    /// archive was written on a Unix host (the high 16 bits hold the POSIX
    /// mode in that case). Falls back to a sane default for archives written
    /// by tooling that never set the Unix bits.
    pub fn from_zip_external_attr(attr: u32) -> Self {
        let unix = attr >> 16;
        if unix & S_IFMT == 0 {
            Self(DEFAULT_FILE_MODE)
        } else {
            Self(unix)
        }
    }

    pub fn to_zip_external_attr(self) -> u32 {
        self.0 << 16
    }

    pub fn from_tar_header(header: &tar::Header) -> Self {
        let mode = header.mode().unwrap_or(0o644);
        match header.entry_type() {
            tar::EntryType::Directory => Self::directory(mode),
            tar::EntryType::Symlink => Self::symlink(),
            _ => Self::regular_file(mode),
        }
    }

    pub fn apply_to_tar_header(self, header: &mut tar::Header) {
        header.set_mode(self.permissions());
        header.set_entry_type(if self.is_dir() {
            tar::EntryType::Directory
        } else if self.is_symlink() {
            tar::EntryType::Symlink
        } else {
            tar::EntryType::Regular
        });
    }
}

impl Default for StatMode {
    fn default() -> Self {
        Self(DEFAULT_FILE_MODE)
    }
}

impl From<u32> for StatMode {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_roundtrip() {
        let mode = StatMode::regular_file(0o644);
        let attr = mode.to_zip_external_attr();
        assert_eq!(StatMode::from_zip_external_attr(attr), mode);
    }

    #[test]
    fn zip_missing_unix_bits_falls_back() {
        let mode = StatMode::from_zip_external_attr(0);
        assert!(mode.is_regular());
        assert_eq!(mode.permissions(), 0o644);
    }

    #[test]
    fn executable_bits() {
        let mode = StatMode::regular_file(0o644).set_executable_bits();
        assert_eq!(mode.permissions(), 0o755);
    }

    #[test]
    fn dir_and_symlink_predicates() {
        assert!(StatMode::directory(0o755).is_dir());
        assert!(StatMode::symlink().is_symlink());
        assert!(StatMode::regular_file(0o644).is_regular());
    }
}
