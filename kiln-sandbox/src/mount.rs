use std::{borrow::Cow, ffi::CStr, path::Path};

/// One `mount(2)` call to perform inside the child, before `chroot`.
///
/// All five fields mirror the five arguments to `mount(2)` directly;
/// `source`, `target`, `fstype`, and `data` may be absent, matching
/// `mount(2)`'s acceptance of `NULL` for those arguments. Targets are
/// relative to the sandbox root as seen from inside the child (i.e.
/// relative to the scratch directory, before `chroot` takes effect).
#[derive(Clone, Debug, Default)]
pub struct Mount
{
    /// Source path or pseudo-filesystem name (e.g. `"proc"`, `"none"`).
    pub source: Option<Cow<'static, CStr>>,
    /// Target path, relative to the pre-chroot root.
    pub target: Option<Cow<'static, CStr>>,
    /// Filesystem type, e.g. `"proc"`. `None` for bind mounts.
    pub fstype: Option<Cow<'static, CStr>>,
    /// Mount flags, e.g. `MS_BIND | MS_REC`.
    pub flags: libc::c_ulong,
    /// Filesystem-specific data string. Rarely used by this crate.
    pub data: Option<Cow<'static, CStr>>,
}

impl Mount
{
    /// Build a read-only bind mount of `source` at `target`.
    ///
    /// Passing `MS_BIND | MS_RDONLY` to a single `mount(2)` call is
    /// silently ignored by the kernel; a bind mount can only be made
    /// read-only by a second remount call. This constructor returns
    /// both calls, in the order they must be applied.
    pub fn read_only_bind(source: &Path, target: &Path) -> [Self; 2]
    {
        let source = path_to_cow_cstr(source);
        let target = path_to_cow_cstr(target);
        let common_flags = libc::MS_BIND | libc::MS_REC;
        [
            Self{
                source: Some(source),
                target: Some(target.clone()),
                flags: common_flags,
                ..Self::default()
            },
            Self{
                source: Some(Cow::Borrowed(c"none")),
                target: Some(target),
                flags: common_flags | libc::MS_RDONLY | libc::MS_REMOUNT,
                ..Self::default()
            },
        ]
    }

    /// Build the mount that makes the root of the mount namespace
    /// private, so that subsequent mounts do not propagate outward.
    pub fn make_root_private() -> Self
    {
        Self{
            source: Some(Cow::Borrowed(c"none")),
            target: Some(Cow::Borrowed(c"/")),
            flags: libc::MS_PRIVATE | libc::MS_REC,
            ..Self::default()
        }
    }

    /// Build the mount of a fresh procfs at `target` (relative path).
    pub fn procfs(target: &Path) -> Self
    {
        Self{
            source: Some(Cow::Borrowed(c"proc")),
            target: Some(path_to_cow_cstr(target)),
            fstype: Some(Cow::Borrowed(c"proc")),
            flags: libc::MS_NODEV | libc::MS_NOEXEC | libc::MS_NOSUID,
            ..Self::default()
        }
    }
}

fn path_to_cow_cstr(path: &Path) -> Cow<'static, CStr>
{
    use std::{ffi::CString, os::unix::ffi::OsStrExt};
    Cow::Owned(
        CString::new(path.as_os_str().as_bytes())
            .expect("mount path must not contain an interior nul"),
    )
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn read_only_bind_has_two_steps()
    {
        let mounts = Mount::read_only_bind(Path::new("/nix/store"), Path::new("nix/store"));
        assert_eq!(mounts[0].flags, libc::MS_BIND | libc::MS_REC);
        assert_eq!(
            mounts[1].flags,
            libc::MS_BIND | libc::MS_REC | libc::MS_RDONLY | libc::MS_REMOUNT,
        );
        assert_eq!(mounts[1].source.as_deref(), Some(c"none"));
    }
}
