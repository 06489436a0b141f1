//! Working with state directories.

use {
    kiln_util::hash::{Hash, hash_file_at},
    os_ext::{
        O_DIRECTORY, O_PATH, RENAME_NOREPLACE,
        mkdirat, open, openat, renameat2,
    },
    std::{
        io::{self, ErrorKind::AlreadyExists},
        os::unix::io::{AsFd, BorrowedFd, OwnedFd},
        path::{Path, PathBuf},
        sync::{OnceLock, atomic::{AtomicU32, Ordering::SeqCst}},
    },
};

const SCRATCHES_DIR: &str = "scratches";
const CACHED_OUTPUTS_DIR: &str = "cached-outputs";

/// Handle to a state directory.
///
/// A state directory, typically `.kiln`, holds on-disk state for one
/// project: scratch workspaces for in-flight actions and the
/// content-addressed store of cached outputs. Most of it persists
/// across engine invocations; the scratch directories do not.
///
/// `Context` is `Sync`: the scratch counter and the two lazily-opened
/// subdirectory handles use atomics and [`OnceLock`] respectively, so
/// one `Context` can be shared by multiple concurrently running
/// actions without an external lock.
pub struct Context
{
    state_dir: OwnedFd,
    scratches_dir: OnceLock<OwnedFd>,
    cached_outputs_dir: OnceLock<OwnedFd>,
    next_scratch: AtomicU32,
}

impl Context
{
    /// Open a state directory, creating it if it does not already exist.
    ///
    /// Subdirectories of the state directory are not created eagerly;
    /// they come into existence the first time they are needed.
    pub fn open(path: &Path) -> io::Result<Self>
    {
        match std::fs::create_dir(path) {
            Ok(()) => { },
            Err(err) if err.kind() == AlreadyExists => { },
            Err(err) => return Err(err),
        }

        let state_dir = open(path, O_DIRECTORY | O_PATH, 0)?;

        Ok(Self{
            state_dir,
            scratches_dir: OnceLock::new(),
            cached_outputs_dir: OnceLock::new(),
            next_scratch: AtomicU32::new(0),
        })
    }

    fn scratches_dir(&self) -> io::Result<BorrowedFd>
    {
        ensure_open_dir_once(&self.scratches_dir, self.state_dir.as_fd(), SCRATCHES_DIR)
    }

    fn cached_outputs_dir(&self) -> io::Result<BorrowedFd>
    {
        ensure_open_dir_once(&self.cached_outputs_dir, self.state_dir.as_fd(), CACHED_OUTPUTS_DIR)
    }

    /// Create and open a fresh scratch directory.
    ///
    /// The scratch directory starts out empty and is named after a
    /// monotonically increasing counter, unique for this `Context`'s
    /// lifetime (not across restarts; scratch directories are meant
    /// to be cleaned up externally between engine invocations).
    pub fn new_scratch_dir(&self) -> io::Result<OwnedFd>
    {
        let scratches_dir = self.scratches_dir()?;
        let id = self.next_scratch.fetch_add(1, SeqCst);
        let path = PathBuf::from(id.to_string());
        mkdirat(Some(scratches_dir), &path, 0o755)?;
        openat(Some(scratches_dir), &path, O_DIRECTORY | O_PATH, 0)
    }

    /// Atomically install a file as a cache entry named by its hash.
    ///
    /// `(from_dirfd, from_path)` is renamed into the cached-outputs
    /// directory under the lowercase hex of `hash`. If an entry with
    /// that name already exists, this is treated as success (it must
    /// have identical content, by construction of content addressing)
    /// rather than an error.
    ///
    /// In debug builds, the precondition `hash_file_at(from_dirfd,
    /// from_path) == hash` is checked before the rename.
    pub fn store_cached_output(
        &self,
        hash: Hash,
        from_dirfd: Option<BorrowedFd>,
        from_path: &Path,
    ) -> io::Result<()>
    {
        debug_assert_eq!(
            hash_file_at(from_dirfd, from_path).ok(),
            Some(hash),
            "store_cached_output called with a hash that does not match its file",
        );

        let cached_outputs_dir = self.cached_outputs_dir()?;
        let target = PathBuf::from(hash.to_string());

        match renameat2(
            from_dirfd,
            from_path,
            Some(cached_outputs_dir),
            &target,
            RENAME_NOREPLACE,
        ) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == AlreadyExists => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn ensure_open_dir_once<'a>(
    cell: &'a OnceLock<OwnedFd>,
    state_dir: BorrowedFd,
    path: &str,
) -> io::Result<BorrowedFd<'a>>
{
    if let Some(fd) = cell.get() {
        return Ok(fd.as_fd());
    }

    let path = Path::new(path);
    match mkdirat(Some(state_dir), path, 0o755) {
        Ok(()) => { },
        Err(err) if err.kind() == AlreadyExists => { },
        Err(err) => return Err(err),
    }
    let fd = openat(Some(state_dir), path, O_DIRECTORY | O_PATH, 0)?;

    // If another thread raced us, keep whichever one won; both FDs
    // refer to the same directory, so either is equally valid to use.
    Ok(cell.get_or_init(|| fd).as_fd())
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        os_ext::{O_CREAT, O_WRONLY, mkdtemp, readlink},
        scope_exit::scope_exit,
        std::{ffi::CString, fs::remove_dir_all, os::unix::{ffi::OsStrExt, io::AsRawFd}},
    };

    fn temp_dir() -> PathBuf
    {
        let template = CString::new("/tmp/kiln-test-XXXXXX").unwrap();
        let path = mkdtemp(template).unwrap();
        PathBuf::from(std::ffi::OsString::from_vec(path.into_bytes()))
    }

    #[test]
    fn new_scratch_dir_numbers_sequentially()
    {
        let path = temp_dir();
        scope_exit! { let _ = remove_dir_all(&path); }

        let context = Context::open(&path).unwrap();
        let scratch_0 = context.new_scratch_dir().unwrap();
        let scratch_1 = context.new_scratch_dir().unwrap();

        let magic = |fd: BorrowedFd| format!("/proc/self/fd/{}", fd.as_raw_fd());
        let path_0 = readlink(Path::new(&magic(scratch_0.as_fd()))).unwrap();
        let path_1 = readlink(Path::new(&magic(scratch_1.as_fd()))).unwrap();

        assert_eq!(path_0.as_bytes(), path.join("scratches/0").as_os_str().as_bytes());
        assert_eq!(path_1.as_bytes(), path.join("scratches/1").as_os_str().as_bytes());

        openat(Some(scratch_0.as_fd()), Path::new("build.log"), O_CREAT | O_WRONLY, 0o644)
            .unwrap();
    }

    #[test]
    fn store_cached_output_dedupes_on_eexist()
    {
        let path = temp_dir();
        scope_exit! { let _ = remove_dir_all(&path); }

        let context = Context::open(&path).unwrap();
        let scratch = context.new_scratch_dir().unwrap();

        let write_m_o = || {
            let fd = openat(
                Some(scratch.as_fd()), Path::new("m.o"),
                O_CREAT | O_WRONLY | libc::O_TRUNC, 0o644,
            ).unwrap();
            use std::io::Write;
            std::fs::File::from(fd).write_all(b"hi\n").unwrap();
        };

        write_m_o();
        let hash = hash_file_at(Some(scratch.as_fd()), "m.o").unwrap();
        context.store_cached_output(hash, Some(scratch.as_fd()), Path::new("m.o")).unwrap();

        // Installing the same content again must not fail.
        write_m_o();
        context.store_cached_output(hash, Some(scratch.as_fd()), Path::new("m.o")).unwrap();

        let cache_path = path.join("cached-outputs").join(hash.to_string());
        assert!(cache_path.is_file());
    }
}
