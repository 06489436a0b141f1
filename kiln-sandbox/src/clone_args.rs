/// Arguments to the `clone3` system call.
///
/// This struct is not part of the `libc` crate, so it is reproduced
/// here verbatim from `linux/sched.h`'s `struct clone_args`.
#[repr(C)]
pub(crate) struct CloneArgs
{
    pub flags:        u64,
    pub pidfd:        u64,
    pub child_tid:    u64,
    pub parent_tid:   u64,
    pub exit_signal:  u64,
    pub stack:        u64,
    pub stack_size:   u64,
    pub tls:          u64,
    pub set_tid:      u64,
    pub set_tid_size: u64,
    pub cgroup:       u64,
}
