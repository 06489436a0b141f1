use os_ext::{
    CLONE_NEWCGROUP, CLONE_NEWIPC, CLONE_NEWNET, CLONE_NEWNS,
    CLONE_NEWPID, CLONE_NEWUSER, CLONE_NEWUTS,
};

bitflags::bitflags! {
    /// Linux namespaces to unshare when spawning a command.
    ///
    /// Each flag corresponds to one `CLONE_NEW*` flag accepted by
    /// clone3(2). The bit values are the kernel's own, so this type
    /// can be passed straight into the `clone_args` flags field.
    pub struct Namespaces: u64
    {
        /// `CLONE_NEWCGROUP`.
        const CGROUP = CLONE_NEWCGROUP as u64;
        /// `CLONE_NEWIPC`.
        const IPC    = CLONE_NEWIPC as u64;
        /// `CLONE_NEWNET`.
        const NET    = CLONE_NEWNET as u64;
        /// `CLONE_NEWNS`.
        const MOUNT  = CLONE_NEWNS as u64;
        /// `CLONE_NEWPID`.
        const PID    = CLONE_NEWPID as u64;
        /// `CLONE_NEWUSER`.
        const USER   = CLONE_NEWUSER as u64;
        /// `CLONE_NEWUTS`.
        const UTS    = CLONE_NEWUTS as u64;

        /// All seven namespaces, the usual full isolation for a hermetic action.
        const ALL = Self::CGROUP.bits | Self::IPC.bits | Self::NET.bits
                  | Self::MOUNT.bits | Self::PID.bits | Self::USER.bits
                  | Self::UTS.bits;
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn all_contains_every_flag()
    {
        for flag in [
            Namespaces::CGROUP, Namespaces::IPC, Namespaces::NET,
            Namespaces::MOUNT, Namespaces::PID, Namespaces::USER,
            Namespaces::UTS,
        ] {
            assert!(Namespaces::ALL.contains(flag));
        }
    }
}
