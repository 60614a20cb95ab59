//! Foreground process-group tracking and signal forwarding.
//!
//! The shell never hands the terminal to its children. Instead it keeps the
//! process group it is currently blocked on in a [`ForegroundGroup`] and
//! installs handlers for `SIGINT`, `SIGTSTP` and `SIGQUIT` that re-send the
//! signal to that group. While no group is published the handlers do nothing,
//! so the shell survives a stray Ctrl-C between prompts.

use anyhow::{Context, Result};
use log::{debug, info};
use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::cell::RefCell;
use std::sync::atomic::{AtomicI32, Ordering};

/// Signals typed at the terminal that are forwarded to the foreground group.
pub const FORWARDED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGQUIT];

/// Holds the id of the process group the shell is waiting on, 0 meaning none.
///
/// Every method is a single atomic load or store and is therefore
/// async-signal-safe.
#[derive(Debug)]
pub struct ForegroundGroup {
    pgid: AtomicI32,
}

impl ForegroundGroup {
    pub const fn new() -> Self {
        Self {
            pgid: AtomicI32::new(0),
        }
    }

    pub fn publish(&self, pgid: Pid) {
        self.pgid.store(pgid.as_raw(), Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.pgid.store(0, Ordering::SeqCst);
    }

    pub fn current(&self) -> Option<Pid> {
        match self.pgid.load(Ordering::Relaxed) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }
}

impl Default for ForegroundGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// The group read by the installed signal handlers.
pub static FOREGROUND: ForegroundGroup = ForegroundGroup::new();

extern "C" fn forward_signal(signo: c_int) {
    let Some(pgid) = FOREGROUND.current() else {
        return;
    };
    if let Ok(sig) = Signal::try_from(signo) {
        // negative pid addresses the whole group
        let _ = signal::kill(Pid::from_raw(-pgid.as_raw()), sig);
    }
}

/// Installs the forwarding handlers for [`FORWARDED_SIGNALS`].
///
/// Handlers are installed with `SA_RESTART` so a blocking `waitpid` resumes
/// after the signal has been passed on. Children get the default dispositions
/// back when they exec.
pub fn install_signal_forwarding() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(forward_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in FORWARDED_SIGNALS {
        // SAFETY: the handler only performs an atomic load and kill(2).
        unsafe { signal::sigaction(sig, &action) }
            .with_context(|| format!("installing handler for {}", sig.as_str()))?;
    }
    debug!("forwarding {FORWARDED_SIGNALS:?} to the foreground group");
    Ok(())
}

/// Marks a group as foreground for as long as the guard lives.
#[must_use = "the group is cleared as soon as the guard is dropped"]
pub struct ForegroundGuard<'a> {
    group: &'a ForegroundGroup,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        self.group.clear();
    }
}

#[derive(Debug)]
struct BackgroundJob {
    pgid: Pid,
    pending: Vec<Pid>,
}

/// Job-control state owned by the shell driver and lent to the orchestrator.
///
/// Background groups are remembered only so their processes can be reaped;
/// there is no job table and no way to bring a job back to the foreground.
pub struct JobControl {
    foreground: &'static ForegroundGroup,
    background: RefCell<Vec<BackgroundJob>>,
}

impl JobControl {
    /// Job control publishing foreground groups to `foreground`.
    ///
    /// The installed signal handlers read only [`FOREGROUND`]; with any other
    /// group nothing is forwarded. The shell itself uses
    /// [`JobControl::default`].
    pub fn new(foreground: &'static ForegroundGroup) -> Self {
        Self {
            foreground,
            background: RefCell::new(Vec::new()),
        }
    }

    pub fn foreground(&self) -> &ForegroundGroup {
        self.foreground
    }

    /// Publishes `pgid` until the returned guard is dropped, whatever way the
    /// wait in between ends.
    pub fn enter_foreground(&self, pgid: Pid) -> ForegroundGuard<'_> {
        debug!("foreground group {pgid}");
        self.foreground.publish(pgid);
        ForegroundGuard {
            group: self.foreground,
        }
    }

    pub(crate) fn track_background(&self, pgid: Pid, members: Vec<Pid>) {
        self.background.borrow_mut().push(BackgroundJob {
            pgid,
            pending: members,
        });
    }

    /// Number of background groups that still have unreaped members.
    pub fn background_jobs(&self) -> usize {
        self.background.borrow().len()
    }

    /// Ids of the background groups not yet reaped.
    pub fn pending_groups(&self) -> Vec<Pid> {
        self.background.borrow().iter().map(|job| job.pgid).collect()
    }

    /// Collects finished background processes without blocking.
    ///
    /// Returns the ids of the groups whose members have all exited.
    pub fn reap_background(&self) -> Vec<Pid> {
        let mut jobs = self.background.borrow_mut();
        let mut finished = Vec::new();

        jobs.retain_mut(|job| {
            job.pending.retain(|&pid| !try_reap(pid));
            if job.pending.is_empty() {
                info!("background group {} finished", job.pgid);
                finished.push(job.pgid);
                false
            } else {
                true
            }
        });

        finished
    }
}

impl Default for JobControl {
    /// Job control bound to the group the signal handlers forward to.
    fn default() -> Self {
        Self::new(&FOREGROUND)
    }
}

/// Returns true once `pid` is gone.
fn try_reap(pid: Pid) -> bool {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => true,
        Ok(_) => false,
        Err(Errno::ECHILD) => true,
        Err(e) => {
            debug!("waitpid({pid}) while reaping: {e}");
            false
        }
    }
}
