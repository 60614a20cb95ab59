//! Process creation for external commands: fork, process-group membership,
//! pipe and file wiring, exec and wait.
//!
//! A run of `N` stages is launched as one process group whose id is the pid of
//! the first stage. Every child joins the group before touching any descriptor,
//! so a signal addressed to the group reaches it no matter how far it got.
//! Everything a child needs (C strings, the `argv` pointer array, error
//! prefixes, the descriptors to close) is prepared in the parent, so the child
//! makes system calls without allocating.

use crate::command::{Completion, ExitCode};
use crate::job_control::JobControl;
use crate::parser::CommandLine;
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl, open};
use nix::libc::{self, c_char};
use nix::sys::signal::{Signal, killpg};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, fork, pipe, setpgid};
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

/// Exit status of a child whose program image could not be replaced.
pub const EXIT_EXEC_FAILED: ExitCode = 127;
/// Exit status of a child that could not open one of its redirection files.
pub const EXIT_REDIRECT_FAILED: ExitCode = 1;

pub(crate) const SHELL_NAME: &str = "teamshell";

/// A stage converted into the form `execvp` wants, built before forking.
struct PreparedStage {
    argv: Vec<CString>,
    /// Null-terminated pointers into `argv`, the array `execvp(3)` takes.
    argv_ptrs: Vec<*const c_char>,
    input: Option<CString>,
    output: Option<CString>,
    /// `"teamshell: <program>"`, used for exec failures.
    label: Vec<u8>,
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).with_context(|| format!("{s:?} contains a NUL byte"))
}

impl PreparedStage {
    fn new(cl: &CommandLine) -> Result<Self> {
        if cl.argv.is_empty() {
            return Err(anyhow!("empty command"));
        }
        let argv = cl
            .argv
            .iter()
            .map(|arg| to_cstring(arg))
            .collect::<Result<Vec<_>>>()?;
        let input = cl.input_file.as_deref().map(to_cstring).transpose()?;
        let output = cl.output_file.as_deref().map(to_cstring).transpose()?;
        let label = format!("{SHELL_NAME}: {}", cl.program()).into_bytes();
        // the CString heap buffers stay put when `argv` is moved
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(Self {
            argv,
            argv_ptrs,
            input,
            output,
            label,
        })
    }
}

/// Descriptors a child moves onto its standard streams, and the ones it must
/// close before exec.
struct Wiring {
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close: Vec<RawFd>,
}

/// Processes forked so far for one launch.
#[derive(Default)]
struct ProcessGroup {
    pgid: Option<Pid>,
    members: Vec<Pid>,
}

impl ProcessGroup {
    fn add(&mut self, pid: Pid) {
        self.pgid.get_or_insert(pid);
        self.members.push(pid);
    }

    /// Tears down a partially built pipeline so nothing is left running.
    fn abort(self) {
        let Some(pgid) = self.pgid else { return };
        warn!("killing partial pipeline group {pgid}");
        let _ = killpg(pgid, Signal::SIGKILL);
        for pid in self.members {
            let _ = wait_for_exit(pid);
        }
    }
}

/// Launches `stages` as one process group connected by pipes.
///
/// A single stage gets no pipes at all. In the background the group id is
/// remembered for reaping and returned right away; in the foreground the
/// group is published to `jobs` while every member is waited for, and the
/// status of the last stage is returned.
pub(crate) fn launch(
    stages: &[CommandLine],
    background: bool,
    jobs: &JobControl,
) -> Result<Completion> {
    let prepared = stages
        .iter()
        .map(PreparedStage::new)
        .collect::<Result<Vec<_>>>()?;
    if prepared.is_empty() {
        return Ok(Completion::Exited(0));
    }

    let mut group = ProcessGroup::default();
    if let Err(e) = spawn_stages(&prepared, &mut group) {
        group.abort();
        return Err(e);
    }
    let ProcessGroup { pgid, members } = group;
    let pgid = pgid.ok_or_else(|| anyhow!("no process was started"))?;

    if background {
        debug!("group {pgid} detached with members {members:?}");
        jobs.track_background(pgid, members);
        return Ok(Completion::Detached(pgid));
    }

    let _fg = jobs.enter_foreground(pgid);
    let mut status = 0;
    for pid in members {
        status = match wait_for_exit(pid) {
            Ok(code) => code,
            Err(e) => {
                warn!("waiting for {pid}: {e:#}");
                1
            }
        };
    }
    debug!("group {pgid} finished with status {status}");
    Ok(Completion::Exited(status))
}

fn spawn_stages(stages: &[PreparedStage], group: &mut ProcessGroup) -> Result<()> {
    let last = stages.len() - 1;
    let mut prev_read: Option<OwnedFd> = None;

    for (i, stage) in stages.iter().enumerate() {
        // the pipe to the next stage exists before this stage is forked
        let next = if i < last { Some(open_pipe()?) } else { None };

        let mut wiring = Wiring {
            stdin: prev_read.as_ref().map(AsRawFd::as_raw_fd),
            stdout: next.as_ref().map(|(_, w)| w.as_raw_fd()),
            close: Vec::with_capacity(3),
        };
        wiring.close.extend(wiring.stdin);
        if let Some((r, w)) = &next {
            wiring.close.push(r.as_raw_fd());
            wiring.close.push(w.as_raw_fd());
        }

        let pid = fork_stage(stage, group.pgid, &wiring)?;
        group.add(pid);
        debug!("stage {i} ({}) is pid {pid}", String::from_utf8_lossy(&stage.label));

        // Dropping closes the consumed read end and the write end just handed
        // to the child; only the read end for the next stage survives.
        prev_read = next.map(|(r, _w)| r);
    }

    Ok(())
}

fn open_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (r, w) = pipe().context("pipe")?;
    for fd in [&r, &w] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).context("pipe")?;
    }
    Ok((r, w))
}

fn fork_stage(stage: &PreparedStage, pgid: Option<Pid>, wiring: &Wiring) -> Result<Pid> {
    // SAFETY: the child only makes system calls on data prepared above and
    // leaves through exec or _exit.
    match unsafe { fork() }.context("fork")? {
        ForkResult::Child => exec_stage(stage, pgid, wiring),
        ForkResult::Parent { child } => {
            // Also done by the child; whichever runs first wins the race
            // against an early kill(-pgid).
            if let Err(e) = setpgid(child, pgid.unwrap_or(child)) {
                debug!("setpgid({child}) from parent: {e}");
            }
            Ok(child)
        }
    }
}

fn exec_stage(stage: &PreparedStage, pgid: Option<Pid>, wiring: &Wiring) -> ! {
    let _ = setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));

    if let Some(fd) = wiring.stdin {
        let _ = dup2(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = wiring.stdout {
        let _ = dup2(fd, libc::STDOUT_FILENO);
    }
    for &fd in &wiring.close {
        if fd > libc::STDERR_FILENO {
            let _ = close(fd);
        }
    }

    if let Some(path) = &stage.input {
        redirect(path, OFlag::O_RDONLY, libc::STDIN_FILENO);
    }
    if let Some(path) = &stage.output {
        redirect(
            path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            libc::STDOUT_FILENO,
        );
    }

    // SAFETY: both pointers come from `stage`, which outlives the call, and
    // `argv_ptrs` ends with a null pointer.
    unsafe { libc::execvp(stage.argv[0].as_ptr(), stage.argv_ptrs.as_ptr()) };
    let err = Errno::last();
    let reason = if err == Errno::ENOENT {
        "command not found"
    } else {
        err.desc()
    };
    write_stderr(&[&stage.label, b": ", reason.as_bytes(), b"\n"]);
    child_exit(EXIT_EXEC_FAILED)
}

/// Opens `path` onto `target`; on failure the child reports and exits.
fn redirect(path: &CStr, flags: OFlag, target: RawFd) {
    match open(path, flags, Mode::from_bits_truncate(0o644)) {
        Ok(fd) => {
            let _ = dup2(fd, target);
            if fd != target {
                let _ = close(fd);
            }
        }
        Err(e) => {
            write_stderr(&[
                SHELL_NAME.as_bytes(),
                b": ",
                path.to_bytes(),
                b": ",
                e.desc().as_bytes(),
                b"\n",
            ]);
            child_exit(EXIT_REDIRECT_FAILED)
        }
    }
}

/// Unbuffered write to fd 2 that takes no locks.
fn write_stderr(parts: &[&[u8]]) {
    // SAFETY: fd 2 is borrowed, ManuallyDrop keeps it open.
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDERR_FILENO) });
    for part in parts {
        let _ = stderr.write_all(part);
    }
}

fn child_exit(code: ExitCode) -> ! {
    // SAFETY: _exit skips the parent's atexit handlers and stdio buffers.
    unsafe { libc::_exit(code) }
}

/// Blocks until `pid` terminates and translates how it ended.
///
/// A normal exit yields its code, any other cause of termination yields 1.
pub(crate) fn wait_for_exit(pid: Pid) -> Result<ExitCode> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                debug!("{pid} terminated by {}", sig.as_str());
                return Ok(1);
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).with_context(|| format!("waitpid({pid})")),
        }
    }
}
