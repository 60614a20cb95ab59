use crate::command::ExitCode;
use crate::io_adapters::BuiltinStreams;
use crate::parser::CommandLine;
use crate::registry::BuiltinRegistry;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use log::debug;
use nix::unistd::{Gid, Group, Uid, User};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, symlink};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Status returned when a command is called without the operands it needs.
pub const EXIT_MISSING_OPERAND: ExitCode = 2;

/// File-manipulation commands run inside the shell process.
///
/// Arguments are parsed with [`argh`] (`FromArgs`). The streams are the
/// shell's own stdin/stdout unless the stage redirects them.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Name the command is registered under, e.g. "ls".
    fn name() -> &'static str;

    /// Runs the command. Return value follows shell conventions: 0 for
    /// success, non-zero for failure.
    fn execute(self, stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<ExitCode>;
}

/// Adds every builtin the shell ships with to `registry`.
pub(crate) fn register_defaults(registry: &mut BuiltinRegistry) {
    register::<Ls>(registry);
    register::<Cat>(registry);
    register::<Cp>(registry);
    register::<Mv>(registry);
    register::<Rm>(registry);
    register::<Ln>(registry);
    register::<Mkdir>(registry);
    register::<Rmdir>(registry);
    registry.register("grep", grep);
}

fn register<T: BuiltinCommand + 'static>(registry: &mut BuiltinRegistry) {
    registry.register(T::name(), run::<T>);
}

/// Parses `cl` into `T`, opens the stage's streams and runs it.
fn run<T: BuiltinCommand>(cl: &CommandLine) -> ExitCode {
    let args = split_short_flags(cl.args());
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let cmd = match T::from_args(&[T::name()], &args) {
        Ok(cmd) => cmd,
        Err(EarlyExit { output, status }) => {
            return match status {
                Ok(()) => {
                    print!("{output}");
                    0
                }
                Err(()) => {
                    eprint!("{output}");
                    1
                }
            };
        }
    };

    let result = BuiltinStreams::open(cl).and_then(|mut streams| {
        let code = cmd.execute(&mut streams.stdin, &mut streams.stdout)?;
        streams.stdout.flush()?;
        Ok(code)
    });
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {e:#}", T::name());
            1
        }
    }
}

/// Rewrites bundled short switches: `-la` becomes `-l -a`.
fn split_short_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg.strip_prefix('-') {
            Some(flags)
                if flags.len() > 1 && flags.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                out.extend(flags.chars().map(|c| format!("-{c}")));
            }
            _ => out.push(arg.clone()),
        }
    }
    out
}

fn missing_operand(name: &str) -> Result<ExitCode> {
    eprintln!("{name}: missing operand");
    Ok(EXIT_MISSING_OPERAND)
}

/// Runs `op` for each operand, reporting failures as `name: operand: error`.
///
/// Returns 1 if any operand failed, 0 otherwise.
fn for_each_operand(
    name: &str,
    operands: &[String],
    mut op: impl FnMut(&str) -> io::Result<()>,
) -> ExitCode {
    let mut status = 0;
    for operand in operands {
        if let Err(e) = op(operand) {
            eprintln!("{name}: {operand}: {e}");
            status = 1;
        }
    }
    status
}

#[derive(FromArgs)]
/// list directory contents
pub struct Ls {
    #[argh(switch, short = 'a')]
    /// do not ignore entries starting with '.'
    pub all: bool,

    #[argh(switch, short = 'l')]
    /// use a long listing format
    pub long: bool,

    #[argh(positional, greedy)]
    /// files or directories to list; the current directory when omitted
    pub paths: Vec<String>,
}

impl Ls {
    fn entries(&self, dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        if self.all {
            entries.push((".".to_string(), dir.join(".")));
            entries.push(("..".to_string(), dir.join("..")));
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.all || !name.starts_with('.') {
                entries.push((name, entry.path()));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn list_dir(&self, dir: &Path, stdout: &mut dyn Write) -> Result<()> {
        let entries = self.entries(dir)?;
        if !self.long {
            for (name, _) in &entries {
                writeln!(stdout, "{name}")?;
            }
            return Ok(());
        }

        let mut rows = Vec::with_capacity(entries.len());
        let mut blocks = 0;
        for (name, path) in &entries {
            let meta = fs::symlink_metadata(path).with_context(|| format!("{}", path.display()))?;
            blocks += meta.blocks();
            rows.push(long_row(name, path, &meta));
        }
        writeln!(stdout, "total {}", blocks / 2)?;
        for row in rows {
            writeln!(stdout, "{row}")?;
        }
        Ok(())
    }
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(self, _stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<ExitCode> {
        let paths = if self.paths.is_empty() {
            vec![".".to_string()]
        } else {
            self.paths.clone()
        };
        let show_headers = paths.len() > 1;
        let mut status = 0;

        for (i, target) in paths.iter().enumerate() {
            let path = Path::new(target);
            let meta = match fs::symlink_metadata(path) {
                Ok(meta) => meta,
                Err(e) => {
                    eprintln!("ls: {target}: {e}");
                    status = 1;
                    continue;
                }
            };

            if !fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
                if self.long {
                    writeln!(stdout, "{}", long_row(target, path, &meta))?;
                } else {
                    writeln!(stdout, "{target}")?;
                }
                continue;
            }

            if show_headers {
                if i > 0 {
                    writeln!(stdout)?;
                }
                writeln!(stdout, "{target}:")?;
            }
            if let Err(e) = self.list_dir(path, stdout) {
                eprintln!("ls: {target}: {e:#}");
                status = 1;
            }
        }
        Ok(status)
    }
}

/// One `ls -l` line: mode, link count, owner, group, size, modification
/// time and name.
fn long_row(name: &str, path: &Path, meta: &Metadata) -> String {
    let mut row = format!(
        "{} {:>3} {:<8} {:<8} {:>8} {} {}",
        mode_string(meta),
        meta.nlink(),
        user_name(meta.uid()),
        group_name(meta.gid()),
        meta.size(),
        modified_time(meta),
        name
    );
    if meta.file_type().is_symlink() {
        if let Ok(target) = fs::read_link(path) {
            row.push_str(&format!(" -> {}", target.display()));
        }
    }
    row
}

/// Local time formatted as `Jan  5 14:03`.
fn modified_time(meta: &Metadata) -> String {
    match meta.modified() {
        Ok(time) => DateTime::<Local>::from(time).format(MTIME_FORMAT).to_string(),
        Err(_) => "?".repeat(12),
    }
}

const MTIME_FORMAT: &str = "%b %e %H:%M";

fn mode_string(meta: &Metadata) -> String {
    let ft = meta.file_type();
    let kind = if ft.is_dir() {
        'd'
    } else if ft.is_symlink() {
        'l'
    } else if ft.is_char_device() {
        'c'
    } else if ft.is_block_device() {
        'b'
    } else if ft.is_fifo() {
        'p'
    } else if ft.is_socket() {
        's'
    } else {
        '-'
    };

    let mode = meta.mode();
    let mut s = String::with_capacity(10);
    s.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}

#[derive(FromArgs)]
/// concatenate files to standard output
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print; standard input when omitted
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(self, stdin: &mut dyn Read, stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.files.is_empty() {
            io::copy(stdin, stdout)?;
            return Ok(0);
        }
        let mut status = 0;
        for fname in &self.files {
            let copied = File::open(fname).and_then(|mut f| io::copy(&mut f, &mut *stdout));
            if let Err(e) = copied {
                eprintln!("cat: {fname}: {e}");
                status = 1;
            }
        }
        Ok(status)
    }
}

/// Where `source` lands when copied or moved to `dest`: inside `dest` if it
/// is a directory, `dest` itself otherwise.
fn destination_for(source: &str, dest: &Path) -> PathBuf {
    if dest.is_dir() {
        match Path::new(source).file_name() {
            Some(name) => dest.join(name),
            None => dest.to_path_buf(),
        }
    } else {
        dest.to_path_buf()
    }
}

/// Splits `operands` into sources and destination, checking that several
/// sources go into a directory.
fn sources_and_dest(operands: &[String]) -> Result<(&[String], &Path)> {
    let (dest, sources) = operands
        .split_last()
        .ok_or_else(|| anyhow!("missing operand"))?;
    let dest = Path::new(dest.as_str());
    if sources.len() > 1 && !dest.is_dir() {
        return Err(anyhow!("target '{}' is not a directory", dest.display()));
    }
    Ok((sources, dest))
}

#[derive(FromArgs)]
/// copy files
pub struct Cp {
    #[argh(positional, greedy)]
    /// source files followed by the destination file or directory
    pub operands: Vec<String>,
}

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.operands.len() < 2 {
            return missing_operand(Self::name());
        }
        let (sources, dest) = sources_and_dest(&self.operands)?;
        Ok(for_each_operand(Self::name(), sources, |src| {
            let target = destination_for(src, dest);
            debug!("cp {src} -> {}", target.display());
            let mut input = File::open(src)?;
            let mut output = File::create(&target)?;
            io::copy(&mut input, &mut output).map(drop)
        }))
    }
}

#[derive(FromArgs)]
/// move or rename files
pub struct Mv {
    #[argh(positional, greedy)]
    /// source files followed by the destination file or directory
    pub operands: Vec<String>,
}

impl BuiltinCommand for Mv {
    fn name() -> &'static str {
        "mv"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.operands.len() < 2 {
            return missing_operand(Self::name());
        }
        let (sources, dest) = sources_and_dest(&self.operands)?;
        Ok(for_each_operand(Self::name(), sources, |src| {
            fs::rename(src, destination_for(src, dest))
        }))
    }
}

#[derive(FromArgs)]
/// remove files
pub struct Rm {
    #[argh(positional, greedy)]
    /// files to remove
    pub files: Vec<String>,
}

impl BuiltinCommand for Rm {
    fn name() -> &'static str {
        "rm"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.files.is_empty() {
            return missing_operand(Self::name());
        }
        Ok(for_each_operand(Self::name(), &self.files, |f| {
            fs::remove_file(f)
        }))
    }
}

#[derive(FromArgs)]
/// make links between files
pub struct Ln {
    #[argh(switch, short = 's')]
    /// make a symbolic link instead of a hard link
    pub symbolic: bool,

    #[argh(positional, greedy)]
    /// the link target followed by the name of the new link
    pub operands: Vec<String>,
}

impl BuiltinCommand for Ln {
    fn name() -> &'static str {
        "ln"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        let [target, link] = self.operands.as_slice() else {
            if self.operands.len() < 2 {
                return missing_operand(Self::name());
            }
            return Err(anyhow!("expected a target and a link name"));
        };
        let made = if self.symbolic {
            symlink(target, link)
        } else {
            fs::hard_link(target, link)
        };
        made.with_context(|| format!("{link} -> {target}"))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// create directories
pub struct Mkdir {
    #[argh(positional, greedy)]
    /// directories to create
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Mkdir {
    fn name() -> &'static str {
        "mkdir"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.dirs.is_empty() {
            return missing_operand(Self::name());
        }
        Ok(for_each_operand(Self::name(), &self.dirs, |d| fs::create_dir(d)))
    }
}

#[derive(FromArgs)]
/// remove empty directories
pub struct Rmdir {
    #[argh(positional, greedy)]
    /// directories to remove
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Rmdir {
    fn name() -> &'static str {
        "rmdir"
    }

    fn execute(self, _stdin: &mut dyn Read, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.dirs.is_empty() {
            return missing_operand(Self::name());
        }
        Ok(for_each_operand(Self::name(), &self.dirs, |d| fs::remove_dir(d)))
    }
}

/// `grep` runs the system grep with colour forced on, unless the caller
/// chose a `--color` mode.
fn grep(cl: &CommandLine) -> ExitCode {
    let mut args: Vec<&str> = Vec::with_capacity(cl.argv.len());
    if !cl.args().iter().any(|a| a.starts_with("--color")) {
        args.push("--color=always");
    }
    args.extend(cl.args().iter().map(String::as_str));

    let status = BuiltinStreams::open(cl).and_then(|streams| {
        Command::new("grep")
            .args(&args)
            .stdin(streams.stdin.stdio())
            .stdout(streams.stdout.stdio())
            .status()
            .context("running grep")
    });
    match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            eprintln!("grep: {e:#}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "teamshell_builtin_{tag}_{}_{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn path_str(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    fn run_ls(ls: Ls) -> (ExitCode, String) {
        let mut out = Vec::new();
        let code = ls.execute(&mut Cursor::new(Vec::new()), &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_split_short_flags() {
        let args: Vec<String> = ["-la", "-s", "--long", "-", "x-y", "-1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            split_short_flags(&args),
            vec!["-l", "-a", "-s", "--long", "-", "x-y", "-1"]
        );
    }

    #[test]
    fn test_ls_hides_dot_files_unless_all() {
        let dir = make_unique_temp_dir("ls");
        fs::write(dir.join("b.txt"), "").unwrap();
        fs::write(dir.join("a.txt"), "").unwrap();
        fs::write(dir.join(".hidden"), "").unwrap();

        let (code, out) = run_ls(Ls {
            all: false,
            long: false,
            paths: vec![path_str(&dir)],
        });
        assert_eq!(code, 0);
        assert_eq!(out, "a.txt\nb.txt\n");

        let (_, out) = run_ls(Ls {
            all: true,
            long: false,
            paths: vec![path_str(&dir)],
        });
        assert_eq!(out, ".\n..\n.hidden\na.txt\nb.txt\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_ls_long_format() {
        let dir = make_unique_temp_dir("ls_long");
        let file = dir.join("data");
        fs::write(&file, "12345").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();
        fs::create_dir(dir.join("sub")).unwrap();

        let (code, out) = run_ls(Ls {
            all: false,
            long: true,
            paths: vec![path_str(&dir)],
        });
        assert_eq!(code, 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3, "unexpected output {out:?}");
        assert!(lines[0].starts_with("total "));
        assert!(lines[1].starts_with("-rw-r-----"), "{}", lines[1]);
        assert!(lines[1].contains(" 5 "), "{}", lines[1]);
        assert!(lines[1].ends_with(" data"), "{}", lines[1]);
        assert!(lines[2].starts_with('d'), "{}", lines[2]);
        assert!(lines[2].ends_with(" sub"), "{}", lines[2]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_ls_long_shows_modification_time() {
        let dir = make_unique_temp_dir("ls_mtime");
        let file = dir.join("dated");
        fs::write(&file, "x").unwrap();
        let stamp = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        let (_, out) = run_ls(Ls {
            all: false,
            long: true,
            paths: vec![path_str(&file)],
        });
        let expected = DateTime::<Local>::from(stamp).format(MTIME_FORMAT).to_string();
        assert!(
            out.trim_end().ends_with(&format!(" 1 {expected} {}", path_str(&file))),
            "{out:?}"
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_ls_missing_path_fails_but_lists_the_rest() {
        let dir = make_unique_temp_dir("ls_missing");
        let file = dir.join("present");
        fs::write(&file, "").unwrap();

        let (code, out) = run_ls(Ls {
            all: false,
            long: false,
            paths: vec![path_str(&dir.join("absent")), path_str(&file)],
        });
        assert_eq!(code, 1);
        assert_eq!(out, format!("{}\n", path_str(&file)));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_cat_reads_files_then_stdin() {
        let dir = make_unique_temp_dir("cat");
        let f = dir.join("f.txt");
        fs::write(&f, "hello\n").unwrap();

        let mut out = Vec::new();
        let cat = Cat {
            files: vec![path_str(&f), path_str(&f)],
        };
        assert_eq!(cat.execute(&mut Cursor::new(Vec::new()), &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "hello\nhello\n");

        let mut out = Vec::new();
        let cat = Cat { files: Vec::new() };
        let mut input = Cursor::new(b"from stdin".to_vec());
        assert_eq!(cat.execute(&mut input, &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "from stdin");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_cp_into_directory_keeps_file_name() {
        let dir = make_unique_temp_dir("cp");
        let src = dir.join("src.txt");
        let dest = dir.join("dest");
        fs::write(&src, "content").unwrap();
        fs::create_dir(&dest).unwrap();

        let cp = Cp {
            operands: vec![path_str(&src), path_str(&dest)],
        };
        let code = cp
            .execute(&mut Cursor::new(Vec::new()), &mut Vec::new())
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(dest.join("src.txt")).unwrap(), "content");
        assert!(src.exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_mv_renames_file() {
        let dir = make_unique_temp_dir("mv");
        let src = dir.join("old");
        let dest = dir.join("new");
        fs::write(&src, "x").unwrap();

        let mv = Mv {
            operands: vec![path_str(&src), path_str(&dest)],
        };
        let code = mv
            .execute(&mut Cursor::new(Vec::new()), &mut Vec::new())
            .unwrap();
        assert_eq!(code, 0);
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "x");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_operand_returns_two() {
        let mut sink = Vec::new();
        let cp = Cp {
            operands: vec!["only".to_string()],
        };
        assert_eq!(
            cp.execute(&mut Cursor::new(Vec::new()), &mut sink).unwrap(),
            EXIT_MISSING_OPERAND
        );
        let rm = Rm { files: Vec::new() };
        assert_eq!(
            rm.execute(&mut Cursor::new(Vec::new()), &mut sink).unwrap(),
            EXIT_MISSING_OPERAND
        );
        let ln = Ln {
            symbolic: true,
            operands: Vec::new(),
        };
        assert_eq!(
            ln.execute(&mut Cursor::new(Vec::new()), &mut sink).unwrap(),
            EXIT_MISSING_OPERAND
        );
    }

    #[test]
    fn test_rm_reports_failure_and_continues() {
        let dir = make_unique_temp_dir("rm");
        let present = dir.join("present");
        fs::write(&present, "").unwrap();

        let rm = Rm {
            files: vec![path_str(&dir.join("absent")), path_str(&present)],
        };
        let code = rm
            .execute(&mut Cursor::new(Vec::new()), &mut Vec::new())
            .unwrap();
        assert_eq!(code, 1);
        assert!(!present.exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_ln_creates_hard_and_symbolic_links() {
        let dir = make_unique_temp_dir("ln");
        let target = dir.join("target");
        fs::write(&target, "linked").unwrap();

        let hard = dir.join("hard");
        let ln = Ln {
            symbolic: false,
            operands: vec![path_str(&target), path_str(&hard)],
        };
        assert_eq!(ln.execute(&mut Cursor::new(Vec::new()), &mut Vec::new()).unwrap(), 0);
        assert_eq!(fs::metadata(&target).unwrap().nlink(), 2);

        let soft = dir.join("soft");
        let ln = Ln {
            symbolic: true,
            operands: vec![path_str(&target), path_str(&soft)],
        };
        assert_eq!(ln.execute(&mut Cursor::new(Vec::new()), &mut Vec::new()).unwrap(), 0);
        assert_eq!(fs::read_link(&soft).unwrap(), target);
        assert_eq!(fs::read_to_string(&soft).unwrap(), "linked");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_mkdir_and_rmdir() {
        let dir = make_unique_temp_dir("mkdir");
        let sub = dir.join("sub");

        let mkdir = Mkdir {
            dirs: vec![path_str(&sub)],
        };
        assert_eq!(mkdir.execute(&mut Cursor::new(Vec::new()), &mut Vec::new()).unwrap(), 0);
        assert!(sub.is_dir());

        let mkdir = Mkdir {
            dirs: vec![path_str(&sub)],
        };
        assert_eq!(mkdir.execute(&mut Cursor::new(Vec::new()), &mut Vec::new()).unwrap(), 1);

        let rmdir = Rmdir {
            dirs: vec![path_str(&sub)],
        };
        assert_eq!(rmdir.execute(&mut Cursor::new(Vec::new()), &mut Vec::new()).unwrap(), 0);
        assert!(!sub.exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_registered_handler_parses_bundled_flags_and_redirects_output() {
        let dir = make_unique_temp_dir("handler");
        fs::write(dir.join(".dot"), "").unwrap();
        fs::write(dir.join("plain"), "").unwrap();
        let out = dir.join("listing");

        let mut cl = CommandLine::new(["ls", "-al", &path_str(&dir)]);
        cl.output_file = Some(path_str(&out));
        assert_eq!(run::<Ls>(&cl), 0);

        let listing = fs::read_to_string(&out).unwrap();
        assert!(listing.starts_with("total "), "{listing}");
        assert!(listing.contains(" .dot\n"), "{listing}");
        assert!(listing.contains(" plain\n"), "{listing}");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unknown_option_is_a_usage_error() {
        let cl = CommandLine::new(["rm", "--bogus"]);
        assert_eq!(run::<Rm>(&cl), 1);
        let cl = CommandLine::new(["rm", "--help"]);
        assert_eq!(run::<Rm>(&cl), 0);
    }

    #[test]
    fn test_unopenable_redirection_fails_the_builtin() {
        let mut cl = CommandLine::new(["cat"]);
        cl.input_file = Some("/definitely/not/here.txt".to_string());
        assert_eq!(run::<Cat>(&cl), 1);
    }

    #[test]
    fn test_grep_reads_redirected_input() {
        let dir = make_unique_temp_dir("grep");
        let input = dir.join("in.txt");
        let output = dir.join("out.txt");
        fs::write(&input, "alpha\nbeta\ngamma\n").unwrap();

        let mut cl = CommandLine::new(["grep", "--color=never", "a$"]);
        cl.input_file = Some(path_str(&input));
        cl.output_file = Some(path_str(&output));
        assert_eq!(grep(&cl), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "alpha\nbeta\ngamma\n");

        let mut cl = CommandLine::new(["grep", "zzz"]);
        cl.input_file = Some(path_str(&input));
        cl.output_file = Some(path_str(&output));
        assert_eq!(grep(&cl), 1);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_grep_forces_colour_by_default() {
        let dir = make_unique_temp_dir("grep_colour");
        let input = dir.join("in.txt");
        let output = dir.join("out.txt");
        fs::write(&input, "needle\n").unwrap();

        let mut cl = CommandLine::new(["grep", "needle"]);
        cl.input_file = Some(path_str(&input));
        cl.output_file = Some(path_str(&output));
        assert_eq!(grep(&cl), 0);
        assert!(fs::read_to_string(&output).unwrap().contains('\u{1b}'));

        let _ = fs::remove_dir_all(dir);
    }
}
