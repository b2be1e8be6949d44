use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};

use super::{ExecError, ExecResult, Mode, Result, TailBuffer, TAIL_CAPACITY};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Puts the caller's terminal in raw mode for as long as it lives.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Option<Self> {
        match crossterm::terminal::enable_raw_mode() {
            Ok(()) => Some(Self),
            Err(e) => {
                tracing::debug!(error = %e, "raw mode unavailable");
                None
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn current_size() -> PtySize {
    let (cols, rows) = crossterm::terminal::size().unwrap_or((DEFAULT_COLS, DEFAULT_ROWS));
    PtySize {
        rows: if rows == 0 { DEFAULT_ROWS } else { rows },
        cols: if cols == 0 { DEFAULT_COLS } else { cols },
        pixel_width: 0,
        pixel_height: 0,
    }
}

pub(super) fn run(exe: &Path, args: &[OsString]) -> Result<ExecResult> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(current_size())
        .map_err(|e| ExecError::Pty(e.to_string()))?;

    // Every ExecError::Pty must happen before the spawn: callers fall back
    // to pipes on it, and a second child would repeat the tool's work.
    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| ExecError::Pty(e.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| ExecError::Pty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(exe);
    cmd.args(args);
    // Without an explicit cwd the child would start in $HOME.
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }

    let mut child = pair.slave.spawn_command(cmd).map_err(|e| ExecError::Launch {
        program: exe.display().to_string(),
        message: e.to_string(),
    })?;
    // Only the child may hold the slave, or reads never see EOF.
    drop(pair.slave);

    let master: Arc<Mutex<Box<dyn MasterPty + Send>>> = Arc::new(Mutex::new(pair.master));

    let raw = RawModeGuard::enable();

    let output = thread::spawn(move || copy_output(reader));

    // Dropping the writer sends a newline and EOF to the child, so it
    // outlives the child even when our stdin ends first.
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let input_writer = Arc::clone(&writer);
    // Not joined: it sits in a blocking stdin read and dies with the process.
    thread::spawn(move || copy_input(&input_writer));

    let done = Arc::new(AtomicBool::new(false));
    let resizer = start_resizer(Arc::clone(&master), Arc::clone(&done));

    let status = child.wait();
    done.store(true, Ordering::SeqCst);

    let combined_tail = output.join().map(TailBuffer::into_bytes).unwrap_or_default();
    if let Some(handle) = resizer {
        let _ = handle.join();
    }
    drop(raw);
    drop(writer);
    drop(master);

    let status = status?;
    Ok(ExecResult {
        exit_code: exit_code_of(&status),
        mode: Mode::Pty,
        stdout_tail: Vec::new(),
        stderr_tail: Vec::new(),
        combined_tail,
    })
}

fn copy_output(mut reader: Box<dyn Read + Send>) -> TailBuffer {
    let mut tail = TailBuffer::new(TAIL_CAPACITY);
    let mut stdout = std::io::stdout();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                let _ = stdout.write_all(chunk);
                let _ = stdout.flush();
                tail.push(chunk);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side closes on Linux
            Err(_) => break,
        }
    }
    tail
}

fn copy_input(writer: &Mutex<Box<dyn Write + Send>>) {
    let mut stdin = std::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let Ok(mut w) = writer.lock() else { break };
                if w.write_all(&buf[..n]).is_err() || w.flush().is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn resize(master: &Mutex<Box<dyn MasterPty + Send>>) {
    if let Ok(m) = master.lock() {
        if let Err(e) = m.resize(current_size()) {
            tracing::debug!(error = %e, "pty resize failed");
        }
    }
}

#[cfg(unix)]
mod winch {
    use std::sync::atomic::{AtomicBool, Ordering};

    pub(super) static PENDING: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_winch(_: libc::c_int) {
        PENDING.store(true, Ordering::SeqCst);
    }

    /// Installs the handler; the previous one comes back on drop.
    pub(super) struct Handler {
        previous: libc::sighandler_t,
    }

    impl Handler {
        pub(super) fn install() -> Self {
            let handler = on_winch as extern "C" fn(libc::c_int);
            // SAFETY: the handler only touches an atomic.
            let previous = unsafe { libc::signal(libc::SIGWINCH, handler as libc::sighandler_t) };
            Self { previous }
        }
    }

    impl Drop for Handler {
        fn drop(&mut self) {
            if self.previous != libc::SIG_ERR {
                // SAFETY: restoring whatever was installed before.
                unsafe {
                    libc::signal(libc::SIGWINCH, self.previous);
                }
            }
        }
    }
}

#[cfg(unix)]
fn start_resizer(
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    done: Arc<AtomicBool>,
) -> Option<thread::JoinHandle<()>> {
    let handle = thread::spawn(move || {
        let _handler = winch::Handler::install();
        while !done.load(Ordering::SeqCst) {
            if winch::PENDING.swap(false, Ordering::SeqCst) {
                resize(&master);
            }
            thread::sleep(std::time::Duration::from_millis(50));
        }
    });
    Some(handle)
}

#[cfg(not(unix))]
fn start_resizer(
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    _done: Arc<AtomicBool>,
) -> Option<thread::JoinHandle<()>> {
    resize(&master);
    None
}

/// portable-pty reports a signal death by name; map it back to a number.
fn exit_code_of(status: &portable_pty::ExitStatus) -> i32 {
    if let Some(name) = status.signal() {
        return signal_number(name).map(|n| 128 + n).unwrap_or(1);
    }
    i32::try_from(status.exit_code()).unwrap_or(1)
}

#[cfg(unix)]
fn signal_number(name: &str) -> Option<i32> {
    (1..65).find(|&sig| {
        // SAFETY: strsignal returns a pointer to a static or thread-local
        // string, copied out immediately.
        let ptr = unsafe { libc::strsignal(sig) };
        if ptr.is_null() {
            return false;
        }
        let desc = unsafe { std::ffi::CStr::from_ptr(ptr) };
        desc.to_string_lossy() == name
    })
}

#[cfg(not(unix))]
fn signal_number(_name: &str) -> Option<i32> {
    None
}
