use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use super::{exit_code_of, ExecError, ExecResult, Mode, Result, TailBuffer, TAIL_CAPACITY};

type SharedTail = Arc<Mutex<TailBuffer>>;

pub(super) fn run(exe: &Path, args: &[OsString]) -> Result<ExecResult> {
    let mut child = Command::new(exe)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExecError::Launch {
            program: exe.display().to_string(),
            message: e.to_string(),
        })?;

    let combined: SharedTail = Arc::new(Mutex::new(TailBuffer::new(TAIL_CAPACITY)));

    let stdout_pump = child.stdout.take().map(|src| {
        let combined = Arc::clone(&combined);
        thread::spawn(move || tee(src, std::io::stdout(), &combined))
    });
    let stderr_pump = child.stderr.take().map(|src| {
        let combined = Arc::clone(&combined);
        thread::spawn(move || tee(src, std::io::stderr(), &combined))
    });

    let status = child.wait()?;
    let stdout_tail = finish(stdout_pump);
    let stderr_tail = finish(stderr_pump);

    let combined_tail = match combined.lock() {
        Ok(guard) => guard.as_bytes().to_vec(),
        Err(poisoned) => poisoned.into_inner().as_bytes().to_vec(),
    };

    Ok(ExecResult {
        exit_code: exit_code_of(status),
        mode: Mode::Pipes,
        stdout_tail,
        stderr_tail,
        combined_tail,
    })
}

/// Copy `src` to `dst` chunk by chunk, keeping a private tail and feeding
/// the shared interleaved one.
fn tee<R: Read, W: Write>(mut src: R, mut dst: W, combined: &Mutex<TailBuffer>) -> TailBuffer {
    let mut own = TailBuffer::new(TAIL_CAPACITY);
    let mut buf = [0u8; 8192];
    let mut forward = true;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let chunk = &buf[..n];
        // Keep draining after our side closes so the child never blocks.
        if forward && (dst.write_all(chunk).is_err() || dst.flush().is_err()) {
            forward = false;
        }
        own.push(chunk);
        if let Ok(mut shared) = combined.lock() {
            shared.push(chunk);
        }
    }
    own
}

fn finish(pump: Option<thread::JoinHandle<TailBuffer>>) -> Vec<u8> {
    pump.and_then(|h| h.join().ok())
        .map(TailBuffer::into_bytes)
        .unwrap_or_default()
}
