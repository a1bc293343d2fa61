//! OS process primitives.
//!
//! Liveness probes, command-identity checks, and the graceful-then-forced
//! termination ladder used by the supervisor.

use std::path::Path;
use std::time::{Duration, Instant};

/// Check if a process is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        if pid_is_zombie(pid) {
            return false;
        }

        // Signal 0 doesn't send a signal but checks if the process exists
        unsafe {
            let result = libc::kill(pid as libc::pid_t, 0);
            if result == 0 {
                return true;
            }
            // ESRCH means process doesn't exist
            // EPERM means it exists but we don't have permission
            std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
        }
    }

    #[cfg(not(unix))]
    {
        true // Non-Unix: can't check liveness, assume running
    }
}

#[cfg(target_os = "linux")]
fn pid_is_zombie(pid: u32) -> bool {
    // Third field of /proc/<pid>/stat, after the parenthesized comm
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(|state| state == "Z")
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
fn pid_is_zombie(pid: u32) -> bool {
    let mut info: libc::proc_bsdinfo = unsafe { std::mem::zeroed() };
    let info_size = std::mem::size_of::<libc::proc_bsdinfo>() as libc::c_int;
    let result = unsafe {
        libc::proc_pidinfo(
            pid as libc::c_int,
            libc::PROC_PIDTBSDINFO,
            0,
            &mut info as *mut _ as *mut libc::c_void,
            info_size,
        )
    };
    result == info_size && info.pbi_status == libc::SZOMB
}

#[cfg(all(unix, not(target_os = "linux"), not(target_os = "macos")))]
fn pid_is_zombie(_pid: u32) -> bool {
    false
}

/// Program name currently behind a PID, if the platform can tell us.
#[cfg(target_os = "linux")]
pub fn pid_command(pid: u32) -> Option<String> {
    std::fs::read_to_string(format!("/proc/{}/comm", pid))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
pub fn pid_command(pid: u32) -> Option<String> {
    let mut buf = vec![0u8; libc::PROC_PIDPATHINFO_MAXSIZE as usize];
    let result = unsafe {
        libc::proc_pidpath(
            pid as libc::c_int,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len() as u32,
        )
    };
    if result <= 0 {
        return None;
    }

    let cstr = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr() as *const libc::c_char) };
    Path::new(cstr.to_string_lossy().as_ref())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn pid_command(_pid: u32) -> Option<String> {
    None
}

/// Guard against PID reuse: does the process behind `pid` still look like
/// the program we launched?
///
/// Returns true when the platform cannot report a command name; the plain
/// liveness check is the best we can do there.
pub fn pid_matches_identity(pid: u32, identity: &str) -> bool {
    let observed = match pid_command(pid) {
        Some(name) => name,
        None => return true,
    };

    let expected = Path::new(identity)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| identity.to_string());

    // /proc/<pid>/comm truncates to 15 characters
    if observed.len() == 15 && expected.len() > 15 {
        expected.starts_with(&observed)
    } else {
        observed == expected
    }
}

/// Stop a worker process gracefully.
///
/// Sends SIGINT, waits, then SIGTERM, then SIGKILL if necessary.
/// Returns true if the process was stopped successfully.
#[cfg(unix)]
pub fn terminate_process(pid: u32, grace: Duration) -> bool {
    use libc::{SIGINT, SIGKILL, SIGTERM};

    let raw_pid = pid as libc::pid_t;

    // Try SIGINT first
    if unsafe { libc::kill(raw_pid, SIGINT) } != 0 {
        return !pid_is_alive(pid);
    }

    if wait_for_exit(pid, grace) {
        return true;
    }

    tracing::warn!("Process {} did not respond to SIGINT, sending SIGTERM", pid);

    if unsafe { libc::kill(raw_pid, SIGTERM) } != 0 {
        return !pid_is_alive(pid);
    }

    if wait_for_exit(pid, grace) {
        return true;
    }

    tracing::error!("Process {} did not respond to SIGTERM, sending SIGKILL", pid);

    // Last resort: SIGKILL
    unsafe { libc::kill(raw_pid, SIGKILL) };

    wait_for_exit(pid, Duration::from_secs(5))
}

#[cfg(not(unix))]
pub fn terminate_process(_pid: u32, _grace: Duration) -> bool {
    // On non-Unix systems, we can't send signals
    false
}

/// Wait for a process to exit.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if !pid_is_alive(pid) {
            return true;
        }

        #[cfg(unix)]
        {
            // Try to reap the process if it's our child
            let result = unsafe {
                let mut status: libc::c_int = 0;
                libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG)
            };

            if result == pid as libc::pid_t {
                return true;
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    !pid_is_alive(pid)
}

/// Reap a zombie child.
#[cfg(unix)]
pub fn reap_process(pid: u32) {
    loop {
        let result = unsafe {
            let mut status: libc::c_int = 0;
            libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG)
        };

        if result >= 0 {
            break;
        }

        let errno = std::io::Error::last_os_error().raw_os_error();
        if errno == Some(libc::EINTR) {
            continue; // Interrupted, retry
        }
        break; // ECHILD or other error
    }
}

#[cfg(not(unix))]
pub fn reap_process(_pid: u32) {
    // No-op on non-Unix
}
