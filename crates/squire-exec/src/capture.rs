//! Process-wide stdout/stderr capture
//!
//! Redirects file descriptors 1 and 2 into pipes for the duration of a
//! closure (or future), so output from anything writing to them is caught,
//! including child processes that inherit them. Both pipes are drained on
//! dedicated threads, which are joined before the capture returns, so no
//! output is lost and a chatty body cannot dead-lock on a full pipe.
//!
//! The redirection is global to the process. Captures may nest, but two
//! unrelated captures must not overlap in time. On non-unix targets the
//! body runs without capture.

use std::future::Future;
use std::io::{self, Write};

/// Run `body` with stdout and stderr redirected, then copy whatever was
/// written into `out` and `err`.
///
/// The original descriptors are restored before returning, including when
/// `body` panics.
pub fn capture<R>(out: &mut dyn Write, err: &mut dyn Write, body: impl FnOnce() -> R) -> io::Result<R> {
    let session = imp::Session::start()?;
    let result = body();
    let (captured_out, captured_err) = session.finish()?;
    out.write_all(&captured_out)?;
    err.write_all(&captured_err)?;
    Ok(result)
}

/// Async form of [`capture`]; the redirection spans the whole future.
pub async fn capture_async<R, F>(out: &mut dyn Write, err: &mut dyn Write, body: F) -> io::Result<R>
where
    F: Future<Output = R>,
{
    let session = imp::Session::start()?;
    let result = body.await;
    let (captured_out, captured_err) = session.finish()?;
    out.write_all(&captured_out)?;
    err.write_all(&captured_err)?;
    Ok(result)
}

/// Keep a body quiet unless it fails.
///
/// Output is captured into `out`/`err`. If the body returns an error the
/// captured output is also replayed to the real stdout and stderr so the
/// user can see what went wrong.
pub fn success_only<T, E>(
    out: &mut dyn Write,
    err: &mut dyn Write,
    body: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<io::Error>,
{
    let mut buf_out = Vec::new();
    let mut buf_err = Vec::new();
    let result = capture(&mut buf_out, &mut buf_err, body)?;
    settle(out, err, &buf_out, &buf_err, result.is_err())?;
    result
}

/// Async form of [`success_only`]
pub async fn success_only_async<T, E, F>(out: &mut dyn Write, err: &mut dyn Write, body: F) -> Result<T, E>
where
    E: From<io::Error>,
    F: Future<Output = Result<T, E>>,
{
    let mut buf_out = Vec::new();
    let mut buf_err = Vec::new();
    let result = capture_async(&mut buf_out, &mut buf_err, body).await?;
    settle(out, err, &buf_out, &buf_err, result.is_err())?;
    result
}

fn settle(out: &mut dyn Write, err: &mut dyn Write, buf_out: &[u8], buf_err: &[u8], failed: bool) -> io::Result<()> {
    out.write_all(buf_out)?;
    err.write_all(buf_err)?;
    if failed {
        io::stdout().write_all(buf_out)?;
        io::stderr().write_all(buf_err)?;
    }
    Ok(())
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(unix)]
mod imp {
    use super::flush_std;
    use std::fs::File;
    use std::io::{self, Read};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::thread::JoinHandle;

    const STDOUT: RawFd = 1;
    const STDERR: RawFd = 2;

    type Drain = JoinHandle<io::Result<Vec<u8>>>;

    /// An active redirection. Dropping it restores the descriptors.
    pub(super) struct Session {
        saved_out: Option<OwnedFd>,
        saved_err: Option<OwnedFd>,
        drains: Option<(Drain, Drain)>,
    }

    impl Session {
        pub(super) fn start() -> io::Result<Self> {
            let (read_out, write_out) = pipe()?;
            let (read_err, write_err) = pipe()?;

            flush_std();
            let saved_out = dup(STDOUT)?;
            let saved_err = dup(STDERR)?;

            let mut session = Session {
                saved_out: Some(saved_out),
                saved_err: Some(saved_err),
                drains: None,
            };

            // On failure the drop of `session` puts back whatever was replaced.
            dup2(write_out.as_raw_fd(), STDOUT)?;
            dup2(write_err.as_raw_fd(), STDERR)?;

            // Descriptors 1 and 2 now hold the only write ends.
            drop(write_out);
            drop(write_err);

            session.drains = Some((drain(read_out), drain(read_err)));
            Ok(session)
        }

        pub(super) fn finish(mut self) -> io::Result<(Vec<u8>, Vec<u8>)> {
            self.restore()?;
            let (out, err) = match self.drains.take() {
                Some(drains) => drains,
                None => return Ok((Vec::new(), Vec::new())),
            };
            Ok((join(out)?, join(err)?))
        }

        fn restore(&mut self) -> io::Result<()> {
            flush_std();
            if let Some(saved) = self.saved_out.take() {
                dup2(saved.as_raw_fd(), STDOUT)?;
            }
            if let Some(saved) = self.saved_err.take() {
                dup2(saved.as_raw_fd(), STDERR)?;
            }
            Ok(())
        }
    }

    impl Drop for Session {
        fn drop(&mut self) {
            let _ = self.restore();
        }
    }

    /// A pipe whose ends are not inherited by spawned children
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd"))]
    fn pipe() -> io::Result<(File, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        // SAFETY: `fds` is a valid two-element buffer for pipe2(2) to fill.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe2(2) succeeded, so both descriptors are open and owned by us.
        unsafe { Ok((File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd")))]
    fn pipe() -> io::Result<(File, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        // SAFETY: `fds` is a valid two-element buffer for pipe(2) to fill.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by us.
        let (read, write) = unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(read.as_raw_fd())?;
        set_cloexec(write.as_raw_fd())?;
        Ok((read, write))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd")))]
    fn set_cloexec(fd: RawFd) -> io::Result<()> {
        // SAFETY: fcntl(2) on a descriptor we own has no memory-safety preconditions.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Close-on-exec duplicate of `fd`
    fn dup(fd: RawFd) -> io::Result<OwnedFd> {
        // SAFETY: F_DUPFD_CLOEXEC has no memory-safety preconditions.
        let copy = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if copy < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `copy` is a freshly duplicated descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(copy) })
    }

    fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
        // SAFETY: dup2(2) has no memory-safety preconditions.
        if unsafe { libc::dup2(src, dst) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn drain(mut file: File) -> Drain {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    fn join(handle: Drain) -> io::Result<Vec<u8>> {
        handle
            .join()
            .map_err(|_| io::Error::other("capture drain thread panicked"))?
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn is_cloexec(fd: RawFd) -> bool {
            // SAFETY: F_GETFD on an open descriptor.
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            flags >= 0 && flags & libc::FD_CLOEXEC != 0
        }

        #[test]
        fn descriptors_are_not_inherited_by_children() {
            let (read, write) = pipe().unwrap();
            assert!(is_cloexec(read.as_raw_fd()));
            assert!(is_cloexec(write.as_raw_fd()));

            let copy = dup(read.as_raw_fd()).unwrap();
            assert!(is_cloexec(copy.as_raw_fd()));
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;

    pub(super) struct Session;

    impl Session {
        pub(super) fn start() -> io::Result<Self> {
            Ok(Session)
        }

        pub(super) fn finish(self) -> io::Result<(Vec<u8>, Vec<u8>)> {
            Ok((Vec::new(), Vec::new()))
        }
    }
}
