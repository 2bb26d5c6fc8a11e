//! Redirection application
//!
//! Opens, dups and restores file descriptors for every redirect operator.
//! Builtins, functions and brace groups use a scoped [`FdGuard`] so the
//! shell's own descriptors come back even on error; exec'd children apply
//! redirections permanently.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd::{close, dup2, fork, pipe, ForkResult};

use crate::ast::types::{RedirectKind, RedirectNode};
use crate::exec::errors::ExecError;
use crate::expansion::{self, pathname};
use crate::shell::Shell;

/// Scoped save/restore of file descriptors. Saved copies live at fd 10+
/// with close-on-exec set; `Drop` restores them in reverse order.
#[derive(Default)]
pub struct FdGuard {
    saved: Vec<(RawFd, Option<RawFd>)>,
}

impl FdGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn save(&mut self, fd: RawFd) {
        if self.saved.iter().any(|(orig, _)| *orig == fd) {
            return;
        }
        match fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(10)) {
            Ok(copy) => self.saved.push((fd, Some(copy))),
            // EBADF: the fd was closed; restore means closing it again
            Err(_) => self.saved.push((fd, None)),
        }
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        for (fd, saved) in self.saved.drain(..).rev() {
            match saved {
                Some(copy) => {
                    let _ = dup2(copy, fd);
                    let _ = close(copy);
                }
                None => {
                    let _ = close(fd);
                }
            }
        }
    }
}

/// Apply a redirect list. With a guard the originals are saved first; with
/// `None` the changes are permanent (exec'd children, `exec` builtin).
pub fn apply_redirects(
    shell: &mut Shell,
    redirects: &[RedirectNode],
    mut guard: Option<&mut FdGuard>,
) -> Result<(), ExecError> {
    for redirect in redirects {
        let fd = redirect.fd.unwrap_or_else(|| redirect.kind.default_fd());
        if let Some(guard) = guard.as_deref_mut() {
            guard.save(fd);
        }
        apply_one(shell, redirect, fd)?;
    }
    Ok(())
}

fn apply_one(shell: &mut Shell, redirect: &RedirectNode, fd: RawFd) -> Result<(), ExecError> {
    match redirect.kind {
        RedirectKind::In | RedirectKind::Out | RedirectKind::Append | RedirectKind::Clobber
        | RedirectKind::ReadWrite => {
            let target = expand_target(shell, redirect)?;
            let file = open_target(shell, redirect.kind, &target)?;
            install(file.into_raw_fd(), fd)
                .map_err(|e| ExecError::redirect(target, e.to_string()))?;
            Ok(())
        }
        RedirectKind::DupIn | RedirectKind::DupOut => {
            let target = expansion::expand_to_string(
                shell,
                &redirect.target.text,
                redirect.target.kind,
                redirect.target.quote,
            )?;
            if target == "-" {
                let _ = close(fd);
                return Ok(());
            }
            let source: RawFd = target
                .parse()
                .map_err(|_| ExecError::redirect(target.clone(), "bad file descriptor"))?;
            dup2(source, fd)
                .map_err(|_| ExecError::redirect(target, "bad file descriptor"))?;
            Ok(())
        }
        RedirectKind::Heredoc | RedirectKind::HeredocStrip => {
            let heredoc = redirect
                .heredoc
                .as_ref()
                .ok_or_else(|| ExecError::redirect("<<", "missing here-document body"))?;
            let body = if heredoc.quoted_delimiter {
                heredoc.body.clone()
            } else {
                expansion::expand_heredoc_body(shell, &heredoc.body)?
            };
            let read_fd = feed_through_pipe(&body)
                .map_err(|e| ExecError::redirect(heredoc.delimiter.clone(), e))?;
            install(read_fd, fd).map_err(|e| ExecError::redirect("<<", e.to_string()))?;
            Ok(())
        }
        RedirectKind::HereString => {
            let mut body = expansion::expand_to_string(
                shell,
                &redirect.target.text,
                redirect.target.kind,
                redirect.target.quote,
            )?;
            body.push('\n');
            let read_fd =
                feed_through_pipe(&body).map_err(|e| ExecError::redirect("<<<", e))?;
            install(read_fd, fd).map_err(|e| ExecError::redirect("<<<", e.to_string()))?;
            Ok(())
        }
    }
}

fn expand_target(shell: &mut Shell, redirect: &RedirectNode) -> Result<String, ExecError> {
    let expanded = expansion::expand_to_pattern(
        shell,
        &redirect.target.text,
        redirect.target.kind,
        redirect.target.quote,
    )?;
    Ok(pathname::expand_redirect_target(shell, &expanded)?)
}

fn open_target(shell: &Shell, kind: RedirectKind, target: &str) -> Result<File, ExecError> {
    let mut options = OpenOptions::new();
    match kind {
        RedirectKind::In => {
            options.read(true);
        }
        RedirectKind::Out => {
            if shell.options.noclobber {
                options.write(true).create_new(true);
            } else {
                options.write(true).create(true).truncate(true);
            }
        }
        RedirectKind::Clobber => {
            options.write(true).create(true).truncate(true);
        }
        RedirectKind::Append => {
            options.write(true).create(true).append(true);
        }
        RedirectKind::ReadWrite => {
            options.read(true).write(true).create(true);
        }
        _ => unreachable!(),
    }
    options.open(target).map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::AlreadyExists {
            "cannot overwrite existing file".to_string()
        } else {
            e.to_string()
        };
        ExecError::redirect(target, message)
    })
}

fn install(source: RawFd, fd: RawFd) -> nix::Result<()> {
    if source != fd {
        dup2(source, fd)?;
        let _ = close(source);
    }
    Ok(())
}

/// Feed heredoc/here-string content through a pipe, returning the read end.
/// Bodies larger than the pipe buffer are written by a forked child so the
/// shell cannot deadlock on its own pipe.
fn feed_through_pipe(body: &str) -> Result<RawFd, String> {
    let (read_end, write_end) = pipe().map_err(|e| e.to_string())?;
    if body.len() < 60_000 {
        let mut writer = File::from(write_end);
        writer.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
        drop(writer);
        return Ok(read_end.into_raw_fd());
    }
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(read_end);
            let mut writer = File::from(write_end);
            let _ = writer.write_all(body.as_bytes());
            drop(writer);
            unsafe { libc::_exit(0) }
        }
        Ok(ForkResult::Parent { .. }) => {
            drop(write_end);
            Ok(read_end.into_raw_fd())
        }
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::WordItem;
    use std::io::Read;

    #[test]
    fn test_feed_through_pipe_small() {
        let fd = feed_through_pipe("hello\n").unwrap();
        let mut file = unsafe { File::from_raw_fd(fd) };
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_redirect_to_file_and_guard_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut shell = Shell::new();
        let redirect = RedirectNode {
            kind: RedirectKind::Out,
            fd: Some(9),
            target: WordItem::bare(path.to_str().unwrap()),
            heredoc: None,
        };
        {
            let mut guard = FdGuard::new();
            apply_redirects(&mut shell, &[redirect], Some(&mut guard)).unwrap();
            nix::unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(9) }, b"data")
                .unwrap();
        }
        // fd 9 restored (closed) after guard drop
        assert!(nix::unistd::write(
            unsafe { std::os::fd::BorrowedFd::borrow_raw(9) },
            b"x"
        )
        .is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn test_noclobber_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, "old").unwrap();
        let mut shell = Shell::new();
        shell.options.noclobber = true;
        let redirect = RedirectNode {
            kind: RedirectKind::Out,
            fd: Some(9),
            target: WordItem::bare(path.to_str().unwrap()),
            heredoc: None,
        };
        let mut guard = FdGuard::new();
        let err = apply_redirects(&mut shell, &[redirect], Some(&mut guard)).unwrap_err();
        assert!(matches!(err, ExecError::Redirect { .. }));
        // Clobber form overrides noclobber
        let redirect = RedirectNode {
            kind: RedirectKind::Clobber,
            fd: Some(9),
            target: WordItem::bare(path.to_str().unwrap()),
            heredoc: None,
        };
        apply_redirects(&mut shell, &[redirect], Some(&mut guard)).unwrap();
    }
}
