//! Interactive session provider.
//!
//! A `Session` is an already-established text channel to the firmware shell:
//! write a line, then wait for a pattern with a deadline. `ProcessSession`
//! backs it with a child process (normally `ssh`), using one reader thread
//! per output pipe so that blocking pipe reads become a channel we can wait
//! on with `recv_timeout`.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, trace, warn};

use fence_core::{deadline_after, FenceError, Result};

/// Text matched by `Session::expect`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMatch {
    /// The whole match.
    pub text: String,
    /// First capture group, when the pattern has one and it participated.
    pub capture: Option<String>,
}

pub trait Session {
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Wait until `pattern` matches the output received since the previous
    /// match. Output up to the end of the match is consumed.
    fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<SessionMatch>;
}

impl<S: Session + ?Sized> Session for &mut S {
    fn send_line(&mut self, line: &str) -> Result<()> {
        (**self).send_line(line)
    }

    fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<SessionMatch> {
        (**self).expect(pattern, timeout)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn send_line(&mut self, line: &str) -> Result<()> {
        (**self).send_line(line)
    }

    fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<SessionMatch> {
        (**self).expect(pattern, timeout)
    }
}

/// Run `pattern` over `buffer`; on a match, drain through the end of it.
pub fn take_match(buffer: &mut String, pattern: &Regex) -> Option<SessionMatch> {
    let found = pattern.captures(buffer).and_then(|caps| {
        let whole = caps.get(0)?;
        Some((
            whole.end(),
            whole.as_str().to_string(),
            caps.get(1).map(|m| m.as_str().to_string()),
        ))
    });
    let (end, text, capture) = found?;
    buffer.drain(..end);
    Some(SessionMatch { text, capture })
}

#[derive(Debug)]
pub struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Receiver<Vec<u8>>,
    buffer: String,
    eol: String,
    logout_command: Option<String>,
}

impl ProcessSession {
    /// Start `program args...` with piped stdio. stdout and stderr are merged
    /// into one output stream.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        debug!(%program, ?args, "spawning session");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FenceError::ConnectionLost(format!("spawning {program}: {e}")))?;

        let (tx, rx) = mpsc::channel();
        if let Some(out) = child.stdout.take() {
            pump(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            pump(err, tx);
        }

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            output: rx,
            buffer: String::new(),
            eol: "\n".to_string(),
            logout_command: None,
        })
    }

    pub fn with_eol(mut self, eol: impl Into<String>) -> Self {
        self.eol = eol.into();
        self
    }

    /// Wait for the first command prompt. A session that never shows one
    /// did not log in.
    pub fn login(mut self, prompt: &Regex, timeout: Duration) -> Result<Self> {
        match self.expect(prompt, timeout) {
            Ok(_) => {
                debug!("session logged in");
                self.logout_command = Some("exit".to_string());
                Ok(self)
            }
            Err(FenceError::Timeout { .. }) | Err(FenceError::ConnectionLost(_)) => {
                Err(FenceError::LoginDenied(format!(
                    "no command prompt within {:.1}s",
                    timeout.as_secs_f64()
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Send the logout command and reap the child. Also run on drop.
    pub fn logout(&mut self) {
        if let Some(cmd) = self.logout_command.take() {
            if let Err(e) = self.send_line(&cmd) {
                debug!(error = %e, "logout command not delivered");
            }
        }
        // Closing stdin lets a well-behaved shell exit on its own.
        self.stdin.take();
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                thread::sleep(Duration::from_millis(100));
                if let Ok(None) = self.child.try_wait() {
                    if let Err(e) = self.child.kill() {
                        warn!(error = %e, "failed to kill session process");
                    }
                }
                let _ = self.child.wait();
            }
        }
    }
}

impl Session for ProcessSession {
    fn send_line(&mut self, line: &str) -> Result<()> {
        trace!(%line, "send");
        let mut payload = String::with_capacity(line.len() + self.eol.len());
        payload.push_str(line);
        payload.push_str(&self.eol);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| FenceError::ConnectionLost("session input closed".to_string()))?;
        stdin
            .write_all(payload.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| FenceError::ConnectionLost(format!("writing to session: {e}")))
    }

    fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<SessionMatch> {
        let deadline = deadline_after(timeout);
        loop {
            if let Some(m) = take_match(&mut self.buffer, pattern) {
                trace!(text = %m.text, "matched");
                return Ok(m);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FenceError::timeout(pattern.as_str(), timeout));
            }
            match self.output.recv_timeout(deadline - now) {
                Ok(chunk) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(FenceError::timeout(pattern.as_str(), timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Both pipes closed; one last look at what is buffered.
                    return take_match(&mut self.buffer, pattern).ok_or_else(|| {
                        FenceError::ConnectionLost("session closed".to_string())
                    });
                }
            }
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.logout();
    }
}

fn pump<R: Read + Send + 'static>(mut reader: R, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_match_consumes_through_the_match() {
        let re = Regex::new(r"\[([^\r\n]*)\r?\n").unwrap();
        let mut buf = "echo\nnode 0 [ON]\nprompt>".to_string();
        let m = take_match(&mut buf, &re).unwrap();
        assert_eq!(m.capture.as_deref(), Some("ON]"));
        assert_eq!(buf, "prompt>");
        assert!(take_match(&mut buf, &re).is_none());
    }

    #[test]
    fn take_match_without_group() {
        let re = Regex::new(r"prompt>").unwrap();
        let mut buf = "x prompt> y".to_string();
        let m = take_match(&mut buf, &re).unwrap();
        assert_eq!(m.text, "prompt>");
        assert_eq!(m.capture, None);
        assert_eq!(buf, " y");
    }

    #[cfg(unix)]
    #[test]
    fn process_session_round_trip() {
        let mut s = ProcessSession::spawn("sh", &[]).unwrap();
        s.send_line("echo 'node 0 [ON, redundant]'").unwrap();
        let re = Regex::new(fence_core::STATUS_PATTERN).unwrap();
        let m = s.expect(&re, Duration::from_secs(5)).unwrap();
        assert_eq!(m.capture.as_deref(), Some("ON, redundant]"));
    }

    #[cfg(unix)]
    #[test]
    fn huge_login_timeout_does_not_overflow() {
        let mut s = ProcessSession::spawn("sh", &[]).unwrap();
        let prompt = Regex::new(r"\$ ").unwrap();
        // `sh` without a tty prints no prompt; closing its input ends the wait.
        s.stdin.take();
        let err = s.login(&prompt, Duration::MAX).unwrap_err();
        assert!(matches!(err, FenceError::LoginDenied(_)), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn process_session_times_out() {
        let mut s = ProcessSession::spawn("sh", &[]).unwrap();
        s.send_line("echo nothing here").unwrap();
        let re = Regex::new("never-printed").unwrap();
        let err = s.expect(&re, Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err, FenceError::Timeout { .. }));
    }
}
