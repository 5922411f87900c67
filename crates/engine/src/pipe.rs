//! crates/engine/src/pipe.rs
//!
//! Content transform pipes: the update-pipe decodes repository data on
//! the way in, the commit-pipe encodes it on the way out. Both are shell
//! commands with the content on stdin and the transformed content on
//! stdout.

use base::{Error, ErrorKind, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Runs `command` through the shell, feeding `input` on stdin and
/// returning its stdout. A non-zero exit status is an error.
///
/// Stdin is fed from a scoped thread so a transform that produces output
/// before draining its whole input cannot deadlock on the pipe buffers.
pub fn filter_bytes(
    command: &str,
    input: &[u8],
    env: &[(String, String)],
) -> Result<Vec<u8>> {
    debug!(command, bytes = input.len(), "running content pipe");
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| Error::io(e, format!("starting pipe command \"{command}\"")))?;

    let mut stdin = child.stdin.take().expect("stdin was requested");
    let mut stdout = child.stdout.take().expect("stdout was requested");

    let mut output = Vec::new();
    let read_result = std::thread::scope(|scope| {
        let feeder = scope.spawn(move || {
            // A transform may legitimately stop reading early; a broken
            // pipe here is not an error.
            let _ = stdin.write_all(input);
        });
        let read = stdout.read_to_end(&mut output);
        feeder.join().expect("feeder thread never panics");
        read
    });
    read_result.map_err(|e| Error::io(e, format!("reading pipe command \"{command}\"")))?;

    let status = child
        .wait()
        .map_err(|e| Error::io(e, format!("waiting for pipe command \"{command}\"")))?;
    if !status.success() {
        return Err(Error::new(
            ErrorKind::Io,
            format!("pipe command \"{command}\" exited with {status}"),
        ));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pipe_passes_bytes() {
        let out = filter_bytes("cat", b"some bytes\n", &[]).expect("cat");
        assert_eq!(out, b"some bytes\n");
    }

    #[test]
    fn transform_applies() {
        let out = filter_bytes("tr a-z A-Z", b"hello\n", &[]).expect("tr");
        assert_eq!(out, b"HELLO\n");
    }

    #[test]
    fn environment_reaches_the_child() {
        let env = [("TRACKFS_CURRENT_ENTRY".to_owned(), "/etc/x".to_owned())];
        let out = filter_bytes("printf %s \"$TRACKFS_CURRENT_ENTRY\"", b"", &env)
            .expect("printf");
        assert_eq!(out, b"/etc/x");
    }

    #[test]
    fn failing_command_is_an_error() {
        assert!(filter_bytes("exit 3", b"", &[]).is_err());
    }

    #[test]
    fn large_payload_does_not_deadlock() {
        let input = vec![0x61u8; 4 * 1024 * 1024];
        let out = filter_bytes("cat", &input, &[]).expect("cat");
        assert_eq!(out.len(), input.len());
    }
}
