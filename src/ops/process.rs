use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;

use super::OpsError;

/// Keep only the tail of stderr in error messages
const STDERR_TAIL: usize = 2048;

/// Run an external tool to completion. A non-zero exit becomes
/// `OpsError::CommandFailed` carrying the tail of stderr.
pub async fn run<I, S>(program: &str, args: I) -> Result<(), OpsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    tracing::debug!(program, args = ?args, "running external command");

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| OpsError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(OpsError::CommandFailed {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
    })
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_char_boundaries() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run("definitely-not-a-real-binary-42", ["--version"]).await.unwrap_err();
        assert!(matches!(err, OpsError::Spawn { .. }));
    }
}
