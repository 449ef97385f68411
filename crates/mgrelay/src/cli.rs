//! Process plumbing shared by both commands.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use mgrelay_core::{Config, Credentials, Invocation, logging};

/// Exit status for every fatal error, usage errors included.
pub const EXIT_FAILURE: u8 = 2;

/// Size of the standard input buffer.
pub const INPUT_BUFFER: usize = 64 * 1024;

/// Returns true if standard input is a terminal.
#[must_use]
pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// Loads credentials and builds the run configuration.
///
/// # Errors
///
/// Returns an error if no usable API key is found.
pub fn load_config(invocation: &Invocation) -> anyhow::Result<Config> {
    let credentials = Credentials::load()?;
    let mut config = Config::new(credentials, invocation.clone());
    config.interactive = stdin_is_terminal();
    Ok(config)
}

/// Parses `argv`, printing help or usage errors.
///
/// An argument that is not valid Unicode is a usage error.
///
/// # Errors
///
/// Returns the exit code to use when the command should not run.
pub fn parse_args<P: Parser>(
    invocation: &Invocation,
    argv: impl IntoIterator<Item = OsString>,
) -> Result<P, ExitCode> {
    P::try_parse_from(argv).map_err(|e| {
        let usage = e.use_stderr();
        if usage {
            logging::note(invocation, "invalid command line");
        }
        let _ = e.print();
        if usage {
            ExitCode::from(EXIT_FAILURE)
        } else {
            ExitCode::SUCCESS
        }
    })
}

/// Maps the outcome of a run to the process exit status.
///
/// Failures are logged and reported as `<program>: <error>`.
pub fn finish(invocation: &Invocation, result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            logging::fatal(invocation, &message);
            eprintln!("{}: {message}", invocation.program());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sendmail::SendmailArgs;

    fn invocation(args: &[&str]) -> Invocation {
        Invocation {
            user: "root".to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_parse_args() {
        let argv = ["mailgun-sendmail", "-i", "a@example.com"];
        let args: SendmailArgs =
            parse_args(&invocation(&argv), argv.map(OsString::from)).unwrap();
        assert!(args.ignore_dots);
        assert_eq!(args.addrs, ["a@example.com"]);
    }

    #[test]
    fn test_usage_error_exit_status() {
        let argv = ["mailgun-sendmail", "-Q"];
        let code = parse_args::<SendmailArgs>(&invocation(&argv), argv.map(OsString::from))
            .unwrap_err();
        assert_eq!(code, ExitCode::from(EXIT_FAILURE));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_argument_is_usage_error() {
        use std::os::unix::ffi::OsStringExt;

        let argv = vec![
            OsString::from("mailgun-sendmail"),
            OsString::from("-F"),
            OsString::from_vec(b"Ren\xe9".to_vec()),
            OsString::from("a@example.com"),
        ];
        let invocation = Invocation::from_os(None, argv.clone());
        let code = parse_args::<SendmailArgs>(&invocation, argv).unwrap_err();
        assert_eq!(code, ExitCode::from(EXIT_FAILURE));
    }
}
