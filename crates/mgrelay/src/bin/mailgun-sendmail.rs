//! `mailgun-sendmail [-itv] [-B type] [-b m] [-d val] [-F name] [-f addr] [-r addr] [addr ...]`

use std::path::Path;
use std::process::ExitCode;

use mgrelay::cli;
use mgrelay::sendmail::{self, SendmailArgs};
use mgrelay_core::{Console, Invocation, logging};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(Path::new(logging::LOG_PATH));
    let invocation = Invocation::current();

    let config = match cli::load_config(&invocation) {
        Ok(config) => config,
        Err(e) => return cli::finish(&invocation, Err(e)),
    };
    let args = match cli::parse_args::<SendmailArgs>(&invocation, std::env::args_os()) {
        Ok(args) => args,
        Err(code) => return code,
    };

    let stdin = BufReader::with_capacity(cli::INPUT_BUFFER, tokio::io::stdin());
    let result = sendmail::run(args, config, stdin, Console::stderr()).await;
    cli::finish(&invocation, result.map(drop))
}
