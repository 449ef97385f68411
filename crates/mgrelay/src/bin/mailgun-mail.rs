//! `mailgun-mail [-Edntv] [-a file] [-b bcc] [-c cc] [-r from] [-s subject] to...`

use std::path::Path;
use std::process::ExitCode;

use mgrelay::cli;
use mgrelay::mail::{self, MailArgs};
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
    let args = match cli::parse_args::<MailArgs>(&invocation, std::env::args_os()) {
        Ok(args) => args,
        Err(code) => return code,
    };

    let stdin = BufReader::with_capacity(cli::INPUT_BUFFER, tokio::io::stdin());
    let result = mail::run(args, config, stdin, Console::stderr()).await;
    cli::finish(&invocation, result.map(drop))
}
