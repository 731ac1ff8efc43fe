use std::io::{self, Write};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use zabbix_cli_core::bulk::CommandLine;
use zabbix_cli_core::CommandDispatcher;

use crate::commands::Dispatcher;

const PROMPT: &str = "zabbix-cli> ";

/// Read commands from stdin until `exit`, `quit` or EOF.
///
/// Command errors are printed and the loop continues.
pub async fn run(dispatcher: &mut Dispatcher) -> Result<()> {
    info!("Starting interactive session");
    eprintln!("Type a command, or 'exit' to quit. Append --help to any command for usage.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{PROMPT}");
        io::stderr().flush()?;

        let Some(line) = lines.next_line().await? else {
            eprintln!();
            break;
        };

        match CommandLine::parse(&line) {
            Ok(CommandLine::Command { name, args }) => {
                if name == "exit" || name == "quit" {
                    break;
                }
                if let Err(e) = dispatcher.execute(&name, &args).await {
                    eprintln!("Error: {e}");
                }
            }
            Ok(_) => {}
            Err(reason) => eprintln!("Error: {reason}"),
        }
    }
    Ok(())
}
