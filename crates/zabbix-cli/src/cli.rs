use std::path::PathBuf;

use clap::Parser;

use zabbix_cli_core::BulkMode;

#[derive(Parser, Debug)]
#[command(name = "zabbix-cli")]
#[command(about = "Command-line client for the Zabbix API")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ./zabbix-cli.toml, then the user config dir)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run commands from FILE, one per line
    #[arg(short, long, value_name = "FILE", conflicts_with = "command")]
    pub file: Option<PathBuf>,

    /// Failure handling for --file: strict, continue or skip
    #[arg(short, long, value_name = "MODE", requires = "file")]
    pub mode: Option<BulkMode>,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_flags() {
        let cli = Cli::try_parse_from(["zabbix-cli", "--file", "cmds.txt", "--mode", "continue"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("cmds.txt")));
        assert_eq!(cli.mode, Some(BulkMode::Continue));
        assert!(cli.command.is_empty());
    }

    #[test]
    fn test_single_command_keeps_its_flags() {
        let cli = Cli::try_parse_from(["zabbix-cli", "api", "host.get", "--help"]).unwrap();
        assert_eq!(cli.command, vec!["api", "host.get", "--help"]);
    }

    #[test]
    fn test_mode_requires_file() {
        assert!(Cli::try_parse_from(["zabbix-cli", "--mode", "skip"]).is_err());
        assert!(Cli::try_parse_from(["zabbix-cli", "--file", "x", "--mode", "often"]).is_err());
    }
}
