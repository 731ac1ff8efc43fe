use std::io::{self, Write};

use zabbix_cli_core::auth::Prompter;

/// Reads credentials from the controlling terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_username(&mut self, default: Option<&str>) -> io::Result<String> {
        let mut stderr = io::stderr();
        match default {
            Some(name) => write!(stderr, "Username [{name}]: ")?,
            None => write!(stderr, "Username: ")?,
        }
        stderr.flush()?;

        let mut username = String::new();
        if io::stdin().read_line(&mut username)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no username entered"));
        }
        Ok(username.trim().to_string())
    }

    fn prompt_password(&mut self) -> io::Result<String> {
        rpassword::prompt_password("Password: ")
    }
}
