//! Commands available to single-command, bulk and interactive modes.
//!
//! Each command is a thin mapping onto one or two API calls. Results are
//! printed to stdout as pretty JSON.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;

use zabbix_cli_core::{ApiClient, CommandDispatcher, CommandError};

#[derive(Parser, Debug)]
#[command(name = "zabbix-cli", no_binary_name = true, disable_version_flag = true)]
struct CommandArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Show the API version of the server
    ShowApiVersion,

    /// Call an API method directly
    Api {
        /// Method name, e.g. host.get
        method: String,
        /// Parameters as a JSON object or array
        params: Option<String>,
    },

    /// Show a host by technical name
    ShowHost { name: String },

    /// Show a host group and its hosts
    ShowHostgroup { name: String },

    /// Create a host group
    CreateHostgroup { name: String },

    /// Remove a host group
    RemoveHostgroup { name: String },

    /// End the API session and remove it from the session file
    Logout,
}

/// Parse a command and its arguments.
///
/// Returns `Ok(None)` when clap already printed help for the user.
pub fn parse_command(name: &str, args: &[String]) -> Result<Option<Command>, CommandError> {
    let argv = std::iter::once(name).chain(args.iter().map(String::as_str));
    match CommandArgs::try_parse_from(argv) {
        Ok(parsed) => Ok(Some(parsed.command)),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let _ = e.print();
                Ok(None)
            }
            _ => Err(CommandError::Parse(e.render().to_string().trim().to_string())),
        },
    }
}

/// Executes commands against one server.
pub struct Dispatcher {
    client: ApiClient,
}

impl Dispatcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client_mut(&mut self) -> &mut ApiClient {
        &mut self.client
    }

    pub async fn run(&mut self, command: Command) -> Result<Value> {
        debug!(?command, "Running command");
        match command {
            Command::ShowApiVersion => {
                let version = self.client.api_version().await?;
                Ok(json!({ "version": version.to_string() }))
            }
            Command::Api { method, params } => {
                let params = match params {
                    Some(raw) => serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid JSON parameters for {method}"))?,
                    None => json!({}),
                };
                Ok(self.client.call(&method, params).await?)
            }
            Command::ShowHost { name } => {
                let hosts = self
                    .client
                    .call(
                        "host.get",
                        json!({
                            "filter": { "host": [&name] },
                            "output": "extend",
                            "selectInterfaces": "extend",
                        }),
                    )
                    .await?;
                first_match(hosts).ok_or_else(|| anyhow!("Host {name:?} not found"))
            }
            Command::ShowHostgroup { name } => self.find_hostgroup(&name).await,
            Command::CreateHostgroup { name } => {
                let created = self
                    .client
                    .call("hostgroup.create", json!({ "name": name }))
                    .await?;
                Ok(created)
            }
            Command::RemoveHostgroup { name } => {
                let group = self.find_hostgroup(&name).await?;
                let id = group
                    .get("groupid")
                    .cloned()
                    .ok_or_else(|| anyhow!("Host group {name:?} has no groupid"))?;
                Ok(self.client.call("hostgroup.delete", json!([id])).await?)
            }
            Command::Logout => {
                self.client.logout().await?;
                Ok(json!({ "message": "Logged out" }))
            }
        }
    }

    async fn find_hostgroup(&mut self, name: &str) -> Result<Value> {
        let groups = self
            .client
            .call(
                "hostgroup.get",
                json!({
                    "filter": { "name": [name] },
                    "output": "extend",
                    "selectHosts": ["host"],
                }),
            )
            .await?;
        first_match(groups).ok_or_else(|| anyhow!("Host group {name:?} not found"))
    }
}

fn first_match(result: Value) -> Option<Value> {
    match result {
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    }
}

#[async_trait]
impl CommandDispatcher for Dispatcher {
    async fn execute(&mut self, command: &str, args: &[String]) -> Result<(), CommandError> {
        let Some(command) = parse_command(command, args)? else {
            return Ok(());
        };
        let output = self.run(command).await?;
        let rendered = serde_json::to_string_pretty(&output).map_err(anyhow::Error::from)?;
        println!("{rendered}");
        Ok(())
    }
}
