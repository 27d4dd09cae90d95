//! Operator CLI for managing voice groups over the admin loopback protocol
//! (`admin.rs`). Talks line-delimited JSON over TCP; one request, one reply,
//! connection closed.

use std::io::Write;
use std::net::TcpStream;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "voice-group", about = "Administer voice server groups")]
struct Args {
    /// Admin listener address, e.g. 127.0.0.1:9989
    #[arg(long, default_value = "127.0.0.1:9989")]
    admin_bind: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all groups on the server.
    List,
    /// Create a new group.
    Create {
        name: String,
        #[arg(long)]
        permanent: bool,
        #[arg(long)]
        isolated: bool,
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a group outright.
    Delete { group_id: String },
    /// Change (or clear) a group's password.
    SetPassword {
        group_id: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Grant or revoke permanence (survives its last member leaving).
    GrantPermanent { group_id: String, permanent: bool },
    /// Toggle proximity isolation for a group.
    SetIsolated { group_id: String, isolated: bool },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let request = match args.command {
        Command::List => serde_json::json!({ "cmd": "list_groups" }),
        Command::Create { name, permanent, isolated, password } => serde_json::json!({
            "cmd": "create_group",
            "name": name,
            "permanent": permanent,
            "isolated": isolated,
            "password": password,
        }),
        Command::Delete { group_id } => serde_json::json!({ "cmd": "delete_group", "group_id": group_id }),
        Command::SetPassword { group_id, password } => serde_json::json!({
            "cmd": "set_password",
            "group_id": group_id,
            "password": password,
        }),
        Command::GrantPermanent { group_id, permanent } => serde_json::json!({
            "cmd": "set_permanent",
            "group_id": group_id,
            "permanent": permanent,
        }),
        Command::SetIsolated { group_id, isolated } => serde_json::json!({
            "cmd": "set_isolated",
            "group_id": group_id,
            "isolated": isolated,
        }),
    };

    let mut stream = TcpStream::connect(&args.admin_bind)?;
    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    stream.write_all(&line)?;

    let response: Value = serde_json::from_reader(&mut stream)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.get("ok").and_then(Value::as_bool) != Some(true) {
        std::process::exit(1);
    }
    Ok(())
}
