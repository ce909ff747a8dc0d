use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};
use skymesh::message::ALL_DRONES;
use skymesh::relay::router::{LIST_CLIENTS, LIST_DRONES};
use skymesh::state_machine::flight::order::{HOLD, MOVE_TO, ORIENT, SET_SPEED};
use skymesh::{Link, Message, RelayConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const COMPONENT: &str = "ControlSystem";

const HELP: &str = "\
Available commands (append `@<drone>` to address one drone, default is all):

  moveto <longitude>, <latitude>   Fly straight to the coordinate.
  speed <m/s>                      Set the cruise speed.
  orient <roll> <pitch> <yaw>      Set the target attitude in degrees.
  hold                             Drop the route and stop.
  drones                           List connected drones.
  clients                          List every connected client.
  help                             Show this help message.
  exit                             Exit the console.";

#[derive(Debug, PartialEq)]
enum Input {
    Send(Message),
    Help,
    Exit,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let relay = RelayConfig::from_env()?;
    let link = Link::connect(relay.address(), COMPONENT).await?;
    let (_, mut reader, mut writer) = link.into_parts();
    println!("Connected to relay at {}. Type `help` for commands.", relay.address());

    let replies = tokio::spawn(async move {
        loop {
            match reader.next_message().await {
                Ok(Some((_, Ok(Message::Log(log))))) => {
                    println!("[{}] {}", log.component, log.message);
                }
                Ok(Some((_, Ok(other)))) => debug!(kind = other.kind(), "Ignoring message"),
                Ok(Some((_, Err(e)))) => warn!(error = %e, "Malformed message"),
                Ok(None) => {
                    println!("Relay closed the connection.");
                    break;
                }
                Err(e) => {
                    println!("Connection lost: {e}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse(&line) {
            Ok(Input::Send(message)) => writer.send(&message).await?,
            Ok(Input::Help) => println!("{HELP}"),
            Ok(Input::Exit) => break,
            Err(e) => println!("{e}. Type `help` for a list of commands."),
        }
        if replies.is_finished() {
            break;
        }
    }

    writer.shutdown().await?;
    replies.abort();
    Ok(())
}

fn parse(line: &str) -> Result<Input> {
    let line = line.trim();
    let (line, target) = match line.rsplit_once('@') {
        Some((rest, target)) if !target.trim().is_empty() => (rest.trim(), target.trim()),
        _ => (line, ALL_DRONES),
    };
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let drone = |name: &str, args: Value| -> Result<Input> {
        Ok(Input::Send(Message::drone_command(target, name, args)))
    };

    match command.to_ascii_lowercase().as_str() {
        "help" => Ok(Input::Help),
        "exit" | "quit" => Ok(Input::Exit),
        "drones" => Ok(Input::Send(Message::server_command(LIST_DRONES))),
        "clients" => Ok(Input::Send(Message::server_command(LIST_CLIENTS))),
        HOLD => drone(HOLD, Value::Null),
        MOVE_TO => {
            let numbers = numbers(rest)?;
            if numbers.len() != 2 {
                bail!("usage: moveto <longitude>, <latitude>");
            }
            drone(MOVE_TO, json!(numbers))
        }
        SET_SPEED => match numbers(rest)?.as_slice() {
            [speed] => drone(SET_SPEED, json!(speed)),
            _ => bail!("usage: speed <m/s>"),
        },
        ORIENT => match numbers(rest)?.as_slice() {
            [roll, pitch, yaw] => drone(ORIENT, json!({ "roll": roll, "pitch": pitch, "yaw": yaw })),
            _ => bail!("usage: orient <roll> <pitch> <yaw>"),
        },
        other => bail!("unknown command `{other}`"),
    }
}

fn numbers(args: &str) -> Result<Vec<f64>> {
    args.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| anyhow!("`{s}` is not a number")))
        .collect()
}
