//! ttlkv CLI Client
//!
//! Interactive command-line client.

use clap::Parser;
use std::io::{self, Write};
use std::path::Path;
use ttlkv::{Driver, PutOutcome};

/// ttlkv CLI - Interactive Client
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 8082)]
    port: u16,

    /// Skip the connection test
    #[arg(long)]
    no_check: bool,
}

/// A parsed REPL line
enum Input {
    Ping,
    Get(String),
    Set {
        key: String,
        value: String,
        ttl_secs: Option<i64>,
    },
    Del(String),
    Valid(String),
    Dump(String),
    Load(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("Connecting to ttlkv at {}:{}...", args.host, args.port);

    let mut driver = if args.no_check {
        Driver::connect_unchecked(&args.host, args.port).await?
    } else {
        Driver::connect(&args.host, args.port).await?
    };

    println!("Connected! Type 'help' for available commands, 'quit' to exit.\n");

    loop {
        print!("ttlkv> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        match parse_input(input) {
            Ok(cmd) => {
                if let Err(e) = execute(&mut driver, cmd).await {
                    eprintln!("Error: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    Ok(())
}

async fn execute(driver: &mut Driver, input: Input) -> anyhow::Result<()> {
    match input {
        Input::Ping => {
            driver.ping().await?;
            println!("PONG");
        }
        Input::Get(key) => match driver.get(&key).await? {
            Some(record) => println!("\"{}\" (ttl {} ms)", record.value, record.ttl_ms),
            None => println!("(nil)"),
        },
        Input::Set {
            key,
            value,
            ttl_secs,
        } => match driver.put(&key, &value, ttl_secs).await? {
            PutOutcome::Created => println!("CREATED"),
            PutOutcome::Updated => println!("UPDATED"),
        },
        Input::Del(key) => match driver.remove(&key).await? {
            Some(value) => println!("removed \"{}\"", value),
            None => println!("(nil)"),
        },
        Input::Valid(key) => println!("{}", driver.is_valid(&key).await?),
        Input::Dump(file) => {
            let path = Path::new(&file);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("DUMP needs a file name"))?;
            let written = driver.dump_to_file(dir, name).await?;
            println!("Snapshot written to {}", written.display());
        }
        Input::Load(file) => {
            driver.load_from_file(&file).await?;
            println!("LOADED");
        }
    }
    Ok(())
}

fn parse_input(input: &str) -> anyhow::Result<Input> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    if parts.is_empty() {
        anyhow::bail!("Empty command");
    }

    let cmd = parts[0].to_uppercase();
    let arg = |usage: &str| -> anyhow::Result<String> {
        match parts.get(1) {
            Some(a) => Ok(a.to_string()),
            None => anyhow::bail!("{} requires an argument: {}", cmd, usage),
        }
    };

    match cmd.as_str() {
        "PING" => Ok(Input::Ping),
        "GET" => Ok(Input::Get(arg("GET <key>")?)),
        "DEL" => Ok(Input::Del(arg("DEL <key>")?)),
        "VALID" => Ok(Input::Valid(arg("VALID <key>")?)),
        "DUMP" => Ok(Input::Dump(arg("DUMP <file>")?)),
        "LOAD" => Ok(Input::Load(arg("LOAD <file>")?)),

        "SET" => {
            if parts.len() < 3 {
                anyhow::bail!("SET requires key and value: SET <key> <value> [ttl_seconds]");
            }
            let ttl_secs = match parts.get(3) {
                Some(t) => Some(t.parse::<i64>()?),
                None => None,
            };
            Ok(Input::Set {
                key: parts[1].to_string(),
                value: parts[2].to_string(),
                ttl_secs,
            })
        }

        _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", cmd),
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  PING                     - Check server connectivity
  GET <key>                - Get value and remaining TTL
  SET <key> <value> [ttl]  - Set key-value pair with optional TTL in seconds
  DEL <key>                - Delete a key
  VALID <key>              - Check if key holds a non-expired value
  DUMP <file>              - Save a snapshot of the store to a local file
  LOAD <file>              - Replace the store with a snapshot file

  help                     - Show this help
  quit / exit              - Exit the CLI

Examples:
  SET mykey myvalue        (expires in 60 seconds)
  SET tempkey value 10     (expires in 10 seconds)
  GET mykey
  DUMP ./storage.dat
  LOAD ./storage.dat
"#
    );
}
