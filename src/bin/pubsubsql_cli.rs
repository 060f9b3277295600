use std::{
    error::Error,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use log::info;
use pubsubsql::{Client, ClientConfig, ClientError, Command, prompt};

const LISTEN_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address as host:port
    #[arg(default_value = "localhost:7777")]
    address: String,
    /// Seconds to wait for each response frame; waits forever when omitted
    #[arg(long)]
    read_timeout: Option<u64>,
    /// Seconds to wait while establishing the connection
    #[arg(long)]
    connect_timeout: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = ClientConfig {
        read_timeout: cli.read_timeout.map(Duration::from_secs),
        connect_timeout: cli.connect_timeout.map(Duration::from_secs),
        ..ClientConfig::default()
    };

    let mut client = Client::with_config(config);
    client.connect(&cli.address)?;
    info!("connected to {}", cli.address);

    let listening = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let listening = Arc::clone(&listening);
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if listening.load(Ordering::SeqCst) {
                interrupted.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(130);
            }
        })?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let res = match cmd {
            Command::Exit => break,
            Command::Statement(s) => client.execute(&s).and_then(|_| print_result(&mut client)),
            Command::Stream(s) => client.stream(&s),
            Command::Wait(timeout) => match client.wait_for_event(timeout) {
                Ok(true) => print_result(&mut client),
                Ok(false) => {
                    println!("no event within {timeout:?}");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Listen => {
                listening.store(true, Ordering::SeqCst);
                let res = listen(&mut client, &interrupted);
                listening.store(false, Ordering::SeqCst);
                interrupted.store(false, Ordering::SeqCst);
                res
            }
        };

        if let Err(e) = res {
            eprintln!("error: {e}");
            if !client.is_connected() {
                client.disconnect();
                return Err(e.into());
            }
        }
    }

    client.disconnect();
    Ok(())
}

fn listen(client: &mut Client, interrupted: &AtomicBool) -> Result<(), ClientError> {
    println!("listening for events, press Ctrl-C to stop");
    while !interrupted.load(Ordering::SeqCst) {
        if client.wait_for_event(LISTEN_POLL)? {
            print_result(client)?;
        }
    }
    Ok(())
}

fn print_result(client: &mut Client) -> Result<(), ClientError> {
    match client.pubsub_id() {
        Some(id) => println!("action: {} (pubsubid {id})", client.action()),
        None => println!("action: {}", client.action()),
    }

    if client.column_count() == 0 {
        return Ok(());
    }

    println!("{}", client.columns().join("\t"));
    while client.next_row()? {
        let row = (0..client.column_count())
            .map(|i| client.value_at(i))
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", row.join("\t"));
    }
    Ok(())
}
