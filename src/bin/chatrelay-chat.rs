// Interactive chat shell for a chatrelay server

use anyhow::{Context, Result};
use chatrelay::relay::session::{validate_name, MAX_NAME_CHARS};
use chatrelay::relay::{ChatCli, Event, RelayClient};
use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = ChatCli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: ChatCli) -> Result<()> {
    let client = RelayClient::new(cli.server.clone());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let max_chars = MAX_NAME_CHARS;

    let name = match cli.name {
        Some(name) => name,
        None => match prompt_name(&mut stdin, max_chars).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let session_id = client.authorize(&name).await.context("authorize")?;
    tracing::info!("{} == SessionID ==> {}", name, session_id);

    let mut events = client.connect(session_id).await.context("connect")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.next_event().await {
            match event {
                Event::Join { name } => println!("{} has joined.", name),
                Event::Leave { name } => println!("{} has left.", name),
                Event::Log { name, message } => println!("{}> {}", name, message),
                Event::Heartbeat => {}
            }
        }
        println!("Stream closed.");
    });

    println!("Chat Shell");
    println!("---------------------");
    while let Some(line) = stdin.next_line().await.context("Failed to read stdin")? {
        let message = line.trim_end_matches('\r');
        if message.is_empty() {
            continue;
        }
        if !client.say(&name, &cli.target, message).await.context("say")? {
            println!("({} is not connected)", cli.target);
        }
    }

    printer.abort();
    Ok(())
}

async fn prompt_name(stdin: &mut Lines<BufReader<Stdin>>, max_chars: usize) -> Result<Option<String>> {
    loop {
        print!("name> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            return Ok(None);
        };
        let name = line.trim().to_string();
        match validate_name(&name, max_chars) {
            Ok(()) => return Ok(Some(name)),
            Err(e) => println!("{}", e),
        }
    }
}
