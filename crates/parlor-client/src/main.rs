mod input;
mod render;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use parlor_sync::{MemoryLog, SyncConfig, SyncHandle, spawn_session};
use parlor_types::{ChannelContext, MessageBody, UserIdentity};

use input::Input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't interleave with the rendered view
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Config
    let config = SyncConfig::from_env()?;
    let me = UserIdentity {
        id: std::env::var("PARLOR_USER_ID").unwrap_or_else(|_| "local-user".into()),
        display_name: std::env::var("PARLOR_USER_NAME").unwrap_or_else(|_| "me".into()),
        avatar_url: std::env::var("PARLOR_USER_AVATAR").unwrap_or_default(),
    };
    let start_channel = std::env::var("PARLOR_CHANNEL").unwrap_or_else(|_| "general".into());

    // The log stands in for the remote store; this process is also the
    // composer that appends to it.
    let log = MemoryLog::new();
    seed(&log, &ChannelContext::public(start_channel.clone()));

    let (handle, session) = spawn_session(log.clone(), config);
    info!("signed in as {} ({})", me.display_name, me.id);
    handle.activate(ChannelContext::public(start_channel))?;

    run(&handle, &log, &me).await?;

    handle.shutdown()?;
    session.await?;
    Ok(())
}

async fn run(handle: &SyncHandle, log: &MemoryLog, me: &UserIdentity) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut view = handle.view();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                print!("{}", render::render(&snapshot, me, &chrono::Local));
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match input::parse(&line) {
                    Input::Join(channel) => handle.activate(ChannelContext::public(channel))?,
                    Input::DirectMessage(channel) => handle.activate(ChannelContext::private(channel))?,
                    Input::Search(text) => handle.set_query(text)?,
                    Input::Leave => handle.deactivate()?,
                    Input::Quit => break,
                    Input::Help => println!("{}", input::HELP),
                    Input::Say(text) => {
                        match handle.snapshot().channel {
                            Some(channel) => {
                                log.append(&channel, me, MessageBody::Text(text));
                            }
                            None => println!("join a channel first (/help)"),
                        }
                    }
                    Input::Empty => {}
                    Input::Unknown(line) => warn!("unknown command: {}", line),
                }
            }
        }
    }

    Ok(())
}

/// Give the starting channel some history to replay.
fn seed(log: &MemoryLog, channel: &ChannelContext) {
    let host = UserIdentity {
        id: "parlor-host".into(),
        display_name: "host".into(),
        avatar_url: String::new(),
    };
    log.append(channel, &host, MessageBody::Text("welcome to parlor".into()));
    log.append(channel, &host, MessageBody::Text("type /help for commands".into()));
}
