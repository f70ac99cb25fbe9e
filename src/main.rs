use std::io::{self, Write};
use std::sync::atomic::Ordering;

use chat_api::ChatApiClient;
use stream_chat::session::{ChatSession, SessionError, TurnOutcome};
use stream_chat::{logging, StreamChatConfig, TerminalObserver};
use tokio::io::{AsyncBufReadExt, BufReader};

const QUIT_COMMAND: &str = "/quit";
const CLEAR_COMMAND: &str = "/clear";

#[tokio::main]
async fn main() -> io::Result<()> {
    logging::init();

    let config = StreamChatConfig::from_env().map_err(io::Error::other)?;
    let client = ChatApiClient::new(config.to_api_config()).map_err(io::Error::other)?;
    tracing::info!(endpoint = %client.normalized_endpoint(), "chat client ready");

    let mut session = ChatSession::with_observer(client, TerminalObserver::stdout());
    let cancellation = session.cancellation_handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            QUIT_COMMAND => break,
            CLEAR_COMMAND => {
                session.clear();
                println!("(transcript cleared)");
                continue;
            }
            _ => {}
        }

        let result = {
            let send = session.send(&line);
            tokio::pin!(send);
            tokio::select! {
                result = &mut send => result,
                interrupt = tokio::signal::ctrl_c() => {
                    if let Err(error) = interrupt {
                        tracing::warn!(%error, "failed to listen for interrupt");
                    }
                    cancellation.store(true, Ordering::Release);
                    send.await
                }
            }
        };

        match result {
            Ok(TurnOutcome::Completed { .. }) => {}
            Ok(TurnOutcome::Cancelled { id }) => tracing::info!(%id, "response cancelled"),
            Ok(TurnOutcome::Failed { id, message }) => {
                tracing::debug!(%id, %message, "response failed");
            }
            Err(SessionError::EmptyPrompt) => continue,
            Err(error) => eprintln!("error: {error}"),
        }
        session.observer_mut().finish_turn();
    }

    Ok(())
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(b"> ")?;
    stdout.flush()
}
