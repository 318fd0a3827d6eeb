//! hitl-client - terminal front end for a human-in-the-loop agent backend
//!
//! Lines typed at the prompt become user messages. While the agent waits on a
//! human, the next line answers it instead. `/reset` starts a new thread and
//! `/quit` exits; Ctrl-C abandons the turn in progress.

use hitl_client::config::ClientConfig;
use hitl_client::intervention::parse_reply;
use hitl_client::render::TerminalRenderer;
use hitl_client::runtime::{spawn_session, HttpEventSource, SessionHandle, TracingDiagnostics};
use hitl_client::state_machine::{ConvContext, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hitl_client=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    init_logging(config.log_json);

    tracing::info!(
        base_url = %config.base_url,
        mode = config.mode.as_str(),
        "Starting client"
    );

    let source = HttpEventSource::new(&config)?;
    if let Err(e) = source.ping().await {
        tracing::warn!(error = %e, "Backend did not answer ping; continuing anyway");
    }

    let context = ConvContext::new(config.mode.endpoints());
    let (session, task) = spawn_session(context, source, TerminalRenderer::new(), TracingDiagnostics);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                let thread = session.reset().await?;
                tracing::info!(thread_id = %thread, "Started new thread");
                continue;
            }
            _ => {}
        }

        let snapshot = session.snapshot();
        let submitted = match &snapshot.state {
            SessionState::AwaitingHuman { prompt } => {
                let Some(response) = parse_reply(prompt, line) else {
                    eprintln!("! reply 'y' to confirm, or name=...; birthday=... to correct");
                    continue;
                };
                session
                    .submit_human_response(&snapshot.thread_id, response)
                    .await
            }
            _ => session.start_turn(&snapshot.thread_id, line).await,
        };

        match submitted {
            Ok(()) => wait_for_turn(&session).await?,
            Err(e) => eprintln!("! {e}"),
        }
    }

    drop(session);
    task.await?;
    Ok(())
}

/// Block until the turn settles; Ctrl-C abandons it
async fn wait_for_turn(session: &SessionHandle) -> Result<(), Box<dyn std::error::Error>> {
    tokio::select! {
        settled = session.wait_until_settled() => {
            settled?;
        }
        _ = tokio::signal::ctrl_c() => {
            let thread = session.reset().await?;
            tracing::info!(thread_id = %thread, "Turn abandoned; started new thread");
        }
    }
    Ok(())
}
