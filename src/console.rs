//! One-shot CLI commands and the headless watch loop

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::api::{ChatApi, RestClient};
use crate::config::Config;
use crate::engine::{
    presenter, Command, DayGroup, MessageView, SessionEvent, SessionHandle, SessionOptions, Side,
};
use crate::live::{LiveFeed, SocketFeed};
use crate::models::{Attachment, ConversationId, Draft, MessageId, SessionPhase};

/// Settings changed by `configure`. `None` leaves a field as it is.
#[derive(Debug, Default)]
pub struct ConfigureArgs {
    pub base_url: Option<String>,
    pub live_url: Option<String>,
    pub token: Option<String>,
    pub operator: Option<String>,
    pub resync_on_reconnect: Option<bool>,
}

pub fn configure(args: ConfigureArgs) -> Result<()> {
    let mut config = Config::load()?;
    let changed = apply(&mut config, args);
    if !changed {
        println!("Nothing to change. Current settings:");
        return status();
    }
    config.save()?;
    println!("Configuration saved.");
    status()
}

fn apply(config: &mut Config, args: ConfigureArgs) -> bool {
    let mut changed = false;
    if let Some(url) = args.base_url {
        config.base_url = Some(url.trim().to_string());
        changed = true;
    }
    if let Some(url) = args.live_url {
        config.live_url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
        changed = true;
    }
    if let Some(token) = args.token {
        config.api_token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
        changed = true;
    }
    if let Some(operator) = args.operator {
        config.operator_id = Some(operator.trim().to_string());
        changed = true;
    }
    if let Some(resync) = args.resync_on_reconnect {
        config.resync_on_reconnect = resync;
        changed = true;
    }
    changed
}

pub fn status() -> Result<()> {
    let config = Config::load()?;
    let unset = || "(not set)".to_string();

    println!("Backend:    {}", config.base_url.clone().unwrap_or_else(unset));
    match config.live_url() {
        Ok(url) => println!("Live:       {}", url),
        Err(_) => println!("Live:       {}", unset()),
    }
    println!("Operator:   {}", config.operator_id.clone().unwrap_or_else(unset));
    println!("Token:      {}", config.masked_token().unwrap_or_else(unset));
    if let Some(limit) = config.history_limit {
        println!("History:    last {} messages", limit);
    }
    println!(
        "Resync:     {}",
        if config.resync_on_reconnect {
            "on reconnect"
        } else {
            "off"
        }
    );
    Ok(())
}

/// Fetch and print a conversation without opening a session.
pub async fn history(conversation: &str, json: bool) -> Result<()> {
    let config = Config::load()?;
    let client = RestClient::new(&config)?;
    let conversation = ConversationId::new(conversation);

    let records = client
        .fetch_history(&conversation)
        .await
        .with_context(|| format!("Failed to load history of {}", conversation))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let operator = config.operator_id.as_deref().unwrap_or_default();
    let days = presenter::present(&records, operator, &Local);
    if days.is_empty() {
        println!("(no messages)");
    }
    for day in &days {
        print_day(day);
    }
    Ok(())
}

pub async fn send(to: &str, message: Option<String>, attach: Option<PathBuf>) -> Result<()> {
    let draft = draft(message, attach)?;
    let mut session = open_session(to).await?;
    session.send(Command::Send(draft));

    let outcome = loop {
        match session.recv().await {
            Some(SessionEvent::Sent { id, .. }) => break Ok(id),
            Some(SessionEvent::SendFailed { error, .. }) | Some(SessionEvent::Error(error)) => {
                break Err(error)
            }
            Some(_) => continue,
            None => bail!("Session ended before the send completed"),
        }
    };
    session.shutdown().await;

    let id = outcome.context("Message not sent")?;
    println!("Message sent ({}).", id);
    Ok(())
}

pub async fn edit(
    conversation: &str,
    id: &str,
    message: Option<String>,
    attach: Option<PathBuf>,
) -> Result<()> {
    let draft = draft(message, attach)?;
    let mut session = open_session(conversation).await?;
    session.send(Command::Edit {
        id: MessageId::new(id),
        draft,
    });

    let outcome = loop {
        match session.recv().await {
            Some(SessionEvent::Edited(id)) => break Ok(id),
            Some(SessionEvent::Error(error)) => break Err(error),
            Some(_) => continue,
            None => bail!("Session ended before the edit completed"),
        }
    };
    session.shutdown().await;

    let id = outcome.context("Message not edited")?;
    println!("Message {} edited.", id);
    Ok(())
}

pub async fn delete(conversation: &str, id: &str) -> Result<()> {
    let mut session = open_session(conversation).await?;
    session.send(Command::Delete(MessageId::new(id)));

    let outcome = loop {
        match session.recv().await {
            Some(SessionEvent::Deleted(id)) => break Ok(id),
            Some(SessionEvent::Error(error)) => break Err(error),
            Some(_) => continue,
            None => bail!("Session ended before the delete completed"),
        }
    };
    session.shutdown().await;

    let id = outcome.context("Message not deleted")?;
    println!("Message {} deleted.", id);
    Ok(())
}

/// Follow a conversation, printing new messages until Ctrl-C.
pub async fn watch(conversation: &str) -> Result<()> {
    let config = Config::load()?;
    let api: Arc<dyn ChatApi> = Arc::new(RestClient::new(&config)?);
    let feed: Arc<dyn LiveFeed> = Arc::new(SocketFeed::new(&config)?);
    let options = SessionOptions {
        operator: config.operator_id()?.to_string(),
        acknowledge_reads: true,
        resync_on_reconnect: config.resync_on_reconnect,
    };

    let mut session = SessionHandle::start(api, Some(feed), options);
    session.send(Command::Select(ConversationId::new(conversation)));
    println!("Watching {} (Ctrl-C to stop)", conversation);

    let mut printed: HashSet<MessageId> = HashSet::new();
    let mut current_day = None;
    loop {
        tokio::select! {
            event = session.recv() => match event {
                Some(SessionEvent::View(view)) => {
                    for day in &view.days {
                        for message in &day.messages {
                            if !printed.insert(message.id.clone()) {
                                continue;
                            }
                            if current_day != Some(day.day) {
                                println!("-- {} --", day.label());
                                current_day = Some(day.day);
                            }
                            println!("{}", format_message(message));
                        }
                    }
                }
                Some(SessionEvent::Deleted(id)) => println!("(message {} deleted)", id),
                Some(SessionEvent::Error(e)) => eprintln!("Error: {}", e),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Start a REST-only session on `conversation` and wait for its history.
///
/// One-shot commands never acknowledge reads: nothing is shown to the operator.
async fn open_session(conversation: &str) -> Result<SessionHandle> {
    let config = Config::load()?;
    let api: Arc<dyn ChatApi> = Arc::new(RestClient::new(&config)?);
    let options = SessionOptions {
        operator: config.operator_id()?.to_string(),
        acknowledge_reads: false,
        resync_on_reconnect: false,
    };

    let mut session = SessionHandle::start(api, None, options);
    session.send(Command::Select(ConversationId::new(conversation)));

    loop {
        match session.recv().await {
            Some(SessionEvent::View(view)) if view.phase == SessionPhase::Live => {
                tracing::debug!("{} loaded with {} messages", conversation, view.len());
                return Ok(session);
            }
            Some(SessionEvent::Error(e)) => {
                session.shutdown().await;
                return Err(e).with_context(|| format!("Failed to open {}", conversation));
            }
            Some(_) => continue,
            None => bail!("Session ended while opening {}", conversation),
        }
    }
}

fn draft(message: Option<String>, attach: Option<PathBuf>) -> Result<Draft> {
    let mut draft = Draft::text(message.unwrap_or_default());
    if let Some(path) = attach {
        draft = draft.with_attachment(Attachment::from_path(&path)?);
    }
    Ok(draft)
}

fn print_day(day: &DayGroup) {
    println!("\n{}", day.label());
    println!("{:-<60}", "");
    for message in &day.messages {
        println!("{}", format_message(message));
    }
}

fn format_message(message: &MessageView) -> String {
    let arrow = match message.side {
        Side::Sent => ">",
        Side::Received => "<",
    };
    let mut line = format!(
        "[{}] {} {}: {}",
        message.time, arrow, message.sender, message.body
    );
    if let Some(ref url) = message.attachment_url {
        line.push_str(&format!(" [image: {}]", url));
    }
    if message.edited {
        line.push_str(" (edited)");
    }
    if message.side == Side::Received && !message.read {
        line.push_str(" *");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::tests::msg;
    use chrono::Utc;

    #[test]
    fn test_apply_configure_args() {
        let mut config = Config::default();
        assert!(!apply(&mut config, ConfigureArgs::default()));

        let changed = apply(
            &mut config,
            ConfigureArgs {
                base_url: Some(" https://shop.example.com ".to_string()),
                token: Some("".to_string()),
                resync_on_reconnect: Some(true),
                ..Default::default()
            },
        );
        assert!(changed);
        assert_eq!(config.base_url.as_deref(), Some("https://shop.example.com"));
        assert!(config.api_token.is_none());
        assert!(config.resync_on_reconnect);
    }

    #[test]
    fn test_format_message() {
        let mut theirs = msg("m1", "u1", 5);
        theirs.attachment_url = Some("https://cdn/p.png".to_string());
        let mut own = msg("m2", "op", 6);
        own.edited = true;

        let days = presenter::present(&[theirs, own], "op", &Utc);
        let lines: Vec<String> = days[0].messages.iter().map(format_message).collect();
        assert_eq!(
            lines,
            vec![
                "[10:05] < u1: body of m1 [image: https://cdn/p.png] *",
                "[10:06] > op: body of m2 (edited)",
            ]
        );
    }

    #[test]
    fn test_draft_without_attachment() {
        let text = draft(Some("hi".to_string()), None).unwrap();
        assert_eq!(text, Draft::text("hi"));
        assert!(draft(None, Some(PathBuf::from("/nonexistent/x.png"))).is_err());
    }
}
