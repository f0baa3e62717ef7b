use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time;
use tokio::time::Instant;
use yansi::Paint;

use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::Notice;
use crate::domain::models::Outfit;
use crate::domain::models::Role;
use crate::domain::models::SlashCommand;
use crate::domain::models::WardrobeItem;
use crate::domain::services::actions::help_text;

/// The typing indicator stays visible at least this long, even when the
/// first delta lands sooner. Presentation smoothing only.
const TYPING_INDICATOR_MIN: Duration = Duration::from_millis(300);

const TYPING_INDICATOR: &str = "concierge is typing...";

fn prompt() {
    print!("> ");
    std::io::stdout().flush().unwrap();
}

fn clear_line() {
    print!("\r{:width$}\r", "", width = TYPING_INDICATOR.len() + 2);
    std::io::stdout().flush().unwrap();
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("{} {}", Paint::cyan("You:").bold(), message.content),
        Role::Assistant => {
            println!("{} {}", Paint::green("Concierge:").bold(), message.content)
        }
    }
    println!();
}

fn print_transcript(messages: &[Message]) {
    for message in messages {
        print_message(message);
    }
}

fn print_notice(notice: &Notice) {
    eprintln!("{}", Paint::red(notice.to_string()));
    if notice.is_retryable() {
        eprintln!("{}", Paint::new("You can retry your last message.").dimmed());
    }
}

async fn load_wardrobe(args: &[String]) -> Result<Vec<WardrobeItem>> {
    if args.is_empty() {
        anyhow::bail!("Pass a wardrobe file, for example: /outfits wardrobe.yaml");
    }

    let payload = tokio::fs::read_to_string(&args[0]).await?;
    let items: Vec<WardrobeItem> = serde_yaml::from_str(&payload)?;
    if items.is_empty() {
        anyhow::bail!("The wardrobe file has no items in it");
    }

    return Ok(items);
}

async fn hold_typing_indicator(typing_since: &Option<Instant>) {
    if let Some(started) = typing_since {
        let elapsed = started.elapsed();
        if elapsed < TYPING_INDICATOR_MIN {
            time::sleep(TYPING_INDICATOR_MIN - elapsed).await;
        }
    }
}

pub async fn start(
    tx: mpsc::UnboundedSender<Action>,
    mut rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    println!(
        "{}",
        Paint::new("Welcome to your retail concierge. Type a message, or /help for commands.")
            .dimmed()
    );
    println!();

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut waiting = false;
    let mut reply_open = false;
    let mut typing_since: Option<Instant> = None;

    loop {
        tokio::select! {
            event = rx.recv() => {
                if event.is_none() {
                    break;
                }

                match event.unwrap() {
                    Event::ConversationLoaded(messages) => {
                        print_transcript(&messages);
                        prompt();
                    }
                    Event::ReplyTyping() => {
                        typing_since = Some(Instant::now());
                        print!("{}", Paint::new(TYPING_INDICATOR).dimmed());
                        std::io::stdout().flush().unwrap();
                    }
                    Event::ReplyDelta(text) => {
                        if !reply_open {
                            hold_typing_indicator(&typing_since).await;
                            clear_line();
                            print!("{} ", Paint::green("Concierge:").bold());
                            reply_open = true;
                        }
                        print!("{text}");
                        std::io::stdout().flush().unwrap();
                    }
                    Event::ReplyCompleted() => {
                        if !reply_open {
                            hold_typing_indicator(&typing_since).await;
                            clear_line();
                        }
                        println!();
                        println!();
                        waiting = false;
                        reply_open = false;
                        typing_since = None;
                        prompt();
                    }
                    Event::ReplyFailed(notice) => {
                        if reply_open {
                            println!();
                        } else {
                            clear_line();
                        }
                        print_notice(&notice);
                        waiting = false;
                        reply_open = false;
                        typing_since = None;
                        prompt();
                    }
                    Event::ReplyAborted() => {
                        if reply_open {
                            println!();
                        } else {
                            clear_line();
                        }
                        println!("{}", Paint::new("(reply cancelled)").dimmed());
                        waiting = false;
                        reply_open = false;
                        typing_since = None;
                        prompt();
                    }
                    Event::OutfitsSuggested(outfits) => {
                        println!("{}", Outfit::format_list(&outfits));
                        println!();
                        waiting = false;
                        prompt();
                    }
                    Event::Notice(notice) => {
                        print_notice(&notice);
                        if waiting {
                            waiting = false;
                            prompt();
                        }
                    }
                }
            }
            line = stdin_lines.next_line() => {
                let line = line?;
                if line.is_none() {
                    // stdin closed.
                    break;
                }

                let input = line.unwrap().trim().to_string();

                if waiting {
                    if let Some(command) = SlashCommand::parse(&input) {
                        if command.is_abort() {
                            tx.send(Action::AbortReply())?;
                            continue;
                        }
                        if command.is_quit() {
                            break;
                        }
                    }
                    if !input.is_empty() {
                        println!(
                            "{}",
                            Paint::new("A reply is in progress. Use /abort to cancel it.").dimmed()
                        );
                    }
                    continue;
                }

                if input.is_empty() {
                    prompt();
                    continue;
                }

                if let Some(command) = SlashCommand::parse(&input) {
                    if command.is_quit() {
                        break;
                    }
                    if command.is_help() {
                        println!("{}", help_text());
                        println!();
                        prompt();
                        continue;
                    }
                    if command.is_outfits() {
                        match load_wardrobe(&command.args).await {
                            Ok(items) => {
                                waiting = true;
                                tx.send(Action::SuggestOutfits(items))?;
                            }
                            Err(err) => {
                                eprintln!("{}", Paint::red(err.to_string()));
                                prompt();
                            }
                        }
                        continue;
                    }
                    if command.is_abort() {
                        println!("{}", Paint::new("No reply is in progress.").dimmed());
                        prompt();
                        continue;
                    }
                }

                waiting = true;
                tx.send(Action::SubmitPrompt(input))?;
            }
        }
    }

    return Ok(());
}
