//! Interactive console.
//!
//! Reads commands from stdin, drives the supervisor through its handle and
//! echoes what the bot sends. `pm`/`say` lines are typed as the local operator.

use std::{sync::Arc, time::Duration};

use tokio::io::{AsyncBufReadExt, BufReader};
use ttb_core::{
    domain::{Recipient, UserId},
    session::{on_off, Feature, StatusSnapshot},
    supervisor::SupervisorHandle,
    transport::{LocalTransport, Outbound, Transport},
    utils::{format_uptime, local_timestamp},
};

const ECHO_INTERVAL: Duration = Duration::from_millis(250);

const HELP: &str = "\
Commands:
  help                     show this help
  status                   show bot status
  toggle <feature>         jcl|chanmsg|broadcast|aipm|aichan|filter|lock|context_history|debug_logging
  set_retention <minutes>  set context history retention
  restart                  restart the bot
  exit | quit              stop the bot and exit
  pm <text>                send a private message to the bot
  say <text>               send a message to the bot's channel";

pub async fn run(
    handle: SupervisorHandle,
    transport: Arc<LocalTransport>,
    operator: UserId,
) -> anyhow::Result<()> {
    let shutdown = handle.shutdown_token();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut echo = tokio::time::interval(ECHO_INTERVAL);

    println!("ttb console. Type 'help' for commands.");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = echo.tick() => print_outbound(&transport),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // stdin closed; keep serving until shut down.
                    shutdown.cancelled().await;
                    break;
                };
                if !handle_line(&handle, &transport, operator, line.trim()).await {
                    handle.shutdown();
                    break;
                }
            }
        }
    }
    print_outbound(&transport);
    Ok(())
}

/// Returns `false` when the console should exit.
async fn handle_line(
    handle: &SupervisorHandle,
    transport: &LocalTransport,
    operator: UserId,
    line: &str,
) -> bool {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd.to_lowercase().as_str() {
        "" => {}
        "help" => println!("{HELP}"),
        "status" => print_status(&handle.status()),
        "toggle" => match Feature::from_short_name(rest) {
            Some(feature) => {
                if !handle.toggle(feature).await {
                    println!("Bot is not running.");
                }
            }
            None => println!("Unknown feature '{rest}'. Type 'help' for the list."),
        },
        "set_retention" => match rest.parse::<u64>() {
            Ok(minutes) => {
                if handle.set_retention(minutes).await {
                    println!("Context history retention set to {minutes} minutes.");
                } else {
                    println!("Bot is not running.");
                }
            }
            Err(_) => println!("Usage: set_retention <minutes>"),
        },
        "restart" => {
            if handle.restart().await {
                println!("Restart requested.");
            } else {
                println!("Restart already in progress.");
            }
        }
        "exit" | "quit" => return false,
        "pm" | "say" if rest.is_empty() => println!("Usage: {cmd} <text>"),
        "pm" => match handle.status().my_user_id {
            Some(bot) => transport.say(operator, Recipient::User(bot), rest),
            None => println!("Bot is not logged in."),
        },
        "say" => {
            let status = handle.status();
            match transport.channel_id_from_path(&status.target_channel_path) {
                Some(channel) if status.in_channel => {
                    transport.say(operator, Recipient::Channel(channel), rest)
                }
                _ => println!("Bot is not in a channel."),
            }
        }
        _ => println!("Unknown command '{cmd}'. Type 'help' for commands."),
    }
    true
}

fn print_status(s: &StatusSnapshot) {
    let t = &s.toggles;
    println!("--- Bot Status ({}) ---", local_timestamp());
    println!("Phase: {}", s.phase);
    println!("Nickname: {}", s.nickname);
    println!(
        "Channel: {} ({})",
        s.target_channel_path,
        if s.in_channel { "joined" } else { "not joined" }
    );
    println!("Uptime: {}", format_uptime(Some(Duration::from_secs(s.uptime_secs))));
    println!("Locked: {}", on_off(s.locked));
    println!("Welcome mode: {:?}", s.welcome_mode);
    println!("Admins online: {}", s.admin_count);
    println!("Join/Leave Announce: {}", on_off(t.announce_join_leave));
    println!("Channel Messages: {}", on_off(t.allow_channel_messages));
    println!("Broadcasts: {}", on_off(t.allow_broadcast));
    println!("Gemini PM: {}", on_off(t.allow_ai_pm));
    println!("Gemini Channel: {}", on_off(t.allow_ai_channel));
    println!("Word Filter: {}", on_off(t.filter_enabled));
    println!("Context History: {}", on_off(t.context_history_enabled));
    println!("Debug Logging: {}", on_off(t.debug_logging_enabled));
    if !s.blocked_commands.is_empty() {
        println!("Blocked: {}", s.blocked_commands.join(", "));
    }
}

fn print_outbound(transport: &LocalTransport) {
    for sent in transport.take_outbound() {
        if let Outbound::Text { to, content } = sent {
            let target = match to {
                Recipient::User(u) => format!("pm:{u}"),
                Recipient::Channel(c) => format!("chan:{c}"),
                Recipient::Broadcast => "broadcast".to_string(),
            };
            println!("[{target}] {content}");
        }
    }
}
