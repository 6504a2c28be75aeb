use anyhow::{bail, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use studytime_ipc::{format_clock, request, Command, Response, TimerMode, TimerStatus, SOCKET_PATH};

#[derive(Parser)]
#[command(name = "studytimectl")]
#[command(about = "Control the studytime timer", long_about = None)]
struct Cli {
    /// Socket the studytime daemon listens on
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the timer
    Start,
    /// Pause the timer
    Pause,
    /// Resume the timer
    Resume,
    /// Reset the timer
    Reset,
    /// Switch between countdown and stopwatch (resets the clock)
    Mode { mode: TimerMode },
    /// Set the countdown length
    Duration {
        minutes: u64,
        #[arg(default_value_t = 0)]
        seconds: u64,
    },
    /// Choose the completion alarm
    Alarm { id: String },
    /// Set the subject being studied; omit the id to clear it
    Subject { id: Option<i64> },
    /// Set the topic being studied
    Topic { text: Vec<String> },
    /// Mark the study session as started now
    SessionStart {
        /// Clear the session start instead
        #[arg(long)]
        clear: bool,
    },
    /// Get timer status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Convert CLI command to IPC command
    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Pause => Command::Pause,
        Commands::Resume => Command::Resume,
        Commands::Reset => Command::Reset,
        Commands::Mode { mode } => Command::SetMode { mode },
        Commands::Duration { minutes, seconds } => Command::SetDuration { minutes, seconds },
        Commands::Alarm { id } => Command::SetAlarm { id },
        Commands::Subject { id } => Command::SetSubject { subject_id: id },
        Commands::Topic { text } => Command::SetTopic {
            topic: text.join(" "),
        },
        Commands::SessionStart { clear } => Command::SetSessionStart {
            at: (!clear).then(Utc::now),
        },
        Commands::Status => Command::Status,
    };

    match request(&cli.socket, &command).await? {
        Response::Ok => println!("OK"),
        Response::Status(status) => print_status(&status),
        Response::Error(e) => bail!("{}", e),
    }

    Ok(())
}

fn print_status(status: &TimerStatus) {
    println!("Mode:    {}", status.mode);
    println!("State:   {:?}", status.state);
    match status.mode {
        TimerMode::Countdown => println!(
            "Clock:   {} of {}",
            format_clock(status.seconds),
            format_clock(status.initial_seconds)
        ),
        TimerMode::Stopwatch => println!("Clock:   {}", format_clock(status.seconds)),
    }
    println!("Alarm:   {}", status.alarm);
    if let Some(subject) = status.subject_id {
        println!("Subject: {}", subject);
    }
    if !status.topic.is_empty() {
        println!("Topic:   {}", status.topic);
    }
    if let Some(at) = status.session_start {
        println!("Session: started {}", at.with_timezone(&Local).format("%H:%M"));
    }
}
