use std::{io::Write, time::Duration};

use ansi_term::Colour;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::{
    context::Tracker,
    earnings::format_earnings,
    model::CompanyId,
    timer::{Timer, TimerState},
    utils::time::{format_duration, format_elapsed},
};

const STATUS_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Pause,
    Resume,
    Stop,
    Abandon,
    Status,
    Help,
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" | "start" => Some(Self::Resume),
            "s" | "stop" | "q" | "quit" => Some(Self::Stop),
            "a" | "abandon" => Some(Self::Abandon),
            "" => Some(Self::Status),
            "h" | "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

const HELP: &str = "p pause, r resume, s stop and save, a abandon without saving";

/// Runs a session for `id` until it's stopped or abandoned. Closing stdin or Ctrl+C stops and
/// saves the session.
pub async fn track(tracker: &Tracker, id: CompanyId) -> Result<()> {
    let timer = tracker.timer();
    let company = timer.select_company(id).await?;
    timer.start().await?;
    println!("Tracking {} at {}. {HELP}", company.name, company.hourly_rate);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut status = tokio::time::interval(STATUS_PERIOD);
    loop {
        let input = tokio::select! {
            _ = status.tick() => {
                print_status(&timer.state());
                continue;
            }
            _ = tokio::signal::ctrl_c() => Input::Stop,
            line = lines.next_line() => match line? {
                Some(line) => match Input::parse(&line) {
                    Some(input) => input,
                    None => {
                        println!("Unknown command {line:?}. {HELP}");
                        continue;
                    }
                },
                None => Input::Stop,
            },
        };
        debug!("Track input {input:?}");

        match input {
            Input::Pause => timer.pause().await,
            Input::Resume => {
                if let Err(e) = timer.start().await {
                    print_error(&e);
                    timer.clear_error().await;
                }
            }
            Input::Status => print_status(&timer.state()),
            Input::Help => println!("{HELP}"),
            Input::Abandon => {
                timer.abandon().await;
                println!("\nSession discarded");
                break;
            }
            Input::Stop => {
                if stop(&timer).await {
                    break;
                }
            }
        }
    }
    timer.shutdown();
    Ok(())
}

/// Returns false if the session is still there and can be retried.
async fn stop(timer: &Timer) -> bool {
    match timer.stop().await {
        Ok(Some(interval)) => {
            let state = timer.state();
            debug!("Timer after stop {state:?}");
            println!(
                "\nSaved {} from {}",
                format_duration(interval.duration_millis),
                interval.start.with_timezone(&chrono::Local).format("%x %H:%M")
            );
            true
        }
        Ok(None) => true,
        Err(e) => {
            warn!("Couldn't save the session {e}");
            print_error(&e);
            println!("The session is kept, stop again to retry or abandon it");
            timer.clear_error().await;
            false
        }
    }
}

fn print_status(state: &TimerState) {
    print!(
        "\r{:?}\t{}\t{}   ",
        state.phase,
        format_elapsed(state.elapsed_millis),
        format_earnings(state.current_earnings)
    );
    // the status line is cosmetic
    let _ = std::io::stdout().flush();
}

fn print_error(error: &impl std::fmt::Display) {
    eprintln!("\n{} {error}", Colour::Red.bold().paint("error:"));
}
