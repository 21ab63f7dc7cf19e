//! Interactive REPL that plays one visitor session by hand.
//!
//! Launch with `engagement repl`. Type `/help` for available commands, Tab for completion.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use engagement_engine::{
    content_for, rule_description, AnalyticsEvent, AnalyticsSink, ChannelRequest, EngagementEngine,
    EngineConfig, EnginePorts, EngineResult, MemoryStore, MessagingChannel, PopupView,
    SignalUpdate,
};

use crate::config::open_state_store;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/tick", "Advance time on site by N seconds (default 1)"),
    ("/scroll", "Scroll to a depth in percent"),
    ("/nav", "Simulate a client-side page navigation"),
    ("/leave", "Move the pointer out through the top edge"),
    ("/close", "Dismiss the popup"),
    ("/submit", "Submit the capture form with a contact"),
    ("/status", "Show session metrics and trigger state"),
    ("/reset", "Forget the cross-session impression record"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct SessionHelper;

impl Completer for SessionHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for SessionHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for SessionHelper {}
impl Validator for SessionHelper {}
impl Helper for SessionHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Prints analytics events in gray under the prompt.
struct EchoSink;

impl AnalyticsSink for EchoSink {
    fn emit(&self, event: &AnalyticsEvent) {
        let params = serde_json::to_string(&event.params).unwrap_or_default();
        eprintln!("  \x1b[90m\u{2022} {} {params}\x1b[0m", event.name);
    }
}

/// Prints the chat hand-off instead of opening anything.
struct EchoChannel;

impl MessagingChannel for EchoChannel {
    fn open(&self, request: &ChannelRequest) -> EngineResult<()> {
        eprintln!();
        eprintln!("  \x1b[32m\u{2192} chat opened for {}\x1b[0m", request.contact);
        for line in request.message.lines() {
            eprintln!("    {line}");
        }
        eprintln!();
        Ok(())
    }
}

/// Run the interactive REPL.
pub fn run(config: EngineConfig, state_path: PathBuf, seed: Option<u64>) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mengagement v{}\x1b[0m \x1b[90m\u{2014} lead-capture session simulator\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let ports = EnginePorts::new(Box::new(MemoryStore::new()), open_state_store(&state_path))
        .with_analytics(EchoSink)
        .with_channel(EchoChannel);
    let mut engine = EngagementEngine::new(config, ports, rng);
    let variant = engine.variant();
    eprintln!(
        "  Session {} \u{2014} variant \x1b[1m{variant}\x1b[0m, rule: {}",
        engine.session_id(),
        rule_description(variant)
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<SessionHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(SessionHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = PathBuf::from(&home).join(".engagement_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36msession>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "tick" => cmd_tick(&mut engine, args),
                    "scroll" => cmd_scroll(&mut engine, args),
                    "nav" => show(engine.apply(SignalUpdate::Navigation)),
                    "leave" => show(engine.apply(SignalUpdate::PointerLeave { y: 0.0 })),
                    "close" => {
                        if !engine.close() {
                            eprintln!("  No popup is showing.");
                        }
                    }
                    "submit" => cmd_submit(&mut engine, args),
                    "status" => cmd_status(&engine),
                    "reset" => {
                        engine.clear_frequency_record();
                        eprintln!("  Impression record cleared.");
                    }
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands.");
    eprintln!();
}

fn show(view: Option<PopupView>) {
    let Some(view) = view else {
        return;
    };
    let Some(content) = content_for(view.variant) else {
        return;
    };
    eprintln!();
    eprintln!("  \x1b[1m\u{250c} {}\x1b[0m", content.headline);
    for benefit in content.benefits {
        eprintln!("  \u{2502}  \u{2713} {benefit}");
    }
    eprintln!("  \u{2502}  [ {} ]", content.contact_placeholder);
    eprintln!("  \u{2514} \x1b[36m{}\x1b[0m   (/submit <contact> or /close)", content.call_to_action);
    eprintln!();
}

/// Longest stretch a single `/tick` may simulate, one day.
const MAX_TICK_SECONDS: u64 = 86_400;

fn parse_tick_seconds(args: &str) -> Option<u64> {
    if args.is_empty() {
        return Some(1);
    }
    args.parse::<u64>()
        .ok()
        .filter(|n| (1..=MAX_TICK_SECONDS).contains(n))
}

fn cmd_tick<R: rand::Rng>(engine: &mut EngagementEngine<R>, args: &str) {
    let Some(seconds) = parse_tick_seconds(args) else {
        eprintln!("  Usage: /tick [seconds]  (1 to {MAX_TICK_SECONDS})");
        return;
    };
    for _ in 0..seconds {
        show(engine.apply(SignalUpdate::Tick));
    }
    eprintln!("  Time on site: {}s", engine.metrics().time_on_site_seconds);
}

fn cmd_scroll<R: rand::Rng>(engine: &mut EngagementEngine<R>, args: &str) {
    let Ok(percent) = args.trim_end_matches('%').parse::<f64>() else {
        eprintln!("  Usage: /scroll <percent>");
        return;
    };
    show(engine.apply(SignalUpdate::Scroll {
        scroll_top: percent,
        viewport_height: 0.0,
        document_height: 100.0,
    }));
    eprintln!(
        "  Max scroll depth: {:.0}%",
        engine.metrics().max_scroll_depth_percent
    );
}

fn cmd_submit<R: rand::Rng>(engine: &mut EngagementEngine<R>, args: &str) {
    match engine.submit(args) {
        Ok(Some(_)) => eprintln!("  Lead captured."),
        Ok(None) => eprintln!("  No popup is showing."),
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_status<R: rand::Rng>(engine: &EngagementEngine<R>) {
    let status = engine.status();
    let m = status.metrics;
    eprintln!();
    eprintln!("  Session:       {}", status.session_id);
    eprintln!("  Variant:       {}", status.variant);
    eprintln!("  Trigger:       {:?}", status.phase);
    eprintln!("  Popup:         {:?}", status.popup);
    eprintln!("  Time on site:  {}s", m.time_on_site_seconds);
    eprintln!("  Scroll depth:  {:.0}%", m.max_scroll_depth_percent);
    eprintln!("  Page views:    {}", m.page_view_count);
    eprintln!("  Exit intent:   {}", m.exit_intent_fired);
    match engine.eligible_at() {
        Some(at) => eprintln!("  Cooling down until {}", at.to_rfc3339()),
        None => eprintln!("  Eligible for a popup"),
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_seconds_default_and_bounds() {
        assert_eq!(parse_tick_seconds(""), Some(1));
        assert_eq!(parse_tick_seconds("60"), Some(60));
        assert_eq!(parse_tick_seconds("86400"), Some(MAX_TICK_SECONDS));
        assert_eq!(parse_tick_seconds("86401"), None);
        assert_eq!(parse_tick_seconds("18446744073709551615"), None);
        assert_eq!(parse_tick_seconds("0"), None);
        assert_eq!(parse_tick_seconds("soon"), None);
    }
}
