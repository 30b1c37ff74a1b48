//! Line commands read by `sunset-ble run`

use std::future::Future;

use sunset_proto::{Brightness, Color};
use sunset_sync::{Control, Event, LoopState, Mode, SessionHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

pub const HELP: &str = "\
commands:
  color R G B        set the manual color
  brightness N       manual brightness, or the override while syncing
  override N         brightness override for screen sync
  sync on|off        toggle screen sync
  stop               disconnect and exit";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("`{command}` expects {expected}")]
    Usage {
        command: &'static str,
        expected: &'static str,
    },
    #[error("`{0}` is not a number in 0..=255")]
    Number(String),
    #[error("{}", HELP)]
    Help,
}

fn byte(text: &str) -> Result<u8, ParseError> {
    text.parse().map_err(|_| ParseError::Number(text.to_string()))
}

/// Parse a `R,G,B` triple as given to `--color`
pub fn parse_color(text: &str) -> Result<Color, String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [r, g, b] = parts[..] else {
        return Err(format!("expected R,G,B, got `{text}`"));
    };
    let channel = |s: &str| byte(s).map_err(|e| e.to_string());
    Ok(Color::new(channel(r)?, channel(g)?, channel(b)?))
}

/// Turn one input line into a control. Blank lines yield `None`.
///
/// `brightness` follows the current mode: it sets the manual brightness,
/// or the override while screen sync is on.
pub fn parse_line(line: &str, mode: Mode) -> Result<Option<Control>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return Ok(None);
    };

    let control = match (command.to_ascii_lowercase().as_str(), args) {
        ("color", [r, g, b]) => Control::SetManualColor(Color::new(byte(r)?, byte(g)?, byte(b)?)),
        ("color", _) => {
            return Err(ParseError::Usage { command: "color", expected: "three values R G B" });
        }
        ("brightness", [n]) => {
            let level = Brightness::new(byte(n)?);
            match mode {
                Mode::Manual => Control::SetManualBrightness(level),
                Mode::ScreenSync => Control::SetBrightnessOverride(level),
            }
        }
        ("override", [n]) => Control::SetBrightnessOverride(Brightness::new(byte(n)?)),
        ("brightness", _) | ("override", _) => {
            return Err(ParseError::Usage { command: "brightness", expected: "one value N" });
        }
        ("sync", ["on"]) => Control::EnableScreenSync(true),
        ("sync", ["off"]) => Control::EnableScreenSync(false),
        ("sync", _) => return Err(ParseError::Usage { command: "sync", expected: "`on` or `off`" }),
        ("stop" | "quit" | "exit", []) => Control::Stop,
        ("help" | "?", _) => return Err(ParseError::Help),
        _ => return Err(ParseError::Unknown(line.trim().to_string())),
    };
    Ok(Some(control))
}

/// Feed `input` lines to `session` and print its status until it ends.
///
/// End of input and `shutdown` both ask the session to stop; the loop keeps
/// draining events until the session reports a terminal state, so the lamp
/// is always released before this returns.
pub async fn drive<R>(
    session: SessionHandle,
    mut events: UnboundedReceiver<Event>,
    input: R,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut reading = true;
    let mut interrupted = false;
    let mut mode = Mode::Manual;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::Status(text)) => println!("{text}"),
                Some(Event::ColorApplied(color)) => debug!(%color, "applied"),
                Some(Event::State(state)) => {
                    if let LoopState::Running(m) = state {
                        mode = m;
                    }
                    if state.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            () = &mut shutdown, if !interrupted => {
                println!("Interrupted, disconnecting...");
                interrupted = true;
                reading = false;
                session.stop();
            }
            line = lines.next_line(), if reading => match line? {
                Some(line) => match parse_line(&line, mode) {
                    Ok(Some(Control::EnableScreenSync(true))) if !cfg!(feature = "capture") => {
                        println!("Screen sync needs the `capture` feature");
                    }
                    Ok(Some(control)) => send(&session, control),
                    Ok(None) => {}
                    Err(ParseError::Help) => println!("{HELP}"),
                    Err(e) => println!("{e}"),
                },
                None => {
                    reading = false;
                    session.stop();
                }
            },
        }
    }

    session.join().await?;
    Ok(())
}

fn send(session: &SessionHandle, control: Control) {
    match control {
        Control::SetManualColor(color) => session.set_manual_color(color),
        Control::SetManualBrightness(level) => session.set_manual_brightness(level),
        Control::SetBrightnessOverride(level) => session.set_brightness_override(level),
        Control::EnableScreenSync(enabled) => session.enable_screen_sync(enabled),
        Control::Stop => session.stop(),
    }
}
