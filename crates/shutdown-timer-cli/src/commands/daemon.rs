//! Foreground timer. Intents are read line by line from stdin and every
//! controller event is written to stdout as one JSON object per line.

use shutdown_timer_core::{
    ConfigStore, ControlMessage, ControlSender, Controller, ControllerParts, Event, ScheduleMode,
    UserIntent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn run() -> CmdResult {
    let store = ConfigStore::open()?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let (controller, inbox) = Controller::new(ControllerParts::system(store));
        let _events = controller.subscribe(print_event);

        let tx = controller.sender();
        tokio::spawn(read_intents(tx.clone()));
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted");
                let _ = tx.send(ControlMessage::Shutdown);
            }
        });

        controller.run(inbox).await;
    });
    // The stdin reader may still be parked in a blocking read.
    rt.shutdown_background();
    Ok(())
}

fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "could not serialize event"),
    }
}

async fn read_intents(tx: ControlSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_intent(&line) {
                Ok(Some(message)) => {
                    let shutdown = matches!(message, ControlMessage::Shutdown);
                    if tx.send(message).is_err() || shutdown {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("error: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    tracing::debug!("stdin closed");
    let _ = tx.send(ControlMessage::Shutdown);
}

/// Parses one stdin line. Blank lines yield `None`.
fn parse_intent(line: &str) -> Result<Option<ControlMessage>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments: {line}"));
    }

    let power_mode = |arg: Option<&str>| -> Result<ScheduleMode, String> {
        let raw = arg.ok_or_else(|| format!("{verb} needs a mode"))?;
        let mode = ScheduleMode::from(raw.to_lowercase());
        if ScheduleMode::POWER_MODES.contains(&mode) {
            Ok(mode)
        } else {
            Err(format!("unknown power mode: {raw}"))
        }
    };

    let intent = match (verb, arg) {
        ("start", None) => UserIntent::Start,
        ("stop", None) => UserIntent::Stop,
        ("status", None) => UserIntent::Status,
        ("mode", _) => UserIntent::SetMode(power_mode(arg)?),
        ("start-mode", _) => UserIntent::StartMode(power_mode(arg)?),
        ("wake", Some(raw)) => UserIntent::Wake(ScheduleMode::from(raw)),
        ("wake", None) => UserIntent::Wake(ScheduleMode::Wake),
        ("root", Some("on")) => UserIntent::SetRootMode(true),
        ("root", Some("off")) => UserIntent::SetRootMode(false),
        ("quit" | "exit", None) => return Ok(Some(ControlMessage::Shutdown)),
        _ => return Err(format!("unrecognized command: {line}")),
    };
    Ok(Some(ControlMessage::Intent(intent)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert!(matches!(parse_intent(""), Ok(None)));
        assert!(matches!(parse_intent("   "), Ok(None)));
    }

    #[test]
    fn simple_verbs() {
        assert!(matches!(
            parse_intent("start"),
            Ok(Some(ControlMessage::Intent(UserIntent::Start)))
        ));
        assert!(matches!(
            parse_intent(" stop "),
            Ok(Some(ControlMessage::Intent(UserIntent::Stop)))
        ));
        assert!(matches!(
            parse_intent("quit"),
            Ok(Some(ControlMessage::Shutdown))
        ));
        assert!(matches!(
            parse_intent("exit"),
            Ok(Some(ControlMessage::Shutdown))
        ));
    }

    #[test]
    fn mode_verbs_take_power_modes_only() {
        assert!(matches!(
            parse_intent("mode reboot"),
            Ok(Some(ControlMessage::Intent(UserIntent::SetMode(ScheduleMode::Reboot))))
        ));
        assert!(matches!(
            parse_intent("start-mode suspend"),
            Ok(Some(ControlMessage::Intent(UserIntent::StartMode(ScheduleMode::Suspend))))
        ));
        assert!(parse_intent("mode wake").is_err());
        assert!(parse_intent("mode").is_err());
    }

    #[test]
    fn wake_and_root() {
        assert!(matches!(
            parse_intent("wake"),
            Ok(Some(ControlMessage::Intent(UserIntent::Wake(ScheduleMode::Wake))))
        ));
        assert!(matches!(
            parse_intent("wake no-wake"),
            Ok(Some(ControlMessage::Intent(UserIntent::Wake(ScheduleMode::NoWake))))
        ));
        assert!(matches!(
            parse_intent("root on"),
            Ok(Some(ControlMessage::Intent(UserIntent::SetRootMode(true))))
        ));
        assert!(parse_intent("root maybe").is_err());
        assert!(parse_intent("start now please").is_err());
        assert!(parse_intent("launch").is_err());
    }
}
