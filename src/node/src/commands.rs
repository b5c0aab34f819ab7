//! Line-oriented control commands for a running simulation

use anyhow::{Context, Result};
use pbftviz_consensus::{Millis, NodeIndex, Phase, SimulationEngine};
use std::str::FromStr;

/// One operator action, parsed from a line such as `fault 2` or `phase commit`
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Play,
    Pause,
    Step(Option<Millis>),
    Skip,
    Request,
    Fault(NodeIndex),
    Rotate,
    Drop(String),
    Phase(Phase),
    ResetPhase,
    Reset,
    Speed(f64),
    Delay(Millis),
    Auto(bool),
    Manual(bool),
    Jitter(Millis),
    ResetPrefs,
    Status,
    Metrics,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().context("Empty command")?.to_ascii_lowercase();
        let arg = parts.next();

        let required = |name: &str| arg.with_context(|| format!("'{verb}' needs a {name}"));

        let cmd = match verb.as_str() {
            "play" => ControlCommand::Play,
            "pause" => ControlCommand::Pause,
            "step" => ControlCommand::Step(arg.map(str::parse::<Millis>).transpose()?),
            "skip" => ControlCommand::Skip,
            "request" => ControlCommand::Request,
            "fault" => ControlCommand::Fault(required("node index")?.parse()?),
            "rotate" => ControlCommand::Rotate,
            "drop" => ControlCommand::Drop(required("message id")?.to_string()),
            "phase" => ControlCommand::Phase(required("phase name")?.parse()?),
            "reset-phase" => ControlCommand::ResetPhase,
            "reset" => ControlCommand::Reset,
            "speed" => ControlCommand::Speed(required("multiplier")?.parse()?),
            "delay" => ControlCommand::Delay(required("delay in ms")?.parse()?),
            "auto" => ControlCommand::Auto(parse_switch(required("on/off")?)?),
            "manual" => ControlCommand::Manual(parse_switch(required("on/off")?)?),
            "jitter" => ControlCommand::Jitter(required("jitter in ms")?.parse()?),
            "reset-prefs" => ControlCommand::ResetPrefs,
            "status" => ControlCommand::Status,
            "metrics" => ControlCommand::Metrics,
            other => anyhow::bail!("Unknown command '{other}'"),
        };

        Ok(cmd)
    }
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => anyhow::bail!("Expected on/off, got '{other}'"),
    }
}

/// Apply `cmd` to the engine, returning a one-line human summary
pub fn execute(engine: &mut SimulationEngine, cmd: ControlCommand) -> Result<String> {
    let reply = match cmd {
        ControlCommand::Play => {
            engine.set_playing(true);
            "playing".to_string()
        }
        ControlCommand::Pause => {
            engine.set_playing(false);
            "paused".to_string()
        }
        ControlCommand::Step(delta) => {
            match delta {
                Some(delta) => engine.step(delta),
                None => engine.step_default(),
            }
            format!("t={}", engine.t())
        }
        ControlCommand::Skip => {
            engine.skip_phase();
            format!("phase {}", engine.phase())
        }
        ControlCommand::Request => {
            engine.trigger_request();
            format!("round {} proposing {}", engine.round().round, engine.round().expected_payload)
        }
        ControlCommand::Fault(node) => {
            let state = engine.toggle_faulty(node)?;
            format!("n{node} is now {state:?}")
        }
        ControlCommand::Rotate => {
            let leader = engine.rotate_leader();
            format!("view {} leader n{leader}", engine.view())
        }
        ControlCommand::Drop(id) => match engine.drop_message(&id) {
            0 => anyhow::bail!("No message with id '{id}' on the timeline"),
            removed => format!("dropped {id} ({removed} entries)"),
        },
        ControlCommand::Phase(phase) => {
            engine.set_phase(phase);
            format!("phase {phase} (paused)")
        }
        ControlCommand::ResetPhase => {
            engine.reset_phase();
            format!("phase {} restarted", engine.phase())
        }
        ControlCommand::Reset => {
            engine.reset_all();
            "simulation reset".to_string()
        }
        ControlCommand::Speed(speed) => {
            engine.set_speed(speed)?;
            format!("speed {speed}x")
        }
        ControlCommand::Delay(delay) => {
            engine.set_phase_delay(delay);
            format!("phase delay {delay}ms")
        }
        ControlCommand::Auto(on) => {
            engine.set_auto_advance(on);
            format!("auto-advance {}", if on { "on" } else { "off" })
        }
        ControlCommand::Manual(on) => {
            engine.set_manual_mode(on);
            format!("manual mode {}", if on { "on" } else { "off" })
        }
        ControlCommand::Jitter(jitter) => {
            engine.set_jitter(jitter);
            format!("jitter {jitter}ms")
        }
        ControlCommand::ResetPrefs => {
            engine.reset_preferences();
            format!("preferences reset, leader n{}", engine.leader_id())
        }
        ControlCommand::Status => status_line(engine),
        ControlCommand::Metrics => engine.metrics().export()?,
    };

    Ok(reply)
}

/// Compact one-line view of the engine state
pub fn status_line(engine: &SimulationEngine) -> String {
    let progress = engine
        .progress()
        .map(|p| format!(" {:?} {}/{}", p.kind, p.collected, p.needed))
        .unwrap_or_default();
    let waiting = if engine.is_awaiting_request() { " (awaiting request)" } else { "" };

    format!(
        "t={} phase={} round={} value={} view={} leader=n{} faulty={:?}{}{}",
        engine.t(),
        engine.phase(),
        engine.round().round,
        engine.round().value,
        engine.view(),
        engine.leader_id(),
        engine
            .nodes()
            .iter()
            .filter(|n| n.is_faulty())
            .map(|n| n.id)
            .collect::<Vec<_>>(),
        progress,
        waiting,
    )
}
