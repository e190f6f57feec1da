use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Error, Result};

use crate::conversion::Metric;

/// Operator command read from the console, one per line.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Arm per-scan recording.
    Record,
    /// Start an ungated session now.
    Monitor,
    /// Leave recording or monitoring.
    Stop,
    /// New custom values for the running session.
    Custom(Vec<String>),
    /// Assign a metric to a physical line.
    Assign { line: String, metric: Metric },
    Period(f64),
    Label { slot: usize, label: String },
    Enable { slot: usize, enabled: bool },
    Save,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  record                 arm per-scan recording
  monitor                record continuously, ignoring scan status
  stop                   stop recording or monitoring
  custom <v1> [v2] [v3]  send new custom values to the running session
  assign <line> <metric> e.g. 'assign DAC3 BP1Mean'
  period <seconds>       sample period
  label <slot> <text>    custom value label (slot 1-3)
  enable <slot>          enable a custom value slot
  disable <slot>         disable a custom value slot and the ones after it
  save                   save settings
  status                 show recorder status
  quit                   stop and exit";

impl FromStr for UserCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let rest: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "record" => UserCommand::Record,
            "monitor" => UserCommand::Monitor,
            "stop" => UserCommand::Stop,
            "save" => UserCommand::Save,
            "status" => UserCommand::Status,
            "help" | "?" => UserCommand::Help,
            "quit" | "exit" => UserCommand::Quit,
            "custom" => {
                if rest.is_empty() || rest.len() > crate::custom::CUSTOM_SLOTS {
                    bail!("custom takes 1 to {} values", crate::custom::CUSTOM_SLOTS);
                }
                UserCommand::Custom(rest.iter().map(|v| v.to_string()).collect())
            }
            "assign" => match rest.as_slice() {
                [line, metric] => UserCommand::Assign {
                    line: line.to_string(),
                    metric: metric.parse()?,
                },
                _ => bail!("usage: assign <line> <metric>"),
            },
            "period" => match rest.as_slice() {
                [seconds] => UserCommand::Period(
                    seconds
                        .parse()
                        .with_context(|| format!("invalid period '{seconds}'"))?,
                ),
                _ => bail!("usage: period <seconds>"),
            },
            "label" => {
                let (slot, label) = rest
                    .split_first()
                    .ok_or_else(|| anyhow!("usage: label <slot> <text>"))?;
                UserCommand::Label {
                    slot: parse_slot(slot)?,
                    label: label.join(" "),
                }
            }
            "enable" | "disable" => match rest.as_slice() {
                [slot] => UserCommand::Enable {
                    slot: parse_slot(slot)?,
                    enabled: verb.eq_ignore_ascii_case("enable"),
                },
                _ => bail!("usage: {verb} <slot>"),
            },
            other => bail!("unknown command '{other}' (try 'help')"),
        };
        Ok(command)
    }
}

/// Operator slots are numbered from 1.
fn parse_slot(word: &str) -> Result<usize> {
    let slot: usize = word
        .parse()
        .with_context(|| format!("invalid slot '{word}'"))?;
    if slot == 0 || slot > crate::custom::CUSTOM_SLOTS {
        bail!("slot must be between 1 and {}", crate::custom::CUSTOM_SLOTS);
    }
    Ok(slot - 1)
}
