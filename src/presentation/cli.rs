// Command-line arguments
use crate::domain::device::ActuatorCommand;
use anyhow::{Context, bail};

pub const USAGE: &str = "\
Usage:
  vial-monitor [monitor]            live chart of every configured vial
  vial-monitor pump <pump> <volume> dispense <volume> mL
  vial-monitor valve <valve> <open|closed>
  vial-monitor status               backend status and active experiment

Settings come from config/monitor.toml and VIAL_MONITOR__<SECTION>__<KEY>.";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Monitor,
    Command(ActuatorCommand),
    Status,
    Help,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<CliCommand> {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();

    match words.as_slice() {
        [] | ["monitor"] => Ok(CliCommand::Monitor),
        ["status"] => Ok(CliCommand::Status),
        ["help"] | ["-h"] | ["--help"] => Ok(CliCommand::Help),
        ["pump", pump, volume] => {
            let pump = pump.parse().with_context(|| format!("invalid pump id {:?}", pump))?;
            let volume = volume
                .parse()
                .with_context(|| format!("invalid volume {:?}", volume))?;
            Ok(CliCommand::Command(ActuatorCommand::pump(pump, volume)))
        }
        ["valve", valve, state] => {
            let valve = valve.parse().with_context(|| format!("invalid valve id {:?}", valve))?;
            let open = match *state {
                "open" | "on" | "true" => true,
                "closed" | "close" | "off" | "false" => false,
                other => bail!("invalid valve state {:?}, expected open or closed", other),
            };
            Ok(CliCommand::Command(ActuatorCommand::valve(valve, open)))
        }
        _ => bail!("unrecognized arguments: {}\n\n{}", words.join(" "), USAGE),
    }
}
