//! Fence daemons hand options to agents as `key=value` lines on stdin when
//! the agent is started without arguments. This module turns such a stream
//! into an argv that the regular parser understands.

use std::collections::HashMap;
use std::io::BufRead;

use clap::{ArgAction, CommandFactory};

use crate::cli::Cli;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StdinOptions {
    pub argv: Vec<String>,
    /// Keys with no matching option. Logged and skipped.
    pub unknown: Vec<String>,
}

enum Kind {
    Flag(String),
    Value(String),
}

/// Option names (long names and visible aliases, `-` folded to `_`) mapped
/// to the long name they stand for.
fn known_options() -> HashMap<String, Kind> {
    let cmd = Cli::command();
    let mut known = HashMap::new();
    for arg in cmd.get_arguments() {
        let Some(long) = arg.get_long() else { continue };
        let is_flag = match arg.get_action() {
            ArgAction::SetTrue | ArgAction::SetFalse => true,
            ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong | ArgAction::Version => {
                continue
            }
            _ => false,
        };
        let aliases = arg.get_visible_aliases().unwrap_or_default();
        for name in std::iter::once(long).chain(aliases) {
            let kind = if is_flag {
                Kind::Flag(long.to_string())
            } else {
                Kind::Value(long.to_string())
            };
            known.insert(name.replace('-', "_"), kind);
        }
    }
    known
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "" | "1" | "on" | "yes" | "true")
}

/// Parse `key=value` lines. Blank lines and `#` comments are skipped; keys
/// may use `_` or `-`; a bare `key` is a flag.
pub fn parse<R: BufRead>(input: R) -> std::io::Result<StdinOptions> {
    let known = known_options();
    let mut out = StdinOptions {
        argv: vec!["fence_nnf".to_string()],
        unknown: Vec::new(),
    };

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (line, None),
        };
        let key = key.replace('-', "_");

        match known.get(&key) {
            Some(Kind::Flag(long)) => {
                if value.map_or(true, truthy) {
                    out.argv.push(format!("--{long}"));
                }
            }
            Some(Kind::Value(long)) => {
                out.argv.push(format!("--{long}={}", value.unwrap_or_default()));
            }
            None => out.unknown.push(key),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> StdinOptions {
        parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn option_is_an_alias_for_action() {
        let opts = parse_str("option=status\nnnf_node_name=rabbit-3\n");
        assert_eq!(
            opts.argv,
            ["fence_nnf", "--action=status", "--nnf-node-name=rabbit-3"]
        );
        assert!(opts.unknown.is_empty());
    }

    #[test]
    fn comments_blanks_and_unknown_keys() {
        let opts = parse_str("# from the daemon\n\nnodename=rabbit-3\naction=off\n");
        assert_eq!(opts.argv, ["fence_nnf", "--action=off"]);
        assert_eq!(opts.unknown, ["nodename"]);
    }

    #[test]
    fn flags_follow_their_value() {
        let opts = parse_str("localconfig\nwithhold_power_off=0\nverbose=yes\n");
        assert_eq!(opts.argv, ["fence_nnf", "--localconfig", "--verbose"]);
    }

    #[test]
    fn aliases_map_to_the_long_name() {
        let opts = parse_str("ipaddr=10.1.1.1\nport=2\nlogin=root\n");
        assert_eq!(
            opts.argv,
            ["fence_nnf", "--ip=10.1.1.1", "--plug=2", "--username=root"]
        );
    }

    #[test]
    fn resulting_argv_parses() {
        use clap::Parser;
        let opts = parse_str("action=on\ndevice_class=direct-hardware\nip=h\nplug=1\n");
        let cli = Cli::try_parse_from(&opts.argv).unwrap();
        assert_eq!(cli.plug, 1);
        assert!(cli.validate().is_ok());
    }
}
