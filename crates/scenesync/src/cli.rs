//! CLI command definitions using `clap`

use clap::{Arg, ArgAction, Command as ClapCommand};

pub fn after_help_text(examples: &[&str]) -> String {
    let mut text = String::from("EXAMPLES:\n");
    for example in examples {
        text.push_str("  ");
        text.push_str(example);
        text.push('\n');
    }
    text
}

pub fn cmd_replay() -> ClapCommand {
    ClapCommand::new("replay")
        .about("Replay JSON-lines requests against a fresh engine")
        .arg(
            Arg::new("file")
                .required(true)
                .value_name("FILE")
                .help("Requests, one JSON object per line (`-` reads stdin)"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("FILE")
                .help("JSON array of instance records loaded with a full resync first"),
        )
        .after_help(after_help_text(&[
            "scenesync replay requests.jsonl",
            "scenesync replay requests.jsonl --seed tree.json",
            "echo '{\"route\":\"snapshot\"}' | scenesync replay -",
        ]))
}

pub fn cmd_config() -> ClapCommand {
    ClapCommand::new("config").about("Print the effective configuration as TOML")
}

pub fn build_cli() -> ClapCommand {
    ClapCommand::new("scenesync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scene graph consistency and command-execution engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .action(ArgAction::Set)
                .help("Project config file (replaces .scenesync/config.toml)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .global(true)
                .value_name("FILTER")
                .action(ArgAction::Set)
                .help("Log filter, e.g. `scenesync_core=debug` (overrides RUST_LOG)"),
        )
        .subcommand(cmd_replay())
        .subcommand(cmd_config())
}
