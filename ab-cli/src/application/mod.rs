pub mod handlers;

use ab_core::error::{AbError, Result};
use clap::{CommandFactory, Parser};

use crate::presentation::cli::{Cli, Commands};

fn print_markdown_help() {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    println!("# `{name}`\n");
    println!("{}\n", cmd.get_about().map(|s| s.to_string()).unwrap_or_default());
    for sub in cmd.get_subcommands_mut() {
        println!("## `{}`", sub.get_name());
        if let Some(about) = sub.get_about() {
            println!("\n{about}\n");
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.markdown {
        print_markdown_help();
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        println!();
        return Err(AbError::MalformedHeader("no subcommand given".into()));
    };

    match command {
        Commands::Ls { input, input_auth } => handlers::handle_ls(input, input_auth),
        Commands::Rewrap { input, output, input_auth, output_auth, body } => {
            handlers::handle_rewrap(input, output, input_auth, output_auth, body)
        }
        Commands::Split { input, prefix, input_auth, output_auth, body } => {
            handlers::handle_split(input, prefix, input_auth, output_auth, body)
        }
        Commands::Merge { inputs, output, input_auth, output_auth, body } => {
            handlers::handle_merge(inputs, output, input_auth, output_auth, body)
        }
        Commands::Unwrap { input, output, input_auth } => handlers::handle_unwrap(input, output, input_auth),
        Commands::Wrap { input, output, output_version, output_auth, body } => {
            handlers::handle_wrap(input, output, output_version, output_auth, body)
        }
    }
}
