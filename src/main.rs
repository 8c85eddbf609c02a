use clap::Parser;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::run::RunArgs;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "limeship")]
#[command(version = VERSION)]
#[command(about = "Release pipeline for releases/current style web deployments")]
#[command(after_help = "Tasks run in order, e.g. `limeship prod deploy:migrate`.\n\
                        With no task the default task runs. Use --list to see all tasks.")]
struct Cli {
    /// Project file (defaults to ./limeship.json)
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<String>,

    /// List available tasks
    #[arg(long, short = 'l')]
    list: bool,

    /// Tasks to run, as NAME or NAME:ARG1,ARG2
    #[arg(value_name = "TASK")]
    tasks: Vec<String>,
}

pub(crate) enum Command {
    List,
    Run(RunArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs { config: cli.config };

    let command = if cli.list {
        Command::List
    } else {
        Command::Run(RunArgs { tasks: cli.tasks })
    };

    let (json_result, exit_code) = commands::run_json(command, &global);
    let exit_code = after_print(exit_code, output::print_json_result(json_result));

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

/// A result that could not be written still fails the process.
fn after_print(exit_code: i32, printed: limeship::Result<()>) -> i32 {
    match printed {
        Ok(()) => exit_code,
        Err(err) => {
            eprintln!("limeship: failed to write result: {}", err.message);
            if exit_code == 0 {
                output::exit_code_for_error(err.code)
            } else {
                exit_code
            }
        }
    }
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_write_turns_success_into_failure() {
        let write_err = || {
            Err(limeship::Error::internal_io(
                "No space left on device".to_string(),
                Some("write stdout".to_string()),
            ))
        };

        assert_eq!(after_print(0, Ok(())), 0);
        assert_eq!(after_print(0, write_err()), 1);
        assert_eq!(after_print(20, write_err()), 20);
    }
}
