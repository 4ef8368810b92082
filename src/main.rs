use argh::FromArgs;
use minishell::Interpreter;
use std::path::PathBuf;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(FromArgs)]
/// A small interactive shell with pipelines, history and tab completion.
struct ShellArgs {
    #[argh(option, short = 'c')]
    /// run COMMAND and exit with its status
    command: Option<String>,

    #[argh(option)]
    /// history file to load at startup and append to on exit (default: $HISTFILE)
    histfile: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// log debug events to stderr
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = Targets::new().with_default(level);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false);

    if let Err(e) = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
    {
        eprintln!("failed to initialize logging: {}", e);
    }
}

fn main() {
    let args: ShellArgs = argh::from_env();
    init_tracing(args.verbose);

    let mut shell = Interpreter::default();

    let code = match args.command {
        Some(line) => shell.run_command(&line),
        None => {
            let histfile = args
                .histfile
                .or_else(|| std::env::var_os("HISTFILE").map(PathBuf::from));
            if let Some(path) = histfile {
                shell.load_history(path);
            }
            match shell.repl() {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("{:#}", e);
                    1
                }
            }
        }
    };

    std::process::exit(code);
}
