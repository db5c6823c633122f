use {
    crate::common::{debug_println, DEBUG},
    backend::x86,
    clap::{Parser, Subcommand, ValueEnum},
    frontend::ast::Ast,
    middle::ir,
    std::{path::PathBuf, sync::atomic::Ordering},
};

#[derive(Debug, Parser)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a program to x86-64 assembly
    Compile {
        /// Input source file
        input_path: PathBuf,

        #[command(flatten)]
        compile_options: CompileOptions,
    },
    /// Compile and execute a program
    Run {
        /// Input source file
        input_path: PathBuf,
    },
}

#[derive(Debug, Parser)]
struct CompileOptions {
    /// Output file for the generated artifact [leave unspecified for stdout]
    #[arg(short)]
    output_path: Option<PathBuf>,

    /// Artifact to emit
    #[arg(long, default_value = "asm")]
    emit: Emit,
}

#[derive(ValueEnum, Clone, Debug)]
enum Emit {
    Ir,
    Asm,
}

pub(crate) fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    DEBUG.store(cli.debug, Ordering::Relaxed);
    let (input_path, compile_options) = match cli.command {
        Command::Compile {
            input_path,
            compile_options,
        } => (input_path, Some(compile_options)),
        Command::Run { input_path } => (input_path, None),
    };
    let src = std::fs::read_to_string(input_path)?;
    let ast = Ast::try_from(&*src)?;
    debug_println!("{ast:#?}");
    let program = ir::Program::try_from(&ast)?;
    debug_println!("{program:#?}");
    match compile_options {
        Some(compile_options) => {
            let artifact = match compile_options.emit {
                Emit::Ir => format!("{program:#?}\n"),
                Emit::Asm => x86::Program::try_from(&program)?.to_string(),
            };
            match compile_options.output_path {
                Some(output_path) => std::fs::write(output_path, artifact)?,
                None => print!("{artifact}"),
            }
        }
        None => {
            let status = program.execute(&mut std::io::stdout())?;
            if status != 0 {
                std::process::exit(status);
            }
        }
    }
    Ok(())
}
