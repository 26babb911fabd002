use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info};
use wlang_core::{NoHost, RunOptions, StdoutConsole, compile, load_sources, run};

/// Run W scripts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source files or directories; directories contribute every `.w` file beneath them.
    #[arg(required = true, value_name = "INPUTS")]
    inputs: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "File holding the entry function (defaults to the first loaded file)"
    )]
    entry_file: Option<String>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Zero-argument function to invoke after file-scope initialization"
    )]
    entry: Option<String>,

    #[arg(long, help = "Stop after verification")]
    check: bool,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let sources = load_sources(&cli.inputs).context("failed to load sources")?;

    if cli.check {
        compile(&sources, &NoHost).context("verification failed")?;
        info!(files = sources.len(), "verification succeeded");
        return Ok(());
    }

    let options = RunOptions {
        entry_file: cli.entry_file,
        entry_function: cli.entry,
    };
    let result = run(&sources, &options, &mut NoHost, &mut StdoutConsole)
        .context("script execution failed")?;
    if let Some(value) = result {
        info!(?value, "entry function returned");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    fn wlang() -> Command {
        Command::cargo_bin("wlang-cli").expect("binary exists")
    }

    #[test]
    fn runs_a_script() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("add.w");
        fs::write(
            &input,
            "function add(a, b) { return a + b; }\nlet r = add(2, 3);\nprintln(r);\n",
        )
        .expect("write input");

        wlang()
            .arg(&input)
            .assert()
            .success()
            .stdout("5\n");
    }

    #[test]
    fn reports_semantic_errors() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("bad.w");
        fs::write(&input, "function f() {\n  break;\n}\n").expect("write input");

        wlang()
            .arg(&input)
            .assert()
            .failure()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("'break' outside of a loop"));
    }

    #[test]
    fn invokes_the_entry_function() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.w");
        fs::write(
            &input,
            "println(\"init\");\nfunction main() { println(\"main\"); }\n",
        )
        .expect("write input");

        wlang()
            .arg(&input)
            .arg("--entry")
            .arg("main")
            .assert()
            .success()
            .stdout("init\nmain\n");
    }

    #[test]
    fn loads_every_file_of_a_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.w"), "function main() { println(helper()); }\n")
            .expect("write a");
        fs::write(dir.path().join("b.w"), "function helper() { return \"from b\"; }\n")
            .expect("write b");

        wlang()
            .arg(dir.path())
            .args(["--entry-file", "a.w", "--entry", "main"])
            .assert()
            .success()
            .stdout("from b\n");
    }

    #[test]
    fn check_mode_does_not_execute() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.w");
        fs::write(&input, "println(\"side effect\");\n").expect("write input");

        wlang()
            .arg(&input)
            .arg("--check")
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn reports_uncaught_throws() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("throw.w");
        fs::write(&input, "class Boom { }\nfunction f() { throw Boom(); }\nf();\n")
            .expect("write input");

        wlang()
            .arg(&input)
            .assert()
            .failure()
            .stderr(predicate::str::contains("uncaught Boom"));
    }
}
