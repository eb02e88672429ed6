use mpybindgen::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        let msg = e.to_string();
        // Validation failures already printed their diagnostics; exit with
        // error code 1 without repeating the error object.
        if msg.contains("validation failed") {
            std::process::exit(1);
        }
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use mpybindgen::cli::{Command, MpyBindGenCli};

    #[test]
    fn generate_command_honors_output_flag() {
        let cli = MpyBindGenCli::parse_from([
            "mpybindgen",
            "generate",
            "--source",
            "bindings/app.json",
            "--output",
            "out/app",
        ]);
        match cli.command() {
            Command::Generate { source, output, .. } => {
                assert_eq!(source.to_string_lossy(), "bindings/app.json");
                assert_eq!(output.as_deref(), Some("out/app"));
            }
            other => panic!("expected generate command, got {other:?}"),
        }
    }

    #[test]
    fn generate_command_collects_includes_and_definitions() {
        let cli = MpyBindGenCli::parse_from([
            "mpybindgen",
            "generate",
            "--source",
            "bindings/app.json",
            "-I",
            "engine/include",
            "-I",
            "vendor/include",
            "ROOT=/src",
            "PROFILE=release",
        ]);
        match cli.command() {
            Command::Generate {
                include,
                definitions,
                ..
            } => {
                assert_eq!(include.len(), 2);
                assert_eq!(include[1].to_string_lossy(), "vendor/include");
                assert_eq!(definitions, &["ROOT=/src", "PROFILE=release"]);
            }
            other => panic!("expected generate command, got {other:?}"),
        }
    }

    #[test]
    fn dump_command_takes_a_path() {
        let cli = MpyBindGenCli::parse_from(["mpybindgen", "dump", "src/engine"]);
        match cli.command() {
            Command::Dump { path } => assert_eq!(path.to_string_lossy(), "src/engine"),
            other => panic!("expected dump command, got {other:?}"),
        }
    }
}
