use taskview::ui::{MessageBlock, OutputMode, PlainRenderer, Renderer};
use taskview::{parse_command, print_usage, Command};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env_or(OutputMode::Auto);
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `taskview --help` to see supported command forms"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    match cmd {
        Command::Help => {
            print_usage();
        }
        _ => match taskview::runner::run_command(cmd) {
            Ok(output) => {
                if !output.trim().is_empty() {
                    print!("{output}");
                }
            }
            Err(err) => {
                let mut block = MessageBlock::new("Task console failed", err.to_string());
                if let Some(hint) = err.hint() {
                    block = block.with_hint(hint);
                }
                let mut renderer = PlainRenderer::stderr(output_mode);
                let _ = renderer.error_block(&block);
                std::process::exit(if err.is_usage() { 2 } else { 1 });
            }
        },
    }
}
