use std::io::{self, Write};

use msh::{Flow, Session, ShellConfig, SignalBridge};

fn main() {
    env_logger::init();

    let config = ShellConfig::from_env();
    let bridge = match SignalBridge::install() {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("msh: {e}");
            std::process::exit(1);
        }
    };
    let mut session = Session::new(config, bridge);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last_exit_code: i32 = 0;

    loop {
        session.poll_events();

        print!("{}", session.config().prompt);
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let trimmed = input.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let sequence = match msh::parse_sequence(trimmed) {
                    Ok(sequence) => sequence,
                    Err(e) => {
                        eprintln!("msh: {e}");
                        last_exit_code = 2;
                        continue;
                    }
                };

                match session.run_sequence(sequence) {
                    Flow::Continue(code) => last_exit_code = code,
                    Flow::Exit(code) => std::process::exit(code),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("msh: error reading input: {e}");
                break;
            }
        }
    }

    std::process::exit(last_exit_code);
}
