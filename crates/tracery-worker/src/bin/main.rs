//! JSON-lines front end for the worker host.
//!
//! Reads one [`Request`](tracery_worker::Request) per stdin line and
//! writes one [`Response`](tracery_worker::Response) per stdout line.
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity.
//!
//! ```text
//! tracery-worker < requests.jsonl > responses.jsonl
//! ```

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::thread;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tracery_worker::WorkerHost;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let (host, responses) = WorkerHost::new();

    let writer = thread::spawn(move || -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for response in responses {
            match serde_json::to_string(&response) {
                Ok(line) => {
                    writeln!(out, "{line}")?;
                    out.flush()?;
                }
                Err(e) => error!(id = response.id(), error = %e, "failed to serialize response"),
            }
        }
        Ok(())
    });

    info!("worker ready");
    let mut status = ExitCode::SUCCESS;
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => host.handle_line(&line),
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                status = ExitCode::FAILURE;
                break;
            }
        }
    }

    info!(in_flight = host.in_flight(), "input closed, waiting for running traces");
    host.join();

    match writer.join() {
        Ok(Ok(())) => status,
        Ok(Err(e)) => {
            error!(error = %e, "failed to write stdout");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("stdout writer panicked");
            ExitCode::FAILURE
        }
    }
}
