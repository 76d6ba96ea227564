//! Worker process entry point: reads one framed [`WorkerRequest`] from
//! stdin, runs the engine it describes to completion, and streams framed
//! [`WorkerMessage`]s back over stdout as the run produces them.
//!
//! `gb_engine::Engine` holds `Rc<RefCell<_>>` pipeline stages and is not
//! `Send`, so it runs synchronously on this process's main thread; events
//! reach stdout via a plain `std::sync::mpsc` channel drained on a second
//! thread, so a slow or blocked stdout pipe never stalls the run itself
//! past the channel's buffering.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::mpsc;

use gb_orchestrator::exit_codes;
use gb_orchestrator::protocol::{WorkerMessage, WorkerRequest};
use gb_orchestrator::worker::RunWorker;
use gb_orchestrator::{ipc, RunConfig};
use gb_types::GbError;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    let request: WorkerRequest = match ipc::read_frame(&mut stdin_lock) {
        Ok(Some(request)) => request,
        Ok(None) => {
            tracing::error!("no run request received on stdin");
            return ExitCode::from(exit_codes::CONFIG_INVALID as u8);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to read run request");
            return ExitCode::from(exit_codes::CONFIG_INVALID as u8);
        }
    };

    run(request.run_id, request.config)
}

fn run(run_id: String, config: RunConfig) -> ExitCode {
    let (tap_tx, tap_rx) = mpsc::channel::<gb_types::Event>();

    let engine = match RunWorker::build_engine(run_id.clone(), &config, Some(tap_tx)) {
        Ok(engine) => engine,
        Err(e) => return finish_with_error(&e),
    };

    // Forward events to stdout as they arrive, on their own thread, while
    // the engine runs synchronously on this one.
    let forwarder = std::thread::spawn(move || {
        let mut stdout = io::stdout().lock();
        for event in tap_rx {
            if ipc::write_frame(&mut stdout, &WorkerMessage::Event(event)).is_err() {
                break;
            }
        }
    });

    let outcome = RunWorker::run(engine);
    let _ = forwarder.join();

    let mut stdout = io::stdout().lock();
    match outcome {
        Ok(outcome) => {
            let _ = ipc::write_frame(&mut stdout, &WorkerMessage::Finished { bars_processed: outcome.bars_processed });
            let _ = stdout.flush();
            ExitCode::from(exit_codes::SUCCESS as u8)
        }
        Err(e) => finish_with_error(&e),
    }
}

fn finish_with_error(error: &GbError) -> ExitCode {
    tracing::error!(error = %error, "run failed");
    let mut stdout = io::stdout().lock();
    let _ = ipc::write_frame(&mut stdout, &WorkerMessage::Failed { message: error.to_string() });
    let _ = stdout.flush();
    ExitCode::from(exit_codes::for_error(error) as u8)
}
