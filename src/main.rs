use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use private_chat::config::{self, BackendKind};
use private_chat::network;
use private_chat::ui::ChatApp;
use tokio::sync::mpsc;

/// How long logout gets to reach the backend after the window closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "private_chat",
    version,
    about = "Private realtime chat for Leo and Janice"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Override the backend from the config file
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env_overrides();
    if let Some(backend) = cli.backend {
        app_config.backend = backend;
    }

    if let Err(err) = app_config.validate() {
        log::error!("{err}");
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let backend = match network::connect(&app_config) {
        Ok(backend) => backend,
        Err(err) => {
            log::error!("Cannot set up backend: {err}");
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    // 1. Kênh thu các task phiên chat để chờ khi thoát
    let (task_tx, mut task_rx) = mpsc::unbounded_channel();
    let runtime = tokio::runtime::Handle::current();

    // 2. Khởi chạy UI (Chạy trên Main Thread)
    let options = eframe::NativeOptions::default();
    let result = tokio::task::block_in_place(|| {
        eframe::run_native(
            "Private Chat",
            options,
            Box::new(move |cc| Ok(Box::new(ChatApp::new(cc, backend, runtime, task_tx)))),
        )
    });

    // 3. Chờ các phiên đóng (untrack + leave) trước khi thoát
    let mut tasks = Vec::new();
    while let Ok(task) = task_rx.try_recv() {
        tasks.push(task);
    }
    if !tasks.is_empty() {
        log::info!("Waiting for {} chat session(s) to close", tasks.len());
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks)).await;
        if drained.is_err() {
            log::warn!("Chat sessions did not close within {SHUTDOWN_GRACE:?}");
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("UI terminated: {err}");
            ExitCode::FAILURE
        }
    }
}
