use std::net::SocketAddr;

use clap::Parser;
use newsroom_proxy::cli::{Args, build_config, init_logging, load_proxy_key, validate_backend_url};
use newsroom_proxy::{ServerConfig, create_app};
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Read (and scrub) the key while the process is still single-threaded.
    let proxy_key = load_proxy_key(args.proxy_key_file.as_deref()).unwrap_or_else(|e| {
        error!(error = %e, "Failed to read proxy key file");
        std::process::exit(1);
    });

    let backend_url = match args.backend_url.as_deref() {
        Some(raw) => match validate_backend_url(raw) {
            Some(url) => Some(url),
            None => std::process::exit(1),
        },
        None => None,
    };

    let config = build_config(&args, backend_url, proxy_key);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        });

    runtime.block_on(serve(config, args.port));
}

async fn serve(config: ServerConfig, port: u16) {
    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create app");
        std::process::exit(1);
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
