use reactor_httpd::app::Environment;
use reactor_httpd::config::Config;
use reactor_httpd::http::response::{Response, ResponseBuilder, StatusCode};
use reactor_httpd::server;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let shutdown = Arc::new(AtomicBool::new(false));

    watch_signals(&shutdown)?;

    server::listener::run(&cfg, demo, &shutdown)?;

    tracing::info!("Shutdown signal received");
    Ok(())
}

#[cfg(unix)]
fn watch_signals(shutdown: &Arc<AtomicBool>) -> anyhow::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(shutdown))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn watch_signals(_shutdown: &Arc<AtomicBool>) -> anyhow::Result<()> {
    Ok(())
}

const SOURCE: &str = include_str!("main.rs");

fn demo(env: &Environment) -> anyhow::Result<Response> {
    let response = match env.path() {
        "/" => {
            let started = env.get("REQUEST_START").and_then(|v| v.as_f64()).unwrap_or_default();
            let elapsed_ms = (unix_now() - started) * 1000.0;
            let software = env.get_str("SERVER_SOFTWARE").unwrap_or_default();
            let html = format!(
                "<html>\n  <title>Hello</title>\n  <body>\n    <h1>Hello</h1>\n    \
                 <p>Running on {software}</p>\n    <p>Processing took {elapsed_ms:.5}ms.</p>\n    \
                 <p>Feel free to read the <a href=\"/_source\">source code</a>.</p>\n  \
                 </body>\n</html>\n"
            );

            ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Type", "text/html")
                .header("Date", std::time::SystemTime::now())
                .body(html)
                .build()
        }
        "/_source" => Response::ok(SOURCE),
        "/echo" => Response::ok(env.input.clone()),
        _ => Response::not_found(),
    };

    Ok(response)
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
