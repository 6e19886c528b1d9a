use folio::app::ChatApp;
use folio::settings::SettingsStore;
use tracing_subscriber::EnvFilter;

/// Terminal entry point.
///
/// Logs go to stderr so the transcript on stdout stays readable; `RUST_LOG` overrides
/// the default `info` filter.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = SettingsStore::load();
    tracing::info!(path = ?store.config_path(), "loaded settings");
    let mut app = ChatApp::new(store);

    tokio::select! {
        result = app.run() => {
            if let Err(error) = result {
                tracing::error!(error = %error, "chat host stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            app.shutdown().await;
        }
    }
}
