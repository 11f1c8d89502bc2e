// storefront/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use storefront::config::AppConfig;
use storefront::web::configure_app_routes;
use storefront::{build_state, init_tracing, open_store};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  // Configuration is read before logging is up, so a bad config goes to stderr.
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      eprintln!("Configuration error: {}", e);
      std::process::exit(2);
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!(config = ?app_config, "Starting storefront server...");

  let store = match open_store(&app_config).await {
    Ok(store) => store,
    Err(e) => {
      tracing::error!(error = %e, "Failed to open the store.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  let server_address = app_config.bind_address();
  let app_state = build_state(&app_config, store);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
