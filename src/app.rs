use crate::{
    config::Config,
    error::Result,
    handlers::ChatState,
    routes::api_routes,
    services::{catalog::RestBookStore, CatalogCache, OpenAiClient},
};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::info;
use std::net::TcpListener;
use std::sync::Arc;

pub struct Application {
    port: u16,
    host: String,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            config: config.clone(),
        }
    }

    /// Build and run the server
    pub async fn run(&self) -> Result<()> {
        // Always bind to 0.0.0.0 for Docker compatibility
        let bind_address = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&bind_address)?;
        info!("Starting server at http://{}:{}", self.host, self.port);

        self.run_with_listener(listener).await
    }

    /// Run the server with a specific TCP listener
    /// This is useful for testing where we want to use a random port
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let store = RestBookStore::new(
            &self.config.store_url,
            &self.config.store_api_key,
            &self.config.store_books_table,
        );
        let catalog = Arc::new(CatalogCache::new(Arc::new(store), self.config.cache_ttl));

        // The provider credential is optional at startup; requests that need
        // it get a machine-readable 500 instead.
        let openai = if self.config.openai_api_key.is_empty() {
            None
        } else {
            Some(OpenAiClient::new(
                &self.config.openai_api_key,
                &self.config.chat_model,
            ))
        };

        let state = web::Data::new(ChatState {
            catalog,
            openai,
            config: self.config.clone(),
        });

        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();

            App::new()
                .wrap(cors)
                .wrap(Logger::default())
                .app_data(state.clone())
                .service(api_routes())
        })
        .listen(listener)?
        .run()
        .await?;

        Ok(())
    }
}
