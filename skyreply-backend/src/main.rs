use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod bluesky;
mod config;
mod controllers;
mod http;
mod pipeline;
mod scheduler;

use bluesky::{FeedService, SessionManager, XrpcClient};
use config::Config;
use pipeline::generator::MemeApiGenerator;
use pipeline::images::{HttpImageSource, ImagePipeline};
use pipeline::{MentionPipeline, PipelineConfig};
use scheduler::{ReplyScheduler, SchedulerConfig};

pub struct AppState {
    pub pipeline: Arc<MentionPipeline>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port;

    let client = http::shared_client().clone();

    log::info!("Using feed service at {}", config.service_url);
    let feed: Arc<dyn FeedService> = Arc::new(XrpcClient::new(client.clone(), &config.service_url));
    let sessions = Arc::new(SessionManager::new(feed.clone(), config.credentials.clone()));

    log::info!("Using content service at {}", config.meme_api_endpoint);
    let generator = Arc::new(MemeApiGenerator::new(client.clone(), &config.meme_api_endpoint));
    let images = ImagePipeline::new(Arc::new(HttpImageSource::new(client)), feed.clone());

    let pipeline = Arc::new(MentionPipeline::new(
        feed,
        sessions,
        generator,
        images,
        PipelineConfig {
            max_in_flight: config.max_in_flight,
            batch_timeout: Some(Duration::from_secs(config.batch_timeout_secs)),
            ..Default::default()
        },
    ));

    // Start scheduler background task
    let scheduler_shutdown_tx = if config.scheduler_enabled {
        let scheduler = ReplyScheduler::new(
            Arc::clone(&pipeline),
            SchedulerConfig {
                schedule: config.reply_schedule.clone(),
            },
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(Arc::new(scheduler).start(rx));
        Some(tx)
    } else {
        log::info!("Reply scheduler disabled, batches run only via GET /");
        None
    };

    log::info!("Starting SkyReply server on port {}", port);

    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                pipeline: Arc::clone(&pipeline),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::mentions::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    if let Some(tx) = scheduler_shutdown_tx {
        let _ = tx.send(());
    }

    result
}
