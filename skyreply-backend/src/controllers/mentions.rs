use actix_web::{web, HttpResponse};

use crate::pipeline::PipelineError;
use crate::AppState;

/// Configure the batch trigger route
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(process_mentions)));
}

/// Run one mention batch on demand
async fn process_mentions(state: web::Data<AppState>) -> HttpResponse {
    match state.pipeline.run_batch().await {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "processedMentions": report.replied,
            "report": report
        })),
        Err(PipelineError::Auth { reason, .. }) => {
            log::error!("Batch aborted on authentication failure: {}", reason);
            HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Authentication failed"
            }))
        }
        Err(PipelineError::Busy) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "A batch is already running"
        })),
        Err(e) => {
            log::error!("Batch failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
    }
}
