use actix_cors::Cors;
use actix_multipart::{Multipart, MultipartError};
use actix_web::HttpResponse;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::web::{self, BytesMut};
use futures_util::TryStreamExt;
use shared::{DetectResponse, ErrorResponse, MessageResponse};

use crate::export::{self, ExportError, JSON_FILE_NAME};
use crate::pipeline::{DetectionPipeline, PipelineError, UploadedImage};
use crate::store::ResultStore;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/detect").route(web::post().to(detect_images)))
        .service(web::resource("/reset").route(web::get().to(reset_results)))
        .service(web::resource("/download").route(web::get().to(download_results)))
        .service(web::resource("/images/{filename}").route(web::get().to(get_processed_image)))
        .service(web::resource("/download_zip").route(web::get().to(download_zip)));
}

/// CORS policy letting the gateway's pages call this service from the browser.
pub fn cors(origins: &[String]) -> Cors {
    let cors = origins.iter().fold(Cors::default(), |cors, origin| {
        if origin == "*" {
            cors.allow_any_origin()
        } else {
            cors.allowed_origin(origin)
        }
    });

    cors.allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

fn attachment(file_name: &str) -> ContentDisposition {
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(file_name.to_string())],
    }
}

/// Collects every file part of the form. Parts without a filename are
/// ordinary form fields and are skipped.
async fn read_uploads(payload: &mut Multipart) -> Result<Vec<UploadedImage>, MultipartError> {
    let mut uploads = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .map(str::to_owned);
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) => uploads.push(UploadedImage {
                filename,
                bytes: data.freeze(),
                content_type,
            }),
            None => log::debug!("Skipping multipart field {:?} without a filename", field.name()),
        }
    }

    Ok(uploads)
}

async fn detect_images(
    store: web::Data<ResultStore>,
    pipeline: web::Data<DetectionPipeline>,
    mut payload: Multipart,
) -> HttpResponse {
    let uploads = match read_uploads(&mut payload).await {
        Ok(uploads) => uploads,
        Err(e) => {
            log::warn!("Malformed multipart upload: {}", e);
            return HttpResponse::BadRequest().json(ErrorResponse::from(e.to_string()));
        }
    };

    match pipeline.submit(&store, uploads).await {
        Ok(all_detections) => HttpResponse::Ok().json(DetectResponse::from(all_detections)),
        Err(PipelineError::EmptyBatch) => HttpResponse::BadRequest()
            .json(ErrorResponse::from(PipelineError::EmptyBatch.to_string())),
        Err(e) => {
            log::error!("An error occurred: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::from(e.to_string()))
        }
    }
}

async fn reset_results(store: web::Data<ResultStore>) -> HttpResponse {
    store.reset().await;
    log::info!("Result store reset");
    HttpResponse::Ok().json(MessageResponse::from(
        "In-memory detections and images have been reset.".to_string(),
    ))
}

async fn download_results(store: web::Data<ResultStore>) -> HttpResponse {
    let results = store.all_results().await;
    if results.is_empty() {
        return HttpResponse::NotFound().json(MessageResponse::from(
            "No detection results to download.".to_string(),
        ));
    }

    HttpResponse::Ok()
        .insert_header(attachment(JSON_FILE_NAME))
        .json(results)
}

async fn get_processed_image(
    store: web::Data<ResultStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let filename = path.into_inner();
    match store.get_image(&filename).await {
        Some(png) => HttpResponse::Ok().content_type("image/png").body(png),
        None => HttpResponse::NotFound()
            .content_type("text/plain; charset=utf-8")
            .body("Image not found"),
    }
}

async fn download_zip(store: web::Data<ResultStore>) -> HttpResponse {
    let snapshot = store.snapshot().await;

    match export::build_zip(&snapshot) {
        Ok(archive) => HttpResponse::Ok()
            .content_type(archive.content_type)
            .insert_header(attachment(archive.file_name))
            .body(archive.bytes),
        Err(ExportError::NothingToExport) => HttpResponse::NotFound().json(MessageResponse::from(
            "No detection results to zip.".to_string(),
        )),
        Err(e) => {
            log::error!("Failed to build export archive: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::from(e.to_string()))
        }
    }
}
