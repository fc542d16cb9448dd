use actix_multipart::{Multipart, MultipartError};
use actix_web::HttpResponse;
use actix_web::web::{self, BytesMut};
use futures_util::TryStreamExt;

use crate::client::{DetectionClient, RelayFile};
use crate::config::GatewayConfig;
use crate::pages;

const FILES_FIELD: &str = "files";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(upload_form)))
        .service(web::resource("/upload_and_detect/").route(web::post().to(upload_and_detect)));
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

async fn upload_form(config: web::Data<GatewayConfig>) -> HttpResponse {
    html(pages::upload_form(&config.public_endpoint("reset")))
}

/// Reads the `files` parts of the form. Empty file inputs arrive as parts
/// with an empty filename and are dropped.
async fn read_files(payload: &mut Multipart) -> Result<Vec<RelayFile>, MultipartError> {
    let mut files = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let is_files_field = field.name() == Some(FILES_FIELD);
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

        if let (true, Some(filename)) = (is_files_field, filename) {
            files.push(RelayFile {
                filename,
                bytes: data.freeze(),
                content_type,
            });
        }
    }

    Ok(files)
}

async fn upload_and_detect(
    client: web::Data<DetectionClient>,
    config: web::Data<GatewayConfig>,
    mut payload: Multipart,
) -> HttpResponse {
    let files = match read_files(&mut payload).await {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Malformed multipart upload: {}", e);
            return HttpResponse::BadRequest()
                .content_type("text/html; charset=utf-8")
                .body(pages::upload_error(&e.to_string()));
        }
    };

    if files.is_empty() {
        return html(pages::no_files());
    }

    log::info!("Relaying {} file(s) to {}", files.len(), client.endpoint("detect"));

    if let Err(e) = client.reset().await {
        log::error!("Relay failed: {}", e);
        return html(pages::relay_error(&e));
    }

    match client.submit(files).await {
        Ok(response) => {
            log::info!(
                "Detection service now holds {} result(s)",
                response.all_detections.len()
            );
            html(pages::download_link(&config.public_endpoint("download_zip")))
        }
        Err(e) => {
            log::error!("Relay failed: {}", e);
            html(pages::relay_error(&e))
        }
    }
}
