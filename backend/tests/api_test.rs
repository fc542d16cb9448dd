use std::io::{Cursor, Read};
use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use backend::pipeline::DetectionPipeline;
use backend::routes::{configure_routes, cors};
use backend::store::ResultStore;
use backend::vision::{Annotator, Detector, DetectorError, RawDetection};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use shared::{DetectResponse, ImageResult};
use zip::ZipArchive;

const BOUNDARY: &str = "----detect-test-boundary";
const GATEWAY_ORIGIN: &str = "http://localhost:8001";

/// Reports two boxes for images at least 20px wide and none otherwise.
struct StubDetector;

impl Detector for StubDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError> {
        if image.width() < 20 {
            return Ok(Vec::new());
        }
        Ok(vec![
            RawDetection {
                bbox: [1.0, 2.0, 10.0, 12.0],
                confidence: 0.91,
                class_id: 0,
            },
            RawDetection {
                bbox: [5.0, 5.0, 15.0, 9.0],
                confidence: 0.42,
                class_id: 1,
            },
        ])
    }

    fn label(&self, class_id: usize) -> Option<&str> {
        ["person", "dog"].get(class_id).copied()
    }
}

fn app(
    store: web::Data<ResultStore>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let pipeline = DetectionPipeline::new(Arc::new(StubDetector), Arc::new(Annotator::new(None)));
    App::new()
        .wrap(cors(&[GATEWAY_ORIGIN.to_string()]))
        .app_data(store)
        .app_data(web::Data::new(pipeline))
        .configure(configure_routes)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])))
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn multipart(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/detect")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

fn detect_request(files: &[(&str, Vec<u8>)]) -> test::TestRequest {
    multipart_request(multipart(files))
}

fn get(uri: &str) -> test::TestRequest {
    test::TestRequest::get().uri(uri)
}

#[actix_web::test]
async fn batch_scenario_results_images_and_zip() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store.clone())).await;

    let response: DetectResponse = test::call_and_read_body_json(
        &app,
        detect_request(&[("a.jpg", png(32, 32)), ("b.jpg", png(10, 10))]).to_request(),
    )
    .await;

    let log = response.all_detections;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].filename, "a.jpg");
    assert_eq!(log[0].detections.len(), 2);
    assert_eq!(log[0].detections[0].class_name, "person");
    assert_eq!(log[0].detections[1].class_name, "dog");
    for detection in &log[0].detections {
        assert!(detection.bbox.x_min <= detection.bbox.x_max);
        assert!(detection.bbox.y_min <= detection.bbox.y_max);
        assert!((0.0..=1.0).contains(&detection.confidence));
    }
    assert_eq!(log[1].filename, "b.jpg");
    assert!(log[1].detections.is_empty());

    let resp = test::call_service(&app, get("/images/a.jpg").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    let body = test::read_body(resp).await;
    let annotated = image::load_from_memory_with_format(&body, ImageFormat::Png).unwrap();
    assert_eq!(annotated.width(), 32);

    let resp = test::call_service(&app, get("/download_zip").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "application/zip");
    let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.to_str().unwrap().contains("detection_results.zip"));

    let body = test::read_body(resp).await;
    let mut archive = ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "output_images/a.jpg",
            "output_images/b.jpg",
            "output_json/a.json",
            "output_json/b.json",
        ]
    );

    let mut json = String::new();
    archive
        .by_name("output_json/b.json")
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();
    let entry: ImageResult = serde_json::from_str(&json).unwrap();
    assert_eq!(entry, log[1]);
}

#[actix_web::test]
async fn resubmitted_filename_keeps_every_result_but_the_latest_image() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store.clone())).await;

    let first = test::call_service(&app, detect_request(&[("a.jpg", png(24, 24))]).to_request()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let response: DetectResponse =
        test::call_and_read_body_json(&app, detect_request(&[("a.jpg", png(12, 40))]).to_request()).await;

    let log = response.all_detections;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|r| r.filename == "a.jpg"));
    assert_eq!(log[0].detections.len(), 2);
    assert!(log[1].detections.is_empty());

    let body = test::call_and_read_body(&app, get("/images/a.jpg").to_request()).await;
    let stored = image::load_from_memory_with_format(&body, ImageFormat::Png).unwrap();
    assert_eq!((stored.width(), stored.height()), (12, 40));

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.images.len(), 1);
    assert_eq!(snapshot.results.len(), 2);
}

#[actix_web::test]
async fn reset_empties_everything_and_is_idempotent() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store.clone())).await;

    test::call_service(&app, detect_request(&[("a.jpg", png(32, 32))]).to_request()).await;

    for _ in 0..2 {
        let body: Value = test::call_and_read_body_json(&app, get("/reset").to_request()).await;
        assert_eq!(
            body["message"],
            "In-memory detections and images have been reset."
        );
    }

    let resp = test::call_service(&app, get("/download").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No detection results to download.");

    let resp = test::call_service(&app, get("/download_zip").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No detection results to zip.");

    let resp = test::call_service(&app, get("/images/a.jpg").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn download_returns_the_log_as_an_attachment() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store.clone())).await;

    test::call_service(&app, detect_request(&[("cat.png", png(32, 32))]).to_request()).await;

    let resp = test::call_service(&app, get("/download").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert_eq!(
        disposition.to_str().unwrap(),
        "attachment; filename=\"detection_results.json\""
    );
    let log: Vec<ImageResult> = test::read_body_json(resp).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].filename, "cat.png");
}

#[actix_web::test]
async fn unknown_image_is_plain_not_found() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store)).await;

    let resp = test::call_service(&app, get("/images/never.jpg").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = test::read_body(resp).await;
    assert_eq!(body, "Image not found");
}

#[actix_web::test]
async fn undecodable_image_fails_the_whole_batch() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store.clone())).await;

    let resp = test::call_service(
        &app,
        detect_request(&[("good.jpg", png(32, 32)), ("bad.jpg", b"garbage".to_vec())]).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("bad.jpg"));

    assert!(store.is_empty().await);
    assert!(store.get_image("good.jpg").await.is_none());
}

#[actix_web::test]
async fn form_without_files_is_a_bad_request() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store)).await;

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nno files here\r\n--{BOUNDARY}--\r\n"
    );
    let resp = test::call_service(&app, multipart_request(body.into_bytes()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No images were submitted");
}

#[actix_web::test]
async fn gateway_origin_passes_cors_preflight() {
    let store = web::Data::new(ResultStore::new());
    let app = test::init_service(app(store)).await;

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/reset")
        .insert_header((header::ORIGIN, GATEWAY_ORIGIN))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "GET"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        GATEWAY_ORIGIN
    );
}
