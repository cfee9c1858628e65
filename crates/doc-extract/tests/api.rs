//! HTTP API tests driving the router in-process.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use doc_extract::{
    config::ExtractorConfig,
    server::{build_router, state::AppState},
    testing::{text_pdf, ScriptedLlm},
};

const BOUNDARY: &str = "doc-extract-test-boundary";

fn app(llm: Arc<ScriptedLlm>) -> Router {
    let config = ExtractorConfig::default();
    let state = AppState::with_provider(config.clone(), llm);
    build_router(&config, state)
}

/// (field name, file name, content)
fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Poll a run until it leaves the pending/running states
async fn wait_for_run(app: &Router, id: &str) -> Value {
    for _ in 0..200 {
        let (status, run) = send_json(app, get(&format!("/api/extractions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        if run["status"] == "complete" || run["status"] == "failed" {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", id);
}

#[tokio::test]
async fn test_health_and_info() {
    let app = app(Arc::new(ScriptedLlm::new()));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, info) = send_json(&app, get("/api/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["name"], "doc-extract");
}

#[tokio::test]
async fn test_extraction_requires_files() {
    let app = app(Arc::new(ScriptedLlm::new()));

    let request = multipart_request("/api/extractions", &[("options", None, br#"{"scan_sections": true}"#.as_slice())]);
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Upload PDFs first.");

    let (status, _) = send_json(&app, get("/api/extractions/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_schema_editing() {
    let app = app(Arc::new(ScriptedLlm::new()));

    let (_, schema) = send_json(&app, get("/api/schema")).await;
    assert_eq!(schema["fields"].as_array().unwrap().len(), 8);
    assert_eq!(schema["fields"][0]["column_name"], "CH ID");

    let duplicate = json!({"fields": [
        {"column_name": "Status", "question": "a"},
        {"column_name": "Status", "question": "b"}
    ]});
    let (status, body) = send_json(&app, json_request("PUT", "/api/schema", duplicate)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_schema");

    let (status, _) = send_json(
        &app,
        json_request(
            "PUT",
            "/api/sections/unknown/schema",
            json!({"fields": [{"column_name": "A", "question": "q"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, section) = send_json(
        &app,
        json_request(
            "PUT",
            "/api/sections/audit_nc/schema",
            json!({"fields": [{"column_name": "NC number", "question": "Every NC number"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(section["schema"].as_array().unwrap().len(), 1);

    let (_, sections) = send_json(&app, get("/api/sections")).await;
    assert_eq!(sections[0]["schema"].as_array().unwrap().len(), 1);
    assert_eq!(sections[1]["schema"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_extraction_run_export_and_verify() {
    let llm = Arc::new(ScriptedLlm::new().respond(
        json!({"Status": {"answer": "Open", "source_quote": "Status: Open", "page_number": 2}})
            .to_string(),
    ));
    let app = app(llm.clone());

    let (status, _) = send_json(
        &app,
        json_request(
            "PUT",
            "/api/schema",
            json!({"fields": [{"column_name": "Status", "question": "Open or Closed?"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let pdf = text_pdf(&["Audit report", "Findings\nStatus: Open"]).unwrap();
    let request = multipart_request("/api/extractions", &[("files", Some("report.pdf"), pdf.as_slice())]);
    let (status, started) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["documents"], 1);
    let id = started["run_id"].as_str().unwrap().to_string();

    let run = wait_for_run(&app, &id).await;
    assert_eq!(run["status"], "complete");
    assert_eq!(run["completed_documents"], 1);
    assert_eq!(
        run["tables"]["main"]["rows"][0],
        json!({"Status": "Open", "filename": "report.pdf"})
    );
    assert_eq!(run["tables"]["main"]["columns"], json!(["Status", "filename"]));
    assert!(run["tables"].get("audit_nc").is_none());

    let (_, latest) = send_json(&app, get("/api/extractions/latest")).await;
    assert_eq!(latest["id"], id.as_str());

    let (_, runs) = send_json(&app, get("/api/extractions")).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/extractions/{}/export/main", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"extracted.csv\""
    );
    let csv = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&csv[..], b"Status,filename\nOpen,report.pdf\n");

    let (status, _) = send_json(&app, get(&format!("/api/extractions/{}/export/audit_nc", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, verification) = send_json(
        &app,
        get(&format!(
            "/api/extractions/{}/verify?table=main&row=0&column=Status",
            id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["page_number"], 2);
    assert_eq!(verification["source_quote"], "Status: Open");
    assert_eq!(verification["answer"], "Open");

    let (status, _) = send_json(
        &app,
        get(&format!("/api/extractions/{}/verify?row=5&column=Status", id)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_csv_session_flow() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .respond("WHERE Status == 'Open'")
            .respond("Keeps open findings.")
            .respond(r#"{"filter": false, "question": true}"#)
            .respond("There are two open findings."),
    );
    let app = app(llm);

    let csv = b"NC number,Status\nNC-1,Open\nNC-2,Closed\nNC-3,Open\n";
    let (status, session) =
        send_json(&app, multipart_request("/api/csv", &[("file", Some("ncs.csv"), csv.as_slice())])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["rows"], 3);
    assert_eq!(session["types"], json!(["text", "text"]));
    let id = session["id"].as_str().unwrap().to_string();

    let (status, applied) = send_json(
        &app,
        json_request(
            "POST",
            &format!("/api/csv/{}/filter", id),
            json!({"request": "show rows where Status is Open"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["expression"], "WHERE Status == 'Open'");
    assert_eq!(applied["explanation"], "Keeps open findings.");

    let (status, turn) = send_json(
        &app,
        json_request(
            "POST",
            &format!("/api/csv/{}/chat", id),
            json!({"prompt": "How many are open?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turn["answer"], "There are two open findings.");
    assert_eq!(turn["rows"], 2);

    let (_, session) = send_json(&app, get(&format!("/api/csv/{}", id))).await;
    assert_eq!(session["chat_rows"], 2);
    assert_eq!(session["messages"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, get(&format!("/api/csv/{}/export", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"NC number,Status\nNC-1,Open\nNC-3,Open\n");

    let (status, _) = send_json(
        &app,
        get("/api/csv/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
