//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use c3dl_buildtrigger::{create_router, AppState, BuildTrigger};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

/// A stand-in for `c3dlbuildbot`: a shell script that records every
/// invocation's arguments, one line per run, before running `body`.
pub struct FakeBuildbot {
    dir: TempDir,
    path: PathBuf,
}

impl FakeBuildbot {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("c3dlbuildbot");
        let log = dir.path().join("invocations.log");

        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\n{}\n",
            log.display(),
            body
        );
        fs::write(&path, script).expect("Failed to write fake buildbot");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake buildbot executable");

        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trigger(&self) -> BuildTrigger {
        BuildTrigger::new(&self.path)
    }

    pub fn router(&self) -> Router {
        app(self.trigger())
    }

    /// Arguments of each run so far, in order.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("invocations.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub fn app(trigger: BuildTrigger) -> Router {
    create_router(AppState::new(trigger))
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("Body is not valid UTF-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    request(app, Method::GET, uri).await
}

pub async fn head(app: &Router, uri: &str) -> TestResponse {
    request(app, Method::HEAD, uri).await
}

pub async fn request(app: &Router, method: Method, uri: &str) -> TestResponse {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(method)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("Request failed");

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec();

    TestResponse {
        status,
        headers,
        body,
    }
}
