//! Web controller: a small HTTP API the phone or laptop UI drives.
//!
//! - `GET  /drive`     current control state as JSON
//! - `POST /drive`     `{angle, throttle, drive_mode, recording}`, every field optional
//! - `GET  /frame.jpg` latest camera frame

use std::io::Cursor;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use image::codecs::jpeg::JpegEncoder;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::chaos::ChaosMonkey;
use super::ControlState;
use crate::pubsub::{Subscriber, Topic};
use crate::vehicle::{Frame, Memory, Part, PartError};

const JPEG_QUALITY: u8 = 85;

#[derive(Clone)]
struct WebState {
    control: Arc<Topic<ControlState>>,
    frames: Arc<Topic<Frame>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriveRequest {
    pub angle: Option<f32>,
    pub throttle: Option<f32>,
    pub drive_mode: Option<String>,
    pub recording: Option<bool>,
}

impl DriveRequest {
    /// Merges the fields present in the request over `state`.
    pub fn merge_into(self, mut state: ControlState) -> ControlState {
        if let Some(angle) = self.angle {
            state.angle = angle;
        }
        if let Some(throttle) = self.throttle {
            state.throttle = throttle;
        }
        if let Some(mode) = self.drive_mode {
            state.mode = mode.into();
        }
        if let Some(recording) = self.recording {
            state.recording = recording;
        }
        state
    }
}

pub fn router(control: Arc<Topic<ControlState>>, frames: Arc<Topic<Frame>>) -> Router {
    Router::new()
        .route("/drive", get(get_drive).post(post_drive))
        .route("/frame.jpg", get(get_frame))
        .with_state(WebState { control, frames })
}

async fn get_drive(State(state): State<WebState>) -> impl IntoResponse {
    Json(state.control.latest().unwrap_or_default())
}

async fn post_drive(
    State(state): State<WebState>,
    Json(request): Json<DriveRequest>,
) -> impl IntoResponse {
    let current = state.control.latest().unwrap_or_default();
    let updated = request.merge_into(current);
    debug!(?updated, "drive update");
    state.control.publish(updated.clone());
    Json(updated)
}

async fn get_frame(State(state): State<WebState>) -> impl IntoResponse {
    let Some(frame) = state.frames.latest() else {
        return (StatusCode::NOT_FOUND, "no frame yet").into_response();
    };
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    if let Err(e) = frame.image().write_with_encoder(encoder) {
        error!(error = %e, "jpeg encode failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "encode failed").into_response();
    }
    ([(header::CONTENT_TYPE, "image/jpeg")], buf.into_inner()).into_response()
}

/// Threaded web controller producing the `user/*` values and `recording`.
pub struct LocalWebController {
    port: u16,
    control: Arc<Topic<ControlState>>,
    frames: Arc<Topic<Frame>>,
    subscriber: Subscriber<ControlState>,
    chaos: Option<ChaosMonkey>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LocalWebController {
    pub fn new(port: u16, control: Arc<Topic<ControlState>>, chaos: Option<ChaosMonkey>) -> Self {
        if control.is_empty() {
            control.publish(ControlState::default());
        }
        Self {
            port,
            subscriber: Subscriber::new(Arc::clone(&control)),
            control,
            frames: Arc::new(Topic::new("web/frame")),
            chaos,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Address the server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Part for LocalWebController {
    fn name(&self) -> &str {
        "web_controller"
    }

    fn start(&mut self) -> Result<(), PartError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        self.local_addr = Some(addr);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let app = router(Arc::clone(&self.control), Arc::clone(&self.frames));
        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(tx);

        self.handle = Some(thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        error!(error = %e, "web controller listener failed");
                        return;
                    }
                };
                let shutdown = async {
                    let _ = rx.await;
                };
                if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                    error!(error = %e, "web controller server failed");
                }
            });
        }));
        info!(%addr, "web controller listening");
        Ok(())
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        if let Some(frame) = &memory.image {
            self.frames.publish(frame.clone());
        }
        if let Some(state) = self.subscriber.take_latest() {
            state.apply_to(memory);
        }
        if let Some(chaos) = self.chaos.as_mut() {
            memory.user.angle = chaos.steer(&memory.user_mode, memory.user.angle);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(PartError::device("web_controller", "server thread panicked"));
            }
        }
        debug!("web controller stopped");
        Ok(())
    }
}
