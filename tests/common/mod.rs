//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use matseg::client::{ClientError, SegmentationService};
use matseg::config::Config;
use matseg::models::*;
use matseg::workbench::Workbench;
use tokio::sync::oneshot;

pub type RefineResult = Result<RefinementResponse, ClientError>;
pub type ChatResult = Result<AnalysisResponse, ClientError>;

/// PNG bytes of a black image.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("Failed to encode PNG");
    cursor.into_inner()
}

/// A mask whose first `rows` rows are foreground.
pub fn rows_mask(width: u32, height: u32, rows: u32, version: u64) -> Mask {
    Mask::from_fn(width, height, version, |_, y| y < rows).expect("valid mask")
}

pub fn refinement(mask: &Mask) -> RefineResult {
    Ok(RefinementResponse {
        mask: MaskPayload::encode(mask),
        version: Some(mask.version()),
        message: None,
    })
}

/// A service whose responses are released by the test, in any order.
///
/// Refinements block until the gate for their version is released; chat
/// requests block on the gate for their text, or answer with an echo when
/// none was registered.
#[derive(Default)]
pub struct ScriptedService {
    refine_gates: Mutex<HashMap<u64, oneshot::Receiver<RefineResult>>>,
    chat_gates: Mutex<HashMap<String, oneshot::Receiver<ChatResult>>>,
    pub refine_requests: Mutex<Vec<InteractionRequest>>,
    pub chat_requests: Mutex<Vec<TextAnalysisRequest>>,
    pub uploads: AtomicUsize,
    pub fail_uploads: AtomicBool,
    /// When set, every upload is answered with this session id.
    pub fixed_session_id: Mutex<Option<String>>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gate_refinement(&self, version: u64) -> oneshot::Sender<RefineResult> {
        let (tx, rx) = oneshot::channel();
        self.refine_gates.lock().unwrap().insert(version, rx);
        tx
    }

    pub fn gate_chat(&self, text: &str) -> oneshot::Sender<ChatResult> {
        let (tx, rx) = oneshot::channel();
        self.chat_gates.lock().unwrap().insert(text.to_string(), rx);
        tx
    }

    pub fn refine_versions(&self) -> Vec<u64> {
        self.refine_requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect()
    }
}

#[async_trait]
impl SegmentationService for ScriptedService {
    async fn init_session(
        &self,
        file_name: &str,
        _image: Vec<u8>,
    ) -> Result<SessionInitResponse, ClientError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ClientError::Server("500 Internal Server Error: disk full".to_string()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = self
            .fixed_session_id
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("session-{}", n));
        Ok(SessionInitResponse {
            session_id,
            image_url: format!("/static/uploads/{}", file_name),
            image_dims: None,
        })
    }

    async fn analyze_text(&self, request: &TextAnalysisRequest) -> ChatResult {
        self.chat_requests.lock().unwrap().push(request.clone());
        let gate = self.chat_gates.lock().unwrap().remove(&request.text_prompt);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::Server("gate dropped".to_string()))),
            None => Ok(AnalysisResponse {
                success: true,
                message: format!("echo: {}", request.text_prompt),
                mask_url: None,
                stats: None,
            }),
        }
    }

    async fn refine(&self, request: &InteractionRequest) -> RefineResult {
        self.refine_requests.lock().unwrap().push(request.clone());
        let gate = self.refine_gates.lock().unwrap().remove(&request.version);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::Server("gate dropped".to_string()))),
            None => Err(ClientError::Server(format!(
                "no scripted response for version {}",
                request.version
            ))),
        }
    }
}

pub fn workbench(service: &Arc<ScriptedService>) -> Workbench {
    Workbench::new(service.clone(), &Config::default())
}

pub fn workbench_with(service: &Arc<ScriptedService>, config: &Config) -> Workbench {
    Workbench::new(service.clone(), config)
}
