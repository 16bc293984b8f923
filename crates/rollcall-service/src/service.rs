use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{
    EmbeddingExtractor, EnrolledIdentity, EuclideanMatcher, ExtractError, Matcher,
};
use rollcall_store::{AppendOutcome, Store, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid image: {0}")]
    Input(String),
    #[error("no usable face in any provided image")]
    NoUsableFace,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("thumbnail write failed: {0}")]
    Thumbnail(#[from] std::io::Error),
    #[error("service thread exited")]
    ChannelClosed,
}

impl From<ExtractError> for ServiceError {
    fn from(e: ExtractError) -> Self {
        ServiceError::Input(e.to_string())
    }
}

/// Per-face outcome of one mark request — the caller-facing result shape.
#[derive(Debug, Clone, Serialize)]
pub struct FaceMark {
    pub matched: bool,
    pub student_id: Option<String>,
    /// "Unknown" when unmatched.
    pub name: String,
    /// Rounded to one decimal.
    pub confidence_pct: f32,
    /// True when the identity was already marked present today.
    pub deduped: bool,
    pub thumbnail: Option<String>,
}

enum ServiceRequest {
    Mark {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<FaceMark>, ServiceError>>,
    },
    Register {
        student_id: String,
        name: String,
        images: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<EnrolledIdentity, ServiceError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceRequest>,
}

impl ServiceHandle {
    /// Mark attendance for every face in one frame.
    ///
    /// An empty result means the image decoded but contained no face — a
    /// normal outcome, not an error. Results come back in detection order,
    /// one per face.
    pub async fn mark(&self, image: Vec<u8>) -> Result<Vec<FaceMark>, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceRequest::Mark {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)?
    }

    /// Register (or re-register) a student from a batch of captured images.
    ///
    /// Embeddings from every decodable image accumulate onto the identity;
    /// the first usable image becomes the thumbnail. Fails with
    /// [`ServiceError::NoUsableFace`] when the whole batch contributes no
    /// embedding, in which case nothing is persisted.
    pub async fn register(
        &self,
        student_id: String,
        name: String,
        images: Vec<Vec<u8>>,
    ) -> Result<EnrolledIdentity, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceRequest::Register {
                student_id,
                name,
                images,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)?
    }
}

/// Spawn the attendance engine on a dedicated OS thread.
///
/// The extractor is exclusive, so requests serialize on this thread; the
/// matcher scan and ledger writes are fast relative to extraction.
pub fn spawn_service(
    mut extractor: Box<dyn EmbeddingExtractor>,
    store: Arc<Store>,
    tolerance: f32,
    thumbnail_dir: PathBuf,
) -> std::io::Result<ServiceHandle> {
    std::fs::create_dir_all(&thumbnail_dir)?;

    let (tx, mut rx) = mpsc::channel::<ServiceRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(tolerance, "attendance engine started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    ServiceRequest::Mark { image, reply } => {
                        let result = run_mark(extractor.as_mut(), &store, tolerance, &image);
                        let _ = reply.send(result);
                    }
                    ServiceRequest::Register {
                        student_id,
                        name,
                        images,
                        reply,
                    } => {
                        let result = run_register(
                            extractor.as_mut(),
                            &store,
                            &thumbnail_dir,
                            &student_id,
                            &name,
                            &images,
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("attendance engine exiting");
        })?;

    Ok(ServiceHandle { tx })
}

/// One mark request: extract probes, scan the corpus once, dedup per match.
fn run_mark(
    extractor: &mut dyn EmbeddingExtractor,
    store: &Store,
    tolerance: f32,
    image: &[u8],
) -> Result<Vec<FaceMark>, ServiceError> {
    let probes = extractor.extract(image)?;
    if probes.is_empty() {
        tracing::debug!("no face detected in frame");
        return Ok(Vec::new());
    }

    // One corpus snapshot per request; per-probe matching sees the same view.
    let corpus = store.encodings().all()?;
    tracing::debug!(probes = probes.len(), identities = corpus.len(), "matching frame");

    let matcher = EuclideanMatcher;
    let ledger = store.ledger();
    let mut marks = Vec::with_capacity(probes.len());

    for probe in &probes {
        let result = matcher.match_probe(probe, &corpus, tolerance);
        let confidence_pct = round_one_decimal(result.confidence_pct);

        match result.identity {
            Some(candidate) => {
                let now = Utc::now();
                // Fast path on the existence check; the uniqueness index
                // catches the race where two requests pass it concurrently.
                let deduped = if ledger.has_record_today(&candidate.student_id, now.date_naive())? {
                    true
                } else {
                    matches!(
                        ledger.append(&candidate.student_id, &candidate.name, now)?,
                        AppendOutcome::Duplicate
                    )
                };

                tracing::info!(
                    student_id = %candidate.student_id,
                    distance = result.distance,
                    confidence_pct,
                    deduped,
                    "face matched"
                );

                marks.push(FaceMark {
                    matched: true,
                    student_id: Some(candidate.student_id),
                    name: candidate.name,
                    confidence_pct,
                    deduped,
                    thumbnail: candidate.thumbnail,
                });
            }
            None => {
                tracing::info!(distance = result.distance, "face not recognized");
                marks.push(FaceMark {
                    matched: false,
                    student_id: None,
                    name: "Unknown".to_string(),
                    confidence_pct,
                    deduped: false,
                    thumbnail: None,
                });
            }
        }
    }

    Ok(marks)
}

/// One register request: collect embeddings across the batch, persist once.
fn run_register(
    extractor: &mut dyn EmbeddingExtractor,
    store: &Store,
    thumbnail_dir: &std::path::Path,
    student_id: &str,
    name: &str,
    images: &[Vec<u8>],
) -> Result<EnrolledIdentity, ServiceError> {
    let mut collected = Vec::new();
    let mut thumbnail_source: Option<&[u8]> = None;

    for (idx, image) in images.iter().enumerate() {
        match extractor.extract(image) {
            Ok(embeddings) => {
                if embeddings.is_empty() {
                    tracing::debug!(image = idx, "no face in registration image");
                    continue;
                }
                if thumbnail_source.is_none() {
                    thumbnail_source = Some(image);
                }
                collected.extend(embeddings);
            }
            Err(e) => {
                // A bad frame in a capture batch is expected; the batch as a
                // whole only fails when nothing usable remains.
                tracing::warn!(image = idx, error = %e, "skipping registration image");
            }
        }
    }

    if collected.is_empty() {
        return Err(ServiceError::NoUsableFace);
    }

    let thumbnail_name = format!("{student_id}.jpg");
    if let Some(bytes) = thumbnail_source {
        std::fs::write(thumbnail_dir.join(&thumbnail_name), bytes)?;
    }

    let identity =
        store
            .encodings()
            .register(student_id, name, Some(&thumbnail_name), &collected)?;

    tracing::info!(
        student_id,
        embeddings = identity.embeddings.len(),
        "registration complete"
    );
    Ok(identity)
}

fn round_one_decimal(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
