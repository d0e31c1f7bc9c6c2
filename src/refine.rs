//! Version-gated sequencing of mask refinement requests.
//!
//! Every prompt mutation issues a request tagged with the snapshot version it
//! was built from. Round trips may complete in any order, so a response is
//! applied only if its version is not older than the mask already shown:
//! last writer wins by version, never by arrival time. Superseded requests
//! are not cancelled; their responses are discarded when they land.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::client::{ClientError, SegmentationService};
use crate::error::TransportError;
use crate::models::*;
use crate::stats::StatsReducer;

/// Highest version issued so far, shared with in-flight tasks so a debounced
/// request can notice it has been overtaken before it is sent.
#[derive(Debug, Clone, Default)]
pub struct LatestVersion(Arc<AtomicU64>);

impl LatestVersion {
    fn set(&self, version: u64) {
        self.0.store(version, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn supersedes(&self, version: u64) -> bool {
        self.get() > version
    }

    /// Mark every version as overtaken, so pending tasks skip their call.
    fn retire(&self) {
        self.set(u64::MAX);
    }
}

/// A refinement request ready to be sent.
#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub session_id: String,
    /// Local binding counter; distinguishes sessions the service gave the same id.
    pub epoch: u64,
    pub version: u64,
    pub body: InteractionRequest,
    latest: LatestVersion,
}

impl RefineRequest {
    pub fn is_superseded(&self) -> bool {
        self.latest.supersedes(self.version)
    }

    pub fn complete(self, reply: RefinementReply) -> RefinementCompletion {
        RefinementCompletion {
            session_id: self.session_id,
            epoch: self.epoch,
            version: self.version,
            reply,
        }
    }
}

/// What came back for one request.
#[derive(Debug)]
pub enum RefinementReply {
    Response(Result<RefinementResponse, ClientError>),
    /// Skipped before sending because a newer snapshot was issued.
    Superseded,
}

/// A finished request, delivered back to the owner of the orchestrator.
#[derive(Debug)]
pub struct RefinementCompletion {
    pub session_id: String,
    pub epoch: u64,
    pub version: u64,
    pub reply: RefinementReply,
}

/// Result of feeding one completion into the orchestrator.
#[derive(Debug)]
pub enum RefinementOutcome {
    /// The mask was displayed.
    Applied { version: u64, stats: StatsResult },
    /// The live prompt set became empty; the mask was cleared locally.
    Cleared { version: u64 },
    /// Older than the mask already shown. Not an error.
    StaleDiscarded { version: u64, last_applied: u64 },
    /// Belongs to a session that has since been replaced.
    SessionMismatch { version: u64 },
    /// Coalesced into a newer request and never sent.
    Superseded { version: u64 },
    /// The request failed. `surfaced` is true when it was for the latest
    /// prompt state and the operator should be told.
    Failed {
        version: u64,
        error: TransportError,
        surfaced: bool,
    },
}

impl RefinementOutcome {
    pub fn version(&self) -> u64 {
        match self {
            Self::Applied { version, .. }
            | Self::Cleared { version }
            | Self::StaleDiscarded { version, .. }
            | Self::SessionMismatch { version }
            | Self::Superseded { version }
            | Self::Failed { version, .. } => *version,
        }
    }

    /// Whether the displayed mask or stats changed.
    pub fn changed_display(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Cleared { .. })
    }
}

#[derive(Debug, Default)]
pub struct RefinementOrchestrator {
    session_id: Option<String>,
    epoch: u64,
    native_size: Option<ImageSize>,
    last_issued_version: u64,
    last_applied_version: u64,
    mask: Option<Mask>,
    stats: Option<StatsResult>,
    reducer: StatsReducer,
    latest: LatestVersion,
}

impl RefinementOrchestrator {
    pub fn new(reducer: StatsReducer) -> Self {
        Self {
            reducer,
            ..Self::default()
        }
    }

    /// Bind to a fresh session: versions restart at 0 and the display clears.
    pub fn reset(&mut self, session: &Session) {
        self.detach();
        self.session_id = Some(session.id.clone());
        self.native_size = Some(session.native_size());
    }

    /// Forget the current session. Responses still in flight will not match,
    /// and debounced requests not yet sent are dropped.
    pub fn detach(&mut self) {
        self.epoch += 1;
        self.latest.retire();
        self.session_id = None;
        self.native_size = None;
        self.last_issued_version = 0;
        self.last_applied_version = 0;
        self.mask = None;
        self.stats = None;
        self.latest = LatestVersion::default();
    }

    /// Build the request for a new snapshot.
    ///
    /// Returns `None` when there is no session, when the snapshot is not newer
    /// than the last one issued, or when it has no live prompts (the display
    /// is cleared locally instead).
    pub fn on_snapshot(&mut self, snapshot: &PromptSnapshot) -> Option<RefineRequest> {
        let session_id = self.session_id.clone()?;
        let version = snapshot.version();

        if version <= self.last_issued_version {
            tracing::debug!(
                version,
                last_issued = self.last_issued_version,
                "Ignoring snapshot that is not newer than the last issued"
            );
            return None;
        }
        self.last_issued_version = version;
        self.latest.set(version);

        if snapshot.is_empty() {
            tracing::debug!(version, "No live prompts, clearing mask");
            self.mask = None;
            self.stats = None;
            self.last_applied_version = self.last_applied_version.max(version);
            return None;
        }

        tracing::debug!(version, points = snapshot.len(), "Issuing refinement");
        Some(RefineRequest {
            body: InteractionRequest {
                session_id: session_id.clone(),
                interaction_type: POINT_CLICK.to_string(),
                points: snapshot.prompts().iter().map(InteractionPoint::from).collect(),
                version,
            },
            session_id,
            epoch: self.epoch,
            version,
            latest: self.latest.clone(),
        })
    }

    pub fn on_completion(&mut self, completion: RefinementCompletion) -> RefinementOutcome {
        if completion.epoch != self.epoch {
            tracing::debug!(
                version = completion.version,
                epoch = completion.epoch,
                "Discarding completion from an earlier session binding"
            );
            return RefinementOutcome::SessionMismatch {
                version: completion.version,
            };
        }

        match completion.reply {
            RefinementReply::Response(result) => {
                self.on_response(&completion.session_id, completion.version, result)
            }
            RefinementReply::Superseded => {
                tracing::debug!(version = completion.version, "Refinement coalesced");
                RefinementOutcome::Superseded {
                    version: completion.version,
                }
            }
        }
    }

    /// Gate one response on session identity and version, then apply it.
    pub fn on_response(
        &mut self,
        session_id: &str,
        version: u64,
        result: Result<RefinementResponse, ClientError>,
    ) -> RefinementOutcome {
        if self.session_id.as_deref() != Some(session_id) {
            tracing::debug!(version, session_id, "Discarding response for replaced session");
            return RefinementOutcome::SessionMismatch { version };
        }

        let mask = match result.and_then(|response| self.decode(version, response)) {
            Ok(mask) => mask,
            Err(e) => return self.fail(version, e),
        };

        if version < self.last_applied_version {
            tracing::debug!(
                version,
                last_applied = self.last_applied_version,
                "Discarding stale refinement"
            );
            return RefinementOutcome::StaleDiscarded {
                version,
                last_applied: self.last_applied_version,
            };
        }

        let stats = self.reducer.compute(&mask);
        tracing::debug!(version, area = stats.area_fraction_percent, "Applied refinement");
        self.mask = Some(mask);
        self.stats = Some(stats);
        self.last_applied_version = version;
        RefinementOutcome::Applied { version, stats }
    }

    fn decode(&self, version: u64, response: RefinementResponse) -> Result<Mask, ClientError> {
        if let Some(echoed) = response.version {
            if echoed != version {
                return Err(ClientError::Malformed(format!(
                    "response version {} for request version {}",
                    echoed, version
                )));
            }
        }

        let mask = response
            .mask
            .decode(version)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;

        if let Some(expected) = self.native_size {
            if mask.size() != expected {
                return Err(ClientError::Malformed(format!(
                    "mask is {}x{}, image is {}x{}",
                    mask.width(),
                    mask.height(),
                    expected.width,
                    expected.height
                )));
            }
        }
        Ok(mask)
    }

    fn fail(&mut self, version: u64, source: ClientError) -> RefinementOutcome {
        let surfaced = version == self.last_issued_version;
        if surfaced {
            tracing::warn!(version, "Refinement failed: {}", source);
        } else {
            tracing::debug!(version, "Superseded refinement failed: {}", source);
        }
        RefinementOutcome::Failed {
            version,
            error: TransportError::new("refinement", source),
            surfaced,
        }
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn stats(&self) -> Option<&StatsResult> {
        self.stats.as_ref()
    }

    pub fn reducer(&self) -> &StatsReducer {
        &self.reducer
    }

    pub fn last_issued_version(&self) -> u64 {
        self.last_issued_version
    }

    pub fn last_applied_version(&self) -> u64 {
        self.last_applied_version
    }

    /// Bumped on every [`reset`](Self::reset) and [`detach`](Self::detach).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Send `request` on a background task and report back over `tx`.
///
/// With a non-zero `debounce` the task first waits, then skips the network
/// call entirely if a newer version was issued in the meantime. A zero
/// debounce always sends.
pub fn spawn_refinement<E>(
    service: Arc<dyn SegmentationService>,
    request: RefineRequest,
    debounce: Duration,
    tx: UnboundedSender<E>,
) -> tokio::task::JoinHandle<()>
where
    E: From<RefinementCompletion> + Send + 'static,
{
    tokio::spawn(async move {
        let coalesce = !debounce.is_zero();
        if coalesce {
            tokio::time::sleep(debounce).await;
        }

        let reply = if coalesce && request.is_superseded() {
            RefinementReply::Superseded
        } else {
            RefinementReply::Response(service.refine(&request.body).await)
        };

        if tx.send(request.complete(reply).into()).is_err() {
            tracing::debug!("Refinement receiver dropped");
        }
    })
}
