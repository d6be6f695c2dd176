//! Print job submission: route a request to a printer and classify the
//! outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{error::Error, registry::Registry, traits::Connector};

/// A print job, fetched by the printer from the given locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct JobRequest {
    /// Where the printer downloads the job from.
    pub gcode_url: Url,

    /// Optional thumbnail or 3MF preview.
    #[serde(default, alias = "3mf_url", skip_serializing_if = "Option::is_none")]
    pub thmf_url: Option<Url>,
}

impl JobRequest {
    /// Both locations must be http or https.
    pub fn validate(&self) -> Result<(), SubmitError> {
        for url in std::iter::once(&self.gcode_url).chain(self.thmf_url.as_ref()) {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SubmitError::Invalid(format!("unsupported url scheme: {}", url)));
            }
        }
        Ok(())
    }
}

/// The reply to an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct JobAccepted {
    /// Identifier for this submission.
    pub job_id: Uuid,

    /// The printer it was sent to.
    pub printer: String,

    /// Echo of the request.
    pub gcode_url: Url,

    /// Echo of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thmf_url: Option<Url>,
}

/// Why a job was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// No printer by that name.
    #[error("printer not found: {0}")]
    NotFound(String),

    /// The printer is not Ready.
    #[error("printer not connected")]
    NotConnected,

    /// The request itself is unusable.
    #[error("invalid job: {0}")]
    Invalid(String),

    /// The printer or its client rejected the job.
    #[error("submission failed: {0}")]
    Failed(String),
}

impl SubmitError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "UnknownPrinter",
            Self::NotConnected => "NotReady",
            Self::Invalid(_) => "InvalidJob",
            Self::Failed(_) => "SubmissionFailed",
        }
    }
}

/// Send `job` to the printer called `name`.
pub async fn submit<C: Connector>(registry: &Registry<C>, name: &str, job: JobRequest) -> Result<JobAccepted, SubmitError> {
    job.validate()?;

    let session = registry.get(name).map_err(|_| SubmitError::NotFound(name.to_owned()))?;
    match session.submit_print(&job).await {
        Ok(()) => {}
        Err(Error::NotReady) => return Err(SubmitError::NotConnected),
        Err(err) => {
            tracing::warn!(printer = name, error = %err, "print submission failed");
            return Err(SubmitError::Failed(err.to_string()));
        }
    }

    let accepted = JobAccepted {
        job_id: Uuid::new_v4(),
        printer: name.to_owned(),
        gcode_url: job.gcode_url,
        thmf_url: job.thmf_url,
    };
    tracing::info!(printer = name, job_id = %accepted.job_id, "print job accepted");
    Ok(accepted)
}
