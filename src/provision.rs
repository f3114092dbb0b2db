use std::time::Duration;

use crate::{
    error::{Error, Result},
    index::{IndexDescription, IndexSpec, VectorIndex},
};

/// How long a freshly created index is given before it is written to.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(60);

/// What the index service holds under the configured name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Compatible(IndexDescription),
    /// Exists, but with another dimension or metric.
    Incompatible(IndexDescription),
    Absent,
}

/// What to do when the named index exists with the wrong shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    #[default]
    Fail,
    /// Log a warning and keep using the existing index.
    Reuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The index was already there and is being reused.
    Existing,
    Created,
    /// Creation was attempted and failed; later writes will surface it.
    CreateFailed,
    /// The service could not be asked; later stages will surface it.
    Unverified,
}

/// Classify the named index against the requested shape.
pub async fn check_index<V: VectorIndex>(
    index: &V,
    spec: &IndexSpec,
) -> Result<IndexState> {
    let names = index.list_indexes().await?;
    if !names.iter().any(|name| *name == spec.name) {
        return Ok(IndexState::Absent);
    }

    Ok(match index.describe_index(&spec.name).await? {
        Some(existing) if existing.matches(spec) => {
            IndexState::Compatible(existing)
        }
        Some(existing) => IndexState::Incompatible(existing),
        None => IndexState::Absent,
    })
}

/// Make sure the index exists before anything is written to it.
///
/// Listing and creation failures are logged, not returned: the upsert stage
/// reports them if the index really is unusable. The only error is an
/// incompatible index under [`MismatchPolicy::Fail`].
pub async fn ensure_index<V: VectorIndex>(
    index: &V,
    spec: &IndexSpec,
    settle: Duration,
    policy: MismatchPolicy,
) -> Result<ProvisionOutcome> {
    let state = match check_index(index, spec).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(
                error = %e,
                index = %spec.name,
                "error checking index"
            );
            return Ok(ProvisionOutcome::Unverified);
        }
    };

    match state {
        IndexState::Compatible(_) => {
            tracing::info!(index = %spec.name, "index already exists");
            Ok(ProvisionOutcome::Existing)
        }
        IndexState::Incompatible(existing) => match policy {
            MismatchPolicy::Fail => Err(Error::IncompatibleIndex {
                name: existing.name,
                found_dimension: existing.dimension,
                found_metric: existing.metric.to_string(),
                expected_dimension: spec.dimension,
                expected_metric: spec.metric.to_string(),
            }),
            MismatchPolicy::Reuse => {
                tracing::warn!(
                    index = %spec.name,
                    found_dimension = existing.dimension,
                    found_metric = %existing.metric,
                    expected_dimension = spec.dimension,
                    expected_metric = %spec.metric,
                    "reusing index with a different shape"
                );
                Ok(ProvisionOutcome::Existing)
            }
        },
        IndexState::Absent => {
            tracing::info!(
                index = %spec.name,
                dimension = spec.dimension,
                metric = %spec.metric,
                "creating index"
            );
            if let Err(e) = index.create_index(spec).await {
                tracing::error!(
                    error = %e,
                    index = %spec.name,
                    "error creating index"
                );
                return Ok(ProvisionOutcome::CreateFailed);
            }
            tracing::info!(
                seconds = settle.as_secs_f32(),
                "index created, waiting for it to be ready"
            );
            tokio::time::sleep(settle).await;
            Ok(ProvisionOutcome::Created)
        }
    }
}
