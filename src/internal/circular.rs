//! Circular resolution detection.
//!
//! Every resolution chain carries the identifiers it is currently resolving.
//! The path is owned by the chain rather than by a thread, so interleaved
//! async resolutions never see each other's frames.

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::ServiceId;

pub(crate) const MAX_DEPTH: usize = 1024;

#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionPath {
    frames: SmallVec<[ServiceId; 8]>,
}

impl ResolutionPath {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the path extended with `id`, failing if `id` is already being
    /// resolved on this chain or the chain is too deep.
    pub(crate) fn enter(&self, id: &ServiceId, max_depth: usize) -> DiResult<ResolutionPath> {
        if self.frames.iter().any(|frame| frame == id) {
            let mut path: Vec<ServiceId> = self.frames.iter().cloned().collect();
            path.push(id.clone());
            tracing::warn!(id = %id, depth = path.len(), "circular resolution detected");
            return Err(DiError::CircularResolution(path));
        }

        if self.frames.len() >= max_depth {
            return Err(DiError::DepthExceeded(self.frames.len()));
        }

        let mut frames = self.frames.clone();
        frames.push(id.clone());
        Ok(ResolutionPath { frames })
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frames(&self) -> &[ServiceId] {
        &self.frames
    }
}
