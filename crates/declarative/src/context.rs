//! Provider and callback traits
//!
//! These traits keep the engine independent of any particular cloud API,
//! progress display or prompt implementation.

use crate::planner::Action;
use crate::resource::ResourceKind;
use crate::state::RecordedResource;
use crate::types::ApplyResult;
use crate::value::{Properties, ResourceId};
use anyhow::Result;

/// The boundary that actually creates, updates and deletes resources
///
/// Inputs are always fully resolved: every output reference has been
/// replaced by the concrete value its resource returned. Calls may run
/// concurrently from a thread pool.
pub trait Provider: Send + Sync {
    /// Create a resource and return its output properties
    fn create(&self, kind: &ResourceKind, name: &ResourceId, inputs: &Properties) -> Result<Properties>;

    /// Converge an existing resource to `inputs` and return its outputs
    fn update(
        &self,
        kind: &ResourceKind,
        name: &ResourceId,
        inputs: &Properties,
        previous: &RecordedResource,
    ) -> Result<Properties>;

    /// Delete a previously created resource
    fn delete(&self, kind: &ResourceKind, name: &ResourceId, previous: &RecordedResource) -> Result<()>;
}

/// Progress callback for execution operations
///
/// Always invoked from the coordinating thread, never from workers.
pub trait ProgressCallback: Send {
    /// Called once before anything is applied
    fn on_apply_start(&mut self, count: usize);

    /// Called when a resource is dispatched to the provider
    fn on_resource_start(&mut self, id: &ResourceId, kind: &ResourceKind, action: &Action);

    /// Called when a resource reaches its final result
    fn on_resource_complete(&mut self, id: &ResourceId, result: &ApplyResult);

    /// Called once after the last resource completes
    fn on_apply_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_apply_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &ResourceId, _kind: &ResourceKind, _action: &Action) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _result: &ApplyResult) {}
    fn on_apply_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
