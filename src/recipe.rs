//! Waiting on asynchronous platform operations.
//!
//! Every mutation except notes and team grants returns a recipe. The
//! waiter polls it at a fixed interval until it completes, fails, or
//! the caller's timeout passes.

use crate::backend::PlatformGateway;
use crate::error::DeployError;
use crate::types::{Recipe, RecipeStatus};
use std::time::Duration;
use tokio::time::Instant;

/// Default interval between recipe polls.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// A recipe to wait on and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeHandle {
    pub recipe_id: String,
    /// Zero means return immediately without polling.
    pub timeout: Duration,
}

impl RecipeHandle {
    pub fn new(recipe_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            recipe_id: recipe_id.into(),
            timeout,
        }
    }
}

pub struct RecipeWaiter<'a, B: PlatformGateway> {
    backend: &'a B,
    interval: Duration,
}

impl<'a, B: PlatformGateway> RecipeWaiter<'a, B> {
    pub fn new(backend: &'a B, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Block until the recipe completes.
    ///
    /// Returns the completed recipe, or `None` when the timeout is zero.
    /// A poll error is surfaced immediately, not retried.
    #[tracing::instrument(skip(self), fields(recipe = %handle.recipe_id))]
    pub async fn wait(&self, handle: &RecipeHandle) -> Result<Option<Recipe>, DeployError> {
        if handle.timeout.is_zero() {
            tracing::debug!("timeout is zero, not waiting");
            return Ok(None);
        }

        let started = Instant::now();
        while started.elapsed() <= handle.timeout {
            let recipe = self
                .backend
                .get_recipe(&handle.recipe_id)
                .await
                .map_err(|e| e.during("poll recipe", &handle.recipe_id))?;

            match recipe.status {
                RecipeStatus::Complete => {
                    tracing::debug!(elapsed = ?started.elapsed(), "recipe complete");
                    return Ok(Some(recipe));
                }
                RecipeStatus::Failed => {
                    return Err(DeployError::RecipeFailed {
                        recipe_id: recipe.id,
                        status: recipe.status.name().to_string(),
                    });
                }
                _ => tracing::trace!(status = recipe.status.name(), "recipe pending"),
            }

            tokio::time::sleep(self.interval).await;
        }

        Err(DeployError::Timeout {
            recipe_id: handle.recipe_id.clone(),
            seconds: handle.timeout.as_secs(),
        })
    }
}
