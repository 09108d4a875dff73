//! Waiting on control-plane tasks.

use crate::control_plane::ControlPlane;
use crate::error::{PluginError, PluginResult};
use crate::types::{TaskHandle, TaskInfo, TaskStatus};

use std::time::Duration;
use tracing::debug;

/// How long and how often to poll a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolicy {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            deadline: Duration::from_secs(600),
        }
    }
}

/// Block until `handle` completes. Returns the task's result when it is a
/// string (e.g. the id of a created VM).
pub async fn wait_for_task<P: ControlPlane + ?Sized>(
    plane: &P,
    handle: TaskHandle,
    operation: &str,
    policy: &TaskPolicy,
) -> PluginResult<Option<String>> {
    let task_id = match handle {
        TaskHandle::Completed(result) => return Ok(result),
        TaskHandle::Pending(id) => id,
    };

    let deadline = tokio::time::Instant::now() + policy.deadline;

    loop {
        let info = plane.task_info(&task_id).await?;
        match info.status {
            TaskStatus::Succeeded => return Ok(task_result(&info)),
            TaskStatus::Failed => {
                return Err(PluginError::task(format!(
                    "{operation} task {task_id} failed: {}",
                    task_error(&info)
                )))
            }
            status => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(PluginError::timeout(format!(
                        "{operation} task {task_id} still {status:?} after {}s",
                        policy.deadline.as_secs()
                    )));
                }
                debug!(task = %task_id, ?status, "task pending, waiting {}ms", policy.poll_interval.as_millis());
                tokio::time::sleep(policy.poll_interval).await;
            }
        }
    }
}

fn task_result(info: &TaskInfo) -> Option<String> {
    info.result
        .as_ref()
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Pull the first localizable message out of a vAPI error, falling back
/// to the raw JSON.
fn task_error(info: &TaskInfo) -> String {
    let Some(err) = info.error.as_ref() else {
        return "no detail reported".to_string();
    };
    err.get("messages")
        .and_then(|m| m.as_array())
        .and_then(|m| m.first())
        .and_then(|m| m.get("default_message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}
