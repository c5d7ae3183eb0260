//! Blocking-pool offload and the runtime that backs it.
//!
//! Module loading and resource decoding are synchronous, so both run on a blocking pool. Callers
//! inside a runtime use that runtime's pool. Callers outside one fall back to a small
//! process-wide runtime that is built on first use.

use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

static FALLBACK: OnceLock<Runtime> = OnceLock::new();

fn fallback_runtime() -> &'static Runtime {
	FALLBACK.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("modkit-worker")
			.build()
			.expect("failed to build modkit fallback runtime")
	})
}

/// Handle of the caller's runtime, or of the fallback runtime outside one.
pub(crate) fn runtime_handle() -> Handle {
	match Handle::try_current() {
		Ok(handle) => handle,
		Err(_) => fallback_runtime().handle().clone(),
	}
}

/// Runs `work` on the blocking pool.
///
/// The returned handle resolves to a [`JoinError`](tokio::task::JoinError) when `work` panics,
/// which callers map to their own failure type.
pub fn spawn_blocking<F, R>(class: TaskClass, work: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let handle = runtime_handle();
	tracing::trace!(worker_class = class.as_str(), "worker.blocking");
	handle.spawn_blocking(work)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn blocking_work_returns_its_value() {
		let value = spawn_blocking(TaskClass::IoBlocking, || 6 * 7).await.unwrap();
		assert_eq!(value, 42);
	}

	#[tokio::test]
	async fn panicking_work_surfaces_as_join_error() {
		let err = spawn_blocking(TaskClass::CpuBlocking, || -> u32 { panic!("decoder blew up") }).await.unwrap_err();
		assert!(err.is_panic());
	}

	#[test]
	fn outside_a_runtime_uses_the_fallback() {
		let task = spawn_blocking(TaskClass::IoBlocking, || "done");
		let value = fallback_runtime().block_on(task).unwrap();
		assert_eq!(value, "done");
	}
}
