//! Detached execution for synchronous entry points.
//!
//! [`block_on_detached`] runs a future to completion on the dedicated bridge runtime and blocks
//! only the calling thread until it finishes. The future never runs on the caller's scheduler,
//! so calling a sync API from inside a current-thread runtime cannot deadlock on itself.
//!
//! Futures passed here must not depend on I/O resources registered with the caller's runtime.

use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::sync::OnceLock;
use std::sync::mpsc;

use crate::TaskClass;

thread_local! {
	static ON_BRIDGE_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Failure of the detached execution itself (not of the future's own result).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
	#[error("detached task panicked: {0}")]
	Panicked(String),
	#[error("detached task was cancelled before completing")]
	Cancelled,
	#[error("failed to start nested bridge runtime: {0}")]
	Runtime(String),
}

fn bridge_runtime() -> &'static tokio::runtime::Runtime {
	static BRIDGE_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	BRIDGE_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("modkit-bridge")
			.on_thread_start(|| ON_BRIDGE_THREAD.with(|flag| flag.set(true)))
			.build()
			.expect("failed to build modkit bridge tokio runtime")
	})
}

/// Runs `fut` on a separate scheduling context and blocks the current thread on its result.
pub fn block_on_detached<F>(class: TaskClass, fut: F) -> Result<F::Output, BridgeError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	if ON_BRIDGE_THREAD.with(Cell::get) {
		// Blocking a bridge worker on another bridge task can starve the pool.
		tracing::trace!(worker_class = class.as_str(), "worker.bridge.nested");
		return run_on_private_thread(fut);
	}

	tracing::trace!(worker_class = class.as_str(), "worker.bridge");
	let rt = bridge_runtime();
	let task = rt.spawn(fut);
	let (tx, rx) = mpsc::sync_channel(1);
	rt.spawn(async move {
		let _ = tx.send(task.await);
	});

	match rx.recv() {
		Ok(Ok(output)) => Ok(output),
		Ok(Err(join)) if join.is_panic() => Err(BridgeError::Panicked(panic_message(join.into_panic()))),
		Ok(Err(_)) | Err(_) => Err(BridgeError::Cancelled),
	}
}

fn run_on_private_thread<F>(fut: F) -> Result<F::Output, BridgeError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let handle = std::thread::Builder::new()
		.name("modkit-bridge-nested".into())
		.spawn(move || {
			let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
			Ok::<_, std::io::Error>(rt.block_on(fut))
		})
		.map_err(|e| BridgeError::Runtime(e.to_string()))?;

	match handle.join() {
		Ok(Ok(output)) => Ok(output),
		Ok(Err(e)) => Err(BridgeError::Runtime(e.to_string())),
		Err(payload) => Err(BridgeError::Panicked(panic_message(payload))),
	}
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[test]
	fn runs_future_from_plain_thread() {
		let out = block_on_detached(TaskClass::Dispatch, async { 40 + 2 });
		assert_eq!(out, Ok(42));
	}

	/// A current-thread runtime blocked in the bridge must not be needed to finish the future.
	#[tokio::test(flavor = "current_thread")]
	async fn does_not_deadlock_inside_current_thread_runtime() {
		let out = block_on_detached(TaskClass::Dispatch, async {
			tokio::time::sleep(Duration::from_millis(5)).await;
			"done"
		});
		assert_eq!(out, Ok("done"));
	}

	#[test]
	fn reports_panics() {
		let out = block_on_detached(TaskClass::Dispatch, async {
			if true {
				panic!("boom");
			}
			1
		});
		assert_eq!(out, Err(BridgeError::Panicked("boom".to_string())));
	}

	#[test]
	fn nested_bridge_calls_complete() {
		let out = block_on_detached(TaskClass::Dispatch, async {
			block_on_detached(TaskClass::Dispatch, async { 7 }).map(|v| v * 6)
		});
		assert_eq!(out, Ok(Ok(42)));
	}
}
