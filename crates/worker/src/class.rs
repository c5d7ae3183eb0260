/// Shared execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Resource resolution driven by a caller.
	Dispatch,
	/// Module discovery and loading.
	Discovery,
	/// Blocking I/O work executed on the blocking pool.
	IoBlocking,
	/// CPU-intensive decoding executed on the blocking pool.
	CpuBlocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Dispatch => "dispatch",
			Self::Discovery => "discovery",
			Self::IoBlocking => "io_blocking",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}
