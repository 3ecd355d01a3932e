use tally_domain::QuotaScope;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Quota exceeded for {scope}.")]
	QuotaExceeded { scope: QuotaScope },
	#[error("Dependency error: {message}")]
	Dependency { message: String },
	#[error("Timed out waiting for {operation}.")]
	Timeout { operation: &'static str },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}
impl Error {
	/// Infrastructure failures may succeed on retry; an exhausted quota never will.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Dependency { .. } | Self::Timeout { .. })
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Dependency { message: err.to_string() }
	}
}
