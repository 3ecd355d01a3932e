use std::{io::Write, time::Duration};

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::{
	io::{AsyncBufRead, AsyncBufReadExt},
	time,
};

use tally_domain::{FilterIdentity, Pagination, SearchFilters, SearchRequest};
use tally_service::{Error, RequestContext, SearchOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOp {
	Search,
	Lookup,
	Preview,
}

#[derive(Debug, Deserialize)]
pub struct ReplayLine {
	pub op: ReplayOp,
	pub user_id: String,
	#[serde(default)]
	pub organization_id: Option<String>,
	#[serde(default)]
	pub filters: SearchFilters,
	#[serde(default)]
	pub page: Option<u32>,
	#[serde(default)]
	pub page_size: Option<u32>,
	#[serde(default)]
	pub record_id: Option<String>,
	/// Wait this long before issuing the request.
	#[serde(default)]
	pub delay_ms: u64,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}
impl ReplayLine {
	fn context(&self) -> RequestContext {
		let mut ctx = RequestContext::new(self.user_id.clone());

		if let Some(org_id) = self.organization_id.as_ref() {
			ctx = ctx.with_organization(org_id.clone());
		}
		if let Some(timeout_ms) = self.timeout_ms {
			ctx = ctx.with_timeout(Duration::from_millis(timeout_ms));
		}

		ctx
	}

	fn pagination(&self) -> Pagination {
		let default = Pagination::default();

		Pagination::new(
			self.page.unwrap_or(default.page),
			self.page_size.unwrap_or(default.page_size),
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
	Ok,
	Forbidden,
	Error,
}

#[derive(Debug, Serialize)]
pub struct ReplayOutcome {
	pub line: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub op: Option<ReplayOp>,
	pub outcome: Outcome,
	pub charged: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub identity: Option<FilterIdentity>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}
impl ReplayOutcome {
	fn failed(line: usize, op: Option<ReplayOp>, err: &Error) -> Self {
		let outcome = match err {
			Error::QuotaExceeded { .. } => Outcome::Forbidden,
			_ => Outcome::Error,
		};

		Self {
			line,
			op,
			outcome,
			charged: false,
			identity: None,
			total: None,
			message: Some(err.to_string()),
		}
	}
}

/// Feeds every JSON line from `reader` through the orchestrator and writes one outcome per line.
/// Blank lines are skipped. Returns the number of requests replayed.
pub async fn replay<R, W>(orchestrator: &SearchOrchestrator, reader: R, mut writer: W) -> Result<usize>
where
	R: AsyncBufRead + Unpin,
	W: Write,
{
	let mut lines = reader.lines();
	let mut line_no = 0;
	let mut replayed = 0;

	while let Some(raw) = lines.next_line().await? {
		line_no += 1;

		if raw.trim().is_empty() {
			continue;
		}

		let outcome = match serde_json::from_str::<ReplayLine>(&raw) {
			Ok(line) => {
				replayed += 1;

				replay_line(orchestrator, line_no, line).await
			},
			Err(err) => {
				tracing::warn!(line = line_no, error = %err, "Skipping malformed replay line.");

				ReplayOutcome {
					line: line_no,
					op: None,
					outcome: Outcome::Error,
					charged: false,
					identity: None,
					total: None,
					message: Some(format!("Malformed line: {err}")),
				}
			},
		};

		serde_json::to_writer(&mut writer, &outcome)?;
		writer.write_all(b"\n")?;
	}

	writer.flush()?;

	Ok(replayed)
}

async fn replay_line(orchestrator: &SearchOrchestrator, line_no: usize, line: ReplayLine) -> ReplayOutcome {
	if line.delay_ms > 0 {
		time::sleep(Duration::from_millis(line.delay_ms)).await;
	}

	let ctx = line.context();
	let op = Some(line.op);

	match line.op {
		ReplayOp::Search => {
			let request = SearchRequest { filters: line.filters.clone(), pagination: line.pagination() };

			match orchestrator.search(&ctx, &request).await {
				Ok(response) => ReplayOutcome {
					line: line_no,
					op,
					outcome: Outcome::Ok,
					charged: response.charged,
					identity: Some(response.identity),
					total: Some(response.total),
					message: None,
				},
				Err(err) => ReplayOutcome::failed(line_no, op, &err),
			}
		},
		ReplayOp::Lookup => {
			let record_id = line.record_id.as_deref().unwrap_or_default();

			match orchestrator.lookup(&ctx, record_id).await {
				Ok(response) => ReplayOutcome {
					line: line_no,
					op,
					outcome: Outcome::Ok,
					charged: response.charged,
					identity: None,
					total: Some(u64::from(response.record.is_some())),
					message: None,
				},
				Err(err) => ReplayOutcome::failed(line_no, op, &err),
			}
		},
		ReplayOp::Preview => match orchestrator.preview(&ctx, &line.filters).await {
			Ok(response) => ReplayOutcome {
				line: line_no,
				op,
				outcome: Outcome::Ok,
				charged: false,
				identity: Some(response.identity),
				total: Some(response.estimated_total),
				message: None,
			},
			Err(err) => ReplayOutcome::failed(line_no, op, &err),
		},
	}
}
