use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Decodes a model reply into `T`.
///
/// One surrounding markdown code fence is tolerated. Everything else about the payload must match
/// `T` exactly.
pub(crate) fn decode<T>(raw: &str, what: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	let body = strip_code_fence(raw);

	if body.is_empty() {
		return Err(Error::MalformedResponse { message: format!("{what} response is empty.") });
	}

	serde_json::from_str(body).map_err(|err| Error::MalformedResponse {
		message: format!("{what} response does not match the expected schema: {err}."),
	})
}

fn strip_code_fence(raw: &str) -> &str {
	let trimmed = raw.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let Some(inner) = rest.strip_suffix("```") else {
		return trimmed;
	};
	// The opening fence may carry a language tag on its own line.
	let inner = match inner.split_once('\n') {
		Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
		_ => inner,
	};

	inner.trim()
}
