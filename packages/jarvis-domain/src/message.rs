use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
	User,
	Assistant,
}
impl Author {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}
impl fmt::Display for Author {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Author {
	type Err = UnknownAuthor;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"user" => Ok(Self::User),
			"assistant" => Ok(Self::Assistant),
			other => Err(UnknownAuthor(other.to_string())),
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown message author {0:?}.")]
pub struct UnknownAuthor(pub String);
impl TryFrom<String> for Author {
	type Error = UnknownAuthor;

	fn try_from(raw: String) -> Result<Self, Self::Error> {
		raw.parse()
	}
}
