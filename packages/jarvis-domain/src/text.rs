use unicode_segmentation::UnicodeSegmentation;

const ELLIPSIS: &str = "...";

/// Bounds `text` to `max` extended grapheme clusters.
///
/// Over-long text keeps its first `max - 3` clusters followed by `...`; when `max` leaves no room
/// for the marker the text is cut at `max` clusters. Returns the bounded text and whether it was
/// cut.
pub fn truncate_graphemes(text: &str, max: usize) -> (String, bool) {
	let mut boundaries = text.grapheme_indices(true).map(|(offset, _)| offset);

	let Some(cut_at) = boundaries.nth(max) else {
		return (text.to_string(), false);
	};

	if max <= ELLIPSIS.len() {
		return (text[..cut_at].to_string(), true);
	}

	let keep = max - ELLIPSIS.len();
	let end = text.grapheme_indices(true).nth(keep).map(|(offset, _)| offset).unwrap_or(cut_at);
	let mut out = String::with_capacity(end + ELLIPSIS.len());

	out.push_str(&text[..end]);
	out.push_str(ELLIPSIS);

	(out, true)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_text_is_untouched() {
		assert_eq!(truncate_graphemes("hello", 5), ("hello".to_string(), false));
		assert_eq!(truncate_graphemes("", 1), (String::new(), false));
	}

	#[test]
	fn long_text_gets_ellipsis_within_bound() {
		let (out, truncated) = truncate_graphemes("abcdefghij", 8);

		assert!(truncated);
		assert_eq!(out, "abcde...");
		assert_eq!(out.graphemes(true).count(), 8);
	}

	#[test]
	fn tiny_bounds_cut_without_marker() {
		assert_eq!(truncate_graphemes("abcdef", 2), ("ab".to_string(), true));
	}

	#[test]
	fn never_splits_a_grapheme() {
		let text = "e\u{301}e\u{301}e\u{301}e\u{301}e\u{301}";
		let (out, truncated) = truncate_graphemes(text, 4);

		assert!(truncated);
		assert_eq!(out, "e\u{301}...");
	}
}
