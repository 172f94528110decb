//! Transcript text helpers

/// Join transcript fragments with spaces, trimming each fragment and the
/// result
pub fn concat_transcripts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat() {
        assert_eq!(concat_transcripts(&["turn on", " the heater "]), "turn on the heater");
        assert_eq!(concat_transcripts(&["", "heater"]), "heater");
        assert_eq!(concat_transcripts(&["heater", ""]), "heater");
        assert_eq!(concat_transcripts(&["", ""]), "");
    }
}
